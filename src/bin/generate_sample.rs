//! Writes synthetic webcam frames for exercising the CLI without a camera.
//!
//! ```text
//! sample_frames/background/frame_0000.png ...
//! sample_frames/spectrum/frame_0000.png ...
//! ```

use std::path::Path;

use image::{Rgb, RgbImage};
use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Distribution, Normal};

const WIDTH: u32 = 640;
const HEIGHT: u32 = 480;
const NUM_FRAMES: usize = 12;

/// Rows the diffraction band covers on the sensor.
const BAND_TOP: u32 = 200;
const BAND_BOTTOM: u32 = 280;

/// Sensor dark level and read noise, in 8-bit counts.
const DARK_LEVEL: f64 = 4.0;
const READ_NOISE: f64 = 2.0;

fn gaussian(x: f64, mu: f64, sigma: f64, amplitude: f64) -> f64 {
    amplitude * (-(x - mu).powi(2) / (2.0 * sigma.powi(2))).exp()
}

/// Emission lines as (column, width in px, peak intensity, colour weights RGB).
const LINES: [(f64, f64, f64, [f64; 3]); 3] = [
    (180.0, 4.0, 150.0, [0.2, 0.3, 1.0]),
    (330.0, 5.0, 200.0, [0.4, 1.0, 0.3]),
    (470.0, 6.0, 120.0, [1.0, 0.6, 0.1]),
];

fn render_frame(rng: &mut StdRng, noise: &Normal<f64>, with_lines: bool) -> RgbImage {
    RgbImage::from_fn(WIDTH, HEIGHT, |x, y| {
        let in_band = (BAND_TOP..BAND_BOTTOM).contains(&y);
        let mut rgb = [0.0f64; 3];
        if with_lines && in_band {
            for &(mu, sigma, amp, weights) in &LINES {
                let intensity = gaussian(x as f64, mu, sigma, amp);
                for (channel, weight) in rgb.iter_mut().zip(weights) {
                    *channel += intensity * weight;
                }
            }
        }
        let pixel = rgb.map(|v| (v + noise.sample(rng)).round().clamp(0.0, 255.0) as u8);
        Rgb(pixel)
    })
}

fn write_sequence(
    dir: &Path,
    rng: &mut StdRng,
    noise: &Normal<f64>,
    with_lines: bool,
) -> std::io::Result<()> {
    std::fs::create_dir_all(dir)?;
    for i in 0..NUM_FRAMES {
        let path = dir.join(format!("frame_{i:04}.png"));
        render_frame(rng, noise, with_lines)
            .save(&path)
            .map_err(std::io::Error::other)?;
    }
    Ok(())
}

fn main() -> std::io::Result<()> {
    let mut rng = StdRng::seed_from_u64(42);
    let noise = Normal::new(DARK_LEVEL, READ_NOISE).map_err(std::io::Error::other)?;
    let root = Path::new("sample_frames");

    write_sequence(&root.join("background"), &mut rng, &noise, false)?;
    write_sequence(&root.join("spectrum"), &mut rng, &noise, true)?;

    println!(
        "Wrote {NUM_FRAMES} background and {NUM_FRAMES} spectrum frames ({WIDTH}x{HEIGHT}) to {}",
        root.display()
    );
    Ok(())
}
