use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};

use image::{GrayImage, RgbImage};
use log::{info, warn};
use ndarray::{Array3, ArrayD, Ix2, Ix3};

use super::model::Spectrum;
use crate::error::{Result, SpectrumError};

/// Suffix of whole-spectrum files written by [`write`].
pub const SPECTRUM_SUFFIX: &str = ".spectrum.json";

// ---------------------------------------------------------------------------
// Whole-spectrum persistence
// ---------------------------------------------------------------------------

/// Whether `path` names a whole-spectrum file rather than bare raw data.
pub fn is_spectrum_file(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|n| n.ends_with(SPECTRUM_SUFFIX))
}

/// Default file name for a spectrum: `<name>.spectrum.json`.
pub fn default_filename(spectrum: &Spectrum) -> PathBuf {
    PathBuf::from(format!("{}{SPECTRUM_SUFFIX}", spectrum.name))
}

/// Write the whole spectrum, derived data included, as self-describing JSON.
///
/// Returns the path written to.
pub fn write(spectrum: &Spectrum, filename: Option<&Path>) -> Result<PathBuf> {
    spectrum.raw_data()?;
    if !spectrum.is_finite() {
        return Err(SpectrumError::ContractViolation(format!(
            "spectrum '{}' holds non-finite values and cannot be saved",
            spectrum.name
        )));
    }

    let path = filename
        .map(Path::to_path_buf)
        .unwrap_or_else(|| default_filename(spectrum));
    let writer = BufWriter::new(File::create(&path)?);
    serde_json::to_writer(writer, spectrum)?;

    info!("Wrote spectrum file: {}", path.display());
    Ok(path)
}

/// Read a spectrum written by [`write`].
pub fn load(path: &Path) -> Result<Spectrum> {
    match extension(path).as_str() {
        "json" => {}
        other => {
            return Err(SpectrumError::UnsupportedFormat(format!(
                "spectrum files must be .json, got .{other}"
            )))
        }
    }
    let reader = BufReader::new(File::open(path)?);
    let spectrum: Spectrum = serde_json::from_reader(reader)?;
    spectrum.validate()?;
    Ok(spectrum)
}

// ---------------------------------------------------------------------------
// Raw data
// ---------------------------------------------------------------------------

/// Load a raw data array. Dispatch by extension.
///
/// Supported formats:
/// * `.json` – array written by [`save_raw_data`] (`{"v":1,"dim":[..],"data":[..]}`)
/// * `.png`, `.jpg`, `.jpeg` – 8-bit colour image, returned as `(H, W, 3)` BGR
///
/// Image values are widened to `f64` so sums and differences are representable.
pub fn load_raw_data(path: &Path) -> Result<ArrayD<f64>> {
    match extension(path).as_str() {
        "json" => {
            let reader = BufReader::new(File::open(path)?);
            Ok(serde_json::from_reader(reader)?)
        }
        "png" | "jpg" | "jpeg" => {
            let image = image::open(path)?.to_rgb8();
            Ok(rgb_image_to_bgr(&image).mapv(f64::from).into_dyn())
        }
        other => Err(SpectrumError::UnsupportedFormat(format!(
            "cannot load raw data from .{other}"
        ))),
    }
}

/// Save a raw data array. Dispatch by extension.
///
/// Image formats clamp to `0..=255` and round, losing depth and sign; the JSON
/// array format is exact.
pub fn save_raw_data(data: &ArrayD<f64>, path: &Path) -> Result<()> {
    match extension(path).as_str() {
        "json" => {
            if data.iter().any(|v| !v.is_finite()) {
                return Err(SpectrumError::ContractViolation(
                    "raw data contains NaN or infinite values".to_string(),
                ));
            }
            let writer = BufWriter::new(File::create(path)?);
            serde_json::to_writer(writer, data)?;
        }
        "png" | "jpg" | "jpeg" => {
            warn!(
                "Saving {} as 8-bit image; values are clamped to 0..=255",
                path.display()
            );
            match data.ndim() {
                2 => {
                    let gray = data.view().into_dimensionality::<Ix2>()?;
                    let (height, width) = gray.dim();
                    let image = GrayImage::from_fn(width as u32, height as u32, |x, y| {
                        image::Luma([clamp_u8(gray[[y as usize, x as usize]])])
                    });
                    image.save(path)?;
                }
                3 if data.shape()[2] == 3 => {
                    let bgr = data.view().into_dimensionality::<Ix3>()?.mapv(clamp_u8);
                    bgr_to_rgb_image(&bgr).save(path)?;
                }
                _ => {
                    return Err(SpectrumError::ContractViolation(format!(
                        "cannot save shape {:?} as an image",
                        data.shape()
                    )))
                }
            }
        }
        other => {
            return Err(SpectrumError::UnsupportedFormat(format!(
                "cannot save raw data as .{other}"
            )))
        }
    }
    info!("Wrote raw data: {}", path.display());
    Ok(())
}

// -- Image helpers --

/// Convert an RGB image into an `(H, W, 3)` array in BGR order.
pub fn rgb_image_to_bgr(image: &RgbImage) -> Array3<u8> {
    let (width, height) = image.dimensions();
    Array3::from_shape_fn((height as usize, width as usize, 3), |(y, x, c)| {
        image.get_pixel(x as u32, y as u32).0[2 - c]
    })
}

/// Convert an `(H, W, 3)` BGR array into an RGB image.
pub fn bgr_to_rgb_image(bgr: &Array3<u8>) -> RgbImage {
    let (height, width, _) = bgr.dim();
    RgbImage::from_fn(width as u32, height as u32, |x, y| {
        let (y, x) = (y as usize, x as usize);
        image::Rgb([bgr[[y, x, 2]], bgr[[y, x, 1]], bgr[[y, x, 0]]])
    })
}

fn clamp_u8(v: f64) -> u8 {
    v.round().clamp(0.0, 255.0) as u8
}

pub(crate) fn extension(path: &Path) -> String {
    path.extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_ascii_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::model::SpectrumKind;
    use crate::data::reduce::ReduceConfig;
    use ndarray::Array2;
    use tempfile::TempDir;

    fn measured() -> Spectrum {
        let data = Array3::from_shape_fn((3, 4, 3), |(y, x, c)| {
            // Values that do not survive a lossy float print.
            (y * 12 + x * 3 + c) as f64 / 3.0 - 0.1
        });
        let mut spectrum = Spectrum::new(SpectrumKind::Spectrum, "lamp");
        spectrum.add_data(data.into_dyn()).unwrap();
        spectrum.set_num_frames(16).unwrap();
        spectrum
    }

    #[test]
    fn spectrum_round_trip_is_exact() {
        let dir = TempDir::new().unwrap();
        let mut spectrum = measured();
        spectrum.subtract(0.7).unwrap();
        spectrum.process(1, &ReduceConfig::default()).unwrap();

        let path = write(&spectrum, Some(dir.path().join("lamp.spectrum.json").as_path())).unwrap();
        let loaded = load(&path).unwrap();

        assert_eq!(loaded, spectrum);
        assert_eq!(loaded.raw_data().unwrap(), spectrum.raw_data().unwrap());
        assert_eq!(
            loaded.original_data().unwrap(),
            spectrum.original_data().unwrap()
        );
        assert_eq!(loaded.num_frames(), Some(16));
        assert_eq!(loaded.kind, SpectrumKind::Spectrum);
        assert_eq!(loaded.name, "lamp");
        assert!(loaded.is_modified());
        assert_eq!(loaded.threshold(), Some(1));
    }

    #[test]
    fn overflowed_spectrum_is_not_saved() {
        let dir = TempDir::new().unwrap();
        let mut spectrum = Spectrum::new(SpectrumKind::Spectrum, "hot");
        spectrum
            .add_data(Array2::from_elem((2, 2), f64::MAX).into_dyn())
            .unwrap();
        spectrum.subtract(-f64::MAX).unwrap();

        let target = dir.path().join("hot.spectrum.json");
        let err = write(&spectrum, Some(target.as_path())).unwrap_err();
        assert!(matches!(err, SpectrumError::ContractViolation(_)));
        assert!(!target.exists());

        let raw = dir.path().join("hot.json");
        assert!(save_raw_data(spectrum.raw_data().unwrap(), &raw).is_err());
        assert!(!raw.exists());
    }

    #[test]
    fn default_filename_derives_from_name() {
        let spectrum = measured();
        assert_eq!(default_filename(&spectrum), PathBuf::from("lamp.spectrum.json"));
        assert!(is_spectrum_file(&default_filename(&spectrum)));
        assert!(!is_spectrum_file(Path::new("lamp.json")));
    }

    #[test]
    fn writing_empty_spectrum_fails() {
        let dir = TempDir::new().unwrap();
        let spectrum = Spectrum::new(SpectrumKind::Spectrum, "empty");
        let err = write(&spectrum, Some(dir.path().join("empty.spectrum.json").as_path())).unwrap_err();
        assert!(matches!(err, SpectrumError::DataNotFound(_)));
    }

    #[test]
    fn loading_unknown_extension_is_fatal() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("data.npy");
        std::fs::write(&path, b"\x93NUMPY").unwrap();

        assert!(matches!(
            load_raw_data(&path),
            Err(SpectrumError::UnsupportedFormat(_))
        ));
        assert!(matches!(load(&path), Err(SpectrumError::UnsupportedFormat(_))));
    }

    #[test]
    fn raw_json_round_trip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("raw.json");
        let data = Array2::from_shape_fn((2, 3), |(y, x)| y as f64 * 0.1 - x as f64).into_dyn();

        save_raw_data(&data, &path).unwrap();
        assert_eq!(load_raw_data(&path).unwrap(), data);
    }

    #[test]
    fn png_load_widens_and_keeps_bgr_order() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("frame.png");
        let image = RgbImage::from_fn(4, 2, |x, _| image::Rgb([200, x as u8, 10]));
        image.save(&path).unwrap();

        let data = load_raw_data(&path).unwrap();
        assert_eq!(data.shape(), &[2, 4, 3]);
        assert_eq!(data[[1, 3, 0]], 10.0);
        assert_eq!(data[[1, 3, 1]], 3.0);
        assert_eq!(data[[1, 3, 2]], 200.0);

        let mut spectrum = Spectrum::new(SpectrumKind::Spectrum, "image");
        spectrum.load_raw(&path).unwrap();
        spectrum.subtract(250.0).unwrap();
        assert_eq!(spectrum.raw_data().unwrap()[[0, 0, 2]], -50.0);
        assert_eq!(spectrum.num_frames(), None);
    }

    #[test]
    fn png_save_clamps_values() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("clamped.png");
        let data = Array3::from_shape_fn((1, 2, 3), |(_, x, _)| if x == 0 { -5.0 } else { 300.0 });

        save_raw_data(&data.into_dyn(), &path).unwrap();
        let back = load_raw_data(&path).unwrap();
        assert_eq!(back[[0, 0, 0]], 0.0);
        assert_eq!(back[[0, 1, 0]], 255.0);
    }
}
