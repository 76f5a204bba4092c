use ndarray::Array3;
use rusty_spectrometer::acquisition::{
    ImageSequenceSource, MeasurementConfig, MeasurementOutcome, ReplaySource, Spectrometer,
};
use rusty_spectrometer::data::export::{read_spectrum1d, write_spectrum1d};
use rusty_spectrometer::data::loader;
use rusty_spectrometer::data::reduce::ChannelOrder;
use rusty_spectrometer::{ReduceConfig, Roi, SpectrumError, SpectrumKind, SpectrumState};
use tempfile::TempDir;

const HEIGHT: usize = 6;
const WIDTH: usize = 8;

/// Single-channel frame: dark level everywhere, a bright line in column 5
/// on rows 2..4.
fn frame(dark: u8, line: u8) -> Array3<u8> {
    Array3::from_shape_fn((HEIGHT, WIDTH, 1), |(y, x, _)| {
        if x == 5 && (2..4).contains(&y) {
            line
        } else {
            dark
        }
    })
}

fn completed(outcome: MeasurementOutcome) -> rusty_spectrometer::Spectrum {
    match outcome {
        MeasurementOutcome::Completed(spectrum) => spectrum,
        MeasurementOutcome::Aborted { frames_accumulated } => {
            panic!("aborted after {frames_accumulated} frames")
        }
    }
}

#[test]
fn background_subtracted_spectrum_end_to_end() {
    let dir = TempDir::new().unwrap();

    // 2 warm-up + 4 background frames, then 2 warm-up + 4 lamp frames.
    let mut frames = vec![frame(90, 90); 2];
    frames.extend(vec![frame(3, 3); 4]);
    frames.extend(vec![frame(90, 90); 2]);
    frames.extend(vec![frame(3, 53); 4]);

    let mut spectrometer = Spectrometer::new(ReplaySource::new(frames));
    let config = MeasurementConfig::new(4, 2, "lamp").unwrap();

    let background = completed(spectrometer.measure_background(&config).unwrap());
    let mut spectrum = completed(spectrometer.measure_spectrum(&config).unwrap());
    assert!(spectrum.raw_data().unwrap().iter().any(|&v| v == 212.0));

    spectrum.subtract(&background).unwrap();
    spectrum.average().unwrap();
    assert!(spectrum.is_modified());

    let reduction = spectrum.process(10, &ReduceConfig::default()).unwrap();
    let mut expected = vec![0.0; WIDTH];
    expected[5] = 100.0;
    assert_eq!(reduction.spectrum1d.to_vec(), expected);
    assert_eq!(spectrum.state(), SpectrumState::Reduced);

    let csv = dir.path().join("lamp.csv");
    write_spectrum1d(&spectrum, &csv).unwrap();
    assert_eq!(read_spectrum1d(&csv).unwrap().to_vec(), expected);

    let target = dir.path().join("lamp.spectrum.json");
    let saved = loader::write(&spectrum, Some(target.as_path())).unwrap();
    let loaded = loader::load(&saved).unwrap();
    assert_eq!(loaded, spectrum);
    assert_eq!(loaded.original_data().unwrap().iter().copied().fold(0.0, f64::max), 212.0);
}

#[test]
fn spectra_with_different_frame_counts_never_combine() {
    let mut spectrometer = Spectrometer::new(ReplaySource::new(vec![frame(1, 1); 5]));

    let background = completed(
        spectrometer
            .measure_background(&MeasurementConfig::new(2, 0, "bg").unwrap())
            .unwrap(),
    );
    let mut spectrum = completed(
        spectrometer
            .measure_spectrum(&MeasurementConfig::new(3, 0, "sp").unwrap())
            .unwrap(),
    );

    let before = spectrum.raw_data().unwrap().clone();
    assert!(matches!(
        spectrum.subtract(&background),
        Err(SpectrumError::IncompatibleSpectra(_))
    ));
    assert_eq!(spectrum.raw_data().unwrap(), &before);
    assert!(!spectrum.is_modified());
}

#[test]
fn averaging_constant_frames_recovers_frame_value() {
    for n in [1usize, 3, 10] {
        let mut spectrometer = Spectrometer::new(ReplaySource::new(vec![frame(17, 17); n]));
        let mut spectrum = completed(
            spectrometer
                .measure_spectrum(&MeasurementConfig::new(n, 0, "flat").unwrap())
                .unwrap(),
        );
        assert!(spectrum
            .raw_data()
            .unwrap()
            .iter()
            .all(|&v| v == 17.0 * n as f64));

        spectrum.average().unwrap();
        assert!(spectrum.raw_data().unwrap().iter().all(|&v| v == 17.0));
    }
}

#[test]
fn image_sequence_with_roi() {
    let dir = TempDir::new().unwrap();
    for i in 0..3 {
        // Green stripe in columns 2..4 of rows 1..3.
        let image = image::RgbImage::from_fn(6, 4, |x, y| {
            if (2..4).contains(&x) && (1..3).contains(&y) {
                image::Rgb([0, 100, 0])
            } else {
                image::Rgb([0, 0, 0])
            }
        });
        image.save(dir.path().join(format!("frame_{i:04}.png"))).unwrap();
    }

    let mut spectrometer = Spectrometer::new(ImageSequenceSource::new(dir.path()));
    let mut spectrum = completed(
        spectrometer
            .measure(
                SpectrumKind::Spectrum,
                &MeasurementConfig::new(3, 0, "stripe").unwrap(),
            )
            .unwrap(),
    );
    assert_eq!(spectrum.raw_data().unwrap().shape(), &[4, 6, 3]);
    assert_eq!(spectrum.num_frames(), Some(3));

    spectrum.average().unwrap();
    let config = ReduceConfig {
        roi: Some(Roi::new(0, 1, 4, 4)),
        channel_order: ChannelOrder::Bgr,
    };
    let reduction = spectrum.process(1, &config).unwrap();

    assert_eq!(reduction.spectrum2d.dim(), (4, 4));
    let line = reduction.spectrum1d.to_vec();
    assert_eq!(line.len(), 4);
    assert_eq!(line[0], 0.0);
    assert!((line[1] - 2.0 * 58.7).abs() < 1e-9);
    assert!((line[2] - 2.0 * 58.7).abs() < 1e-9);
    assert_eq!(line[3], 0.0);
}
