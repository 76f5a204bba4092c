use std::fmt;
use std::path::Path;
use std::str::FromStr;

use ndarray::{Array1, Array2, ArrayD};
use serde::{Deserialize, Serialize};

use super::loader;
use super::reduce::{ReduceConfig, Reduction, SpectralReducer};
use crate::acquisition::Accumulation;
use crate::error::{Result, SpectrumError};

// ---------------------------------------------------------------------------
// SpectrumKind – what a measurement represents
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SpectrumKind {
    /// Reference measurement with the light source off or blocked.
    Background,
    Spectrum,
    #[default]
    Unspecified,
}

impl fmt::Display for SpectrumKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SpectrumKind::Background => write!(f, "background"),
            SpectrumKind::Spectrum => write!(f, "spectrum"),
            SpectrumKind::Unspecified => write!(f, "unspecified"),
        }
    }
}

impl FromStr for SpectrumKind {
    type Err = SpectrumError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "background" => Ok(SpectrumKind::Background),
            "spectrum" => Ok(SpectrumKind::Spectrum),
            "unspecified" => Ok(SpectrumKind::Unspecified),
            other => Err(SpectrumError::ContractViolation(format!(
                "unknown spectrum kind: {other}"
            ))),
        }
    }
}

// ---------------------------------------------------------------------------
// SpectrumState – which pipeline stages have run
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpectrumState {
    /// No raw data assigned yet.
    Empty,
    /// Raw data present, no (valid) reduction.
    Loaded,
    /// Raw data present and `process` ran after the last mutation.
    Reduced,
}

// ---------------------------------------------------------------------------
// SubtractOperand – right-hand side of `Spectrum::subtract`
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy)]
pub enum SubtractOperand<'a> {
    /// Element-wise difference; frame count and shape must match.
    Spectrum(&'a Spectrum),
    /// Subtracted from every element.
    Scalar(f64),
}

impl<'a> From<&'a Spectrum> for SubtractOperand<'a> {
    fn from(spectrum: &'a Spectrum) -> Self {
        SubtractOperand::Spectrum(spectrum)
    }
}

impl From<f64> for SubtractOperand<'_> {
    fn from(value: f64) -> Self {
        SubtractOperand::Scalar(value)
    }
}

// ---------------------------------------------------------------------------
// RawSummary – quick statistics of the raw data
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct RawSummary {
    pub shape: Vec<usize>,
    pub min: f64,
    pub max: f64,
    pub mean: f64,
}

impl fmt::Display for RawSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "shape={:?} min={:.4} max={:.4} mean={:.4}",
            self.shape, self.min, self.max, self.mean
        )
    }
}

// ---------------------------------------------------------------------------
// Spectrum – one measurement and everything derived from it
// ---------------------------------------------------------------------------

/// Raw accumulated data of one measurement plus its reductions and metadata.
///
/// Data recorded through the accumulator carries `num_frames` and the full
/// `f64` range. Data loaded from an 8-bit image has no frame count and is
/// limited to the image's value range, so processing a fresh measurement is
/// preferred over round-tripping through images.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Spectrum {
    pub kind: SpectrumKind,
    pub name: String,
    raw_data: Option<ArrayD<f64>>,
    /// Copy of `raw_data` taken by `add_data`, never mutated afterwards.
    original_data: Option<ArrayD<f64>>,
    num_frames: Option<usize>,
    modified: bool,
    reduction: Option<Reduction>,
}

impl Spectrum {
    pub fn new(kind: SpectrumKind, name: impl Into<String>) -> Self {
        Self {
            kind,
            name: name.into(),
            raw_data: None,
            original_data: None,
            num_frames: None,
            modified: false,
            reduction: None,
        }
    }

    /// Wrap the result of an acquisition, carrying over its frame count.
    pub fn from_accumulation(
        kind: SpectrumKind,
        name: impl Into<String>,
        accumulation: Accumulation,
    ) -> Result<Self> {
        let mut spectrum = Self::new(kind, name);
        spectrum.add_data(accumulation.data.into_dyn())?;
        spectrum.set_num_frames(accumulation.num_frames)?;
        Ok(spectrum)
    }

    /// Load raw data from an image or JSON array file.
    ///
    /// Image data has no frame count; `num_frames` stays unset.
    pub fn load_raw(&mut self, path: &Path) -> Result<()> {
        let data = loader::load_raw_data(path)?;
        self.add_data(data)
    }

    /// Assign the raw data and take the provenance copy.
    ///
    /// A spectrum is populated exactly once.
    pub fn add_data(&mut self, data: ArrayD<f64>) -> Result<()> {
        if self.raw_data.is_some() {
            return Err(SpectrumError::ContractViolation(format!(
                "spectrum '{}' already holds data",
                self.name
            )));
        }
        if data.ndim() < 2 || data.ndim() > 3 {
            return Err(SpectrumError::ContractViolation(format!(
                "raw data must be (H, W) or (H, W, C), got shape {:?}",
                data.shape()
            )));
        }
        if !all_finite(&data) {
            return Err(SpectrumError::ContractViolation(
                "raw data contains NaN or infinite values".to_string(),
            ));
        }
        self.original_data = Some(data.clone());
        self.raw_data = Some(data);
        Ok(())
    }

    /// Record how many frames were summed into the raw data. Set once.
    pub fn set_num_frames(&mut self, num_frames: usize) -> Result<()> {
        if num_frames == 0 {
            return Err(SpectrumError::ContractViolation(
                "num_frames must be positive".to_string(),
            ));
        }
        if let Some(existing) = self.num_frames {
            return Err(SpectrumError::ContractViolation(format!(
                "num_frames already set to {existing}"
            )));
        }
        self.num_frames = Some(num_frames);
        Ok(())
    }

    pub fn state(&self) -> SpectrumState {
        match (&self.raw_data, &self.reduction) {
            (None, _) => SpectrumState::Empty,
            (Some(_), None) => SpectrumState::Loaded,
            (Some(_), Some(_)) => SpectrumState::Reduced,
        }
    }

    pub fn raw_data(&self) -> Result<&ArrayD<f64>> {
        self.raw_data.as_ref().ok_or(SpectrumError::DataNotFound("raw data"))
    }

    pub fn original_data(&self) -> Result<&ArrayD<f64>> {
        self.original_data
            .as_ref()
            .ok_or(SpectrumError::DataNotFound("original data"))
    }

    pub fn num_frames(&self) -> Option<usize> {
        self.num_frames
    }

    pub fn is_modified(&self) -> bool {
        self.modified
    }

    pub fn reduction(&self) -> Option<&Reduction> {
        self.reduction.as_ref()
    }

    pub fn spectrum2d(&self) -> Result<&Array2<f64>> {
        self.reduction
            .as_ref()
            .map(|r| &r.spectrum2d)
            .ok_or(SpectrumError::DataNotFound("two dimensional data"))
    }

    pub fn spectrum1d(&self) -> Result<&Array1<f64>> {
        self.reduction
            .as_ref()
            .map(|r| &r.spectrum1d)
            .ok_or(SpectrumError::DataNotFound("one dimensional data"))
    }

    /// Threshold of the current reduction, if any.
    pub fn threshold(&self) -> Option<u32> {
        self.reduction.as_ref().map(|r| r.threshold)
    }

    // -- Arithmetic --

    /// Subtract another spectrum or a scalar from the raw data in place.
    ///
    /// No clamping is applied; negative results are kept. Any existing
    /// reduction is discarded since it no longer matches the raw data.
    pub fn subtract<'a>(&mut self, other: impl Into<SubtractOperand<'a>>) -> Result<()> {
        let raw = self
            .raw_data
            .as_mut()
            .ok_or(SpectrumError::DataNotFound("raw data"))?;

        match other.into() {
            SubtractOperand::Spectrum(other) => {
                let other_raw = other.raw_data()?;
                if self.num_frames != other.num_frames {
                    return Err(SpectrumError::IncompatibleSpectra(format!(
                        "frame counts differ ({} vs {})",
                        display_frames(self.num_frames),
                        display_frames(other.num_frames)
                    )));
                }
                if raw.shape() != other_raw.shape() {
                    return Err(SpectrumError::IncompatibleSpectra(format!(
                        "shapes differ ({:?} vs {:?})",
                        raw.shape(),
                        other_raw.shape()
                    )));
                }
                *raw -= other_raw;
            }
            SubtractOperand::Scalar(value) => {
                if !value.is_finite() {
                    return Err(SpectrumError::ContractViolation(format!(
                        "cannot subtract non-finite value {value}"
                    )));
                }
                raw.mapv_inplace(|v| v - value);
            }
        }

        self.mark_modified();
        Ok(())
    }

    /// Divide the raw data by the number of accumulated frames.
    pub fn average(&mut self) -> Result<()> {
        let num_frames = self.num_frames.ok_or(SpectrumError::FrameCountUnset)?;
        let raw = self
            .raw_data
            .as_mut()
            .ok_or(SpectrumError::DataNotFound("raw data"))?;

        let n = num_frames as f64;
        raw.mapv_inplace(|v| v / n);
        self.mark_modified();
        Ok(())
    }

    fn mark_modified(&mut self) {
        self.modified = true;
        self.reduction = None;
    }

    // -- Reduction --

    /// Compute `spectrum2d` and `spectrum1d` from the raw data.
    ///
    /// Re-running replaces the previous reduction entirely. The result is not
    /// wavelength calibrated; dark current and flat field are not corrected.
    pub fn process(&mut self, threshold: u32, config: &ReduceConfig) -> Result<&Reduction> {
        let raw = self.raw_data()?;
        let reduction = SpectralReducer::new(config.clone()).process(raw, threshold)?;
        Ok(&*self.reduction.insert(reduction))
    }

    /// Shape and value range of the raw data.
    pub fn summary(&self) -> Result<RawSummary> {
        let raw = self.raw_data()?;
        let min = raw.iter().copied().fold(f64::INFINITY, f64::min);
        let max = raw.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let mean = raw.mean().unwrap_or(f64::NAN);
        Ok(RawSummary {
            shape: raw.shape().to_vec(),
            min,
            max,
            mean,
        })
    }

    /// Check invariants that deserialization alone cannot enforce.
    /// Whether every stored value is finite, i.e. survives a JSON round trip.
    pub(crate) fn is_finite(&self) -> bool {
        self.raw_data.as_ref().map_or(true, all_finite)
            && self.original_data.as_ref().map_or(true, all_finite)
            && self.reduction.as_ref().map_or(true, |r| {
                r.spectrum2d.iter().all(|v| v.is_finite())
                    && r.spectrum1d.iter().all(|v| v.is_finite())
            })
    }

    pub(crate) fn validate(&self) -> Result<()> {
        match (&self.raw_data, &self.original_data) {
            (Some(_), None) | (None, Some(_)) => {
                return Err(SpectrumError::Malformed(
                    "raw and original data must both be present or both absent".to_string(),
                ))
            }
            _ => {}
        }
        if self.raw_data.is_none() && self.reduction.is_some() {
            return Err(SpectrumError::Malformed(
                "reduction present without raw data".to_string(),
            ));
        }
        if self.num_frames == Some(0) {
            return Err(SpectrumError::Malformed("num_frames is zero".to_string()));
        }
        Ok(())
    }
}

fn all_finite(data: &ArrayD<f64>) -> bool {
    data.iter().all(|v| v.is_finite())
}

fn display_frames(num_frames: Option<usize>) -> String {
    num_frames.map_or_else(|| "unset".to_string(), |n| n.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{Array2, Array3};

    fn loaded(value: f64, num_frames: usize) -> Spectrum {
        let mut spectrum = Spectrum::new(SpectrumKind::Spectrum, "test");
        spectrum
            .add_data(Array3::from_elem((4, 5, 3), value).into_dyn())
            .unwrap();
        spectrum.set_num_frames(num_frames).unwrap();
        spectrum
    }

    #[test]
    fn new_spectrum_is_empty() {
        let spectrum = Spectrum::new(SpectrumKind::Background, "bg");
        assert_eq!(spectrum.state(), SpectrumState::Empty);
        assert_eq!(spectrum.num_frames(), None);
        assert!(!spectrum.is_modified());
        assert!(matches!(
            spectrum.raw_data(),
            Err(SpectrumError::DataNotFound(_))
        ));
    }

    #[test]
    fn operations_on_empty_spectrum_fail_with_data_not_found() {
        let mut spectrum = Spectrum::new(SpectrumKind::Spectrum, "empty");
        assert!(matches!(
            spectrum.subtract(1.0),
            Err(SpectrumError::DataNotFound(_))
        ));
        assert!(matches!(
            spectrum.process(10, &ReduceConfig::default()),
            Err(SpectrumError::DataNotFound(_))
        ));
        assert!(matches!(spectrum.summary(), Err(SpectrumError::DataNotFound(_))));
    }

    #[test]
    fn add_data_keeps_original_copy() {
        let mut spectrum = loaded(3.0, 1);
        spectrum.subtract(1.0).unwrap();

        assert!(spectrum.raw_data().unwrap().iter().all(|&v| v == 2.0));
        assert!(spectrum.original_data().unwrap().iter().all(|&v| v == 3.0));
    }

    #[test]
    fn add_data_twice_is_rejected() {
        let mut spectrum = loaded(1.0, 1);
        let err = spectrum
            .add_data(Array2::<f64>::zeros((2, 2)).into_dyn())
            .unwrap_err();
        assert!(matches!(err, SpectrumError::ContractViolation(_)));
    }

    #[test]
    fn non_finite_raw_data_is_rejected() {
        for bad in [f64::NAN, f64::INFINITY, f64::NEG_INFINITY] {
            let mut data = Array2::from_elem((2, 2), 1.0);
            data[[1, 0]] = bad;
            let mut spectrum = Spectrum::new(SpectrumKind::Spectrum, "bad");
            assert!(matches!(
                spectrum.add_data(data.into_dyn()),
                Err(SpectrumError::ContractViolation(_))
            ));
            assert_eq!(spectrum.state(), SpectrumState::Empty);
        }
    }

    #[test]
    fn num_frames_is_set_once() {
        let mut spectrum = loaded(1.0, 4);
        assert!(spectrum.set_num_frames(5).is_err());
        assert_eq!(spectrum.num_frames(), Some(4));
    }

    #[test]
    fn subtracting_itself_gives_zero() {
        let mut spectrum = loaded(7.5, 3);
        let copy = spectrum.clone();
        spectrum.subtract(&copy).unwrap();

        assert!(spectrum.raw_data().unwrap().iter().all(|&v| v == 0.0));
        assert!(spectrum.is_modified());
    }

    #[test]
    fn subtraction_keeps_negative_values() {
        let mut spectrum = loaded(2.0, 1);
        spectrum.subtract(5.0).unwrap();
        assert!(spectrum.raw_data().unwrap().iter().all(|&v| v == -3.0));
    }

    #[test]
    fn mismatched_frame_counts_are_incompatible() {
        let mut a = loaded(2.0, 10);
        let b = loaded(1.0, 5);
        let err = a.subtract(&b).unwrap_err();

        assert!(matches!(err, SpectrumError::IncompatibleSpectra(_)));
        assert!(!a.is_modified());
        assert!(a.raw_data().unwrap().iter().all(|&v| v == 2.0));
    }

    #[test]
    fn mismatched_shapes_are_incompatible() {
        let mut a = loaded(2.0, 1);
        let mut b = Spectrum::new(SpectrumKind::Background, "b");
        b.add_data(Array3::from_elem((4, 6, 3), 1.0).into_dyn()).unwrap();
        b.set_num_frames(1).unwrap();

        assert!(matches!(
            a.subtract(&b),
            Err(SpectrumError::IncompatibleSpectra(_))
        ));
    }

    #[test]
    fn non_finite_scalar_is_rejected() {
        let mut spectrum = loaded(1.0, 1);
        assert!(matches!(
            spectrum.subtract(f64::NAN),
            Err(SpectrumError::ContractViolation(_))
        ));
    }

    #[test]
    fn average_divides_by_frame_count() {
        let mut spectrum = loaded(12.0, 4);
        spectrum.average().unwrap();
        assert!(spectrum.raw_data().unwrap().iter().all(|&v| v == 3.0));
        assert!(spectrum.is_modified());
    }

    #[test]
    fn average_without_frame_count_fails() {
        let mut spectrum = Spectrum::new(SpectrumKind::Spectrum, "image");
        spectrum
            .add_data(Array2::from_elem((2, 2), 4.0).into_dyn())
            .unwrap();
        assert!(matches!(
            spectrum.average(),
            Err(SpectrumError::FrameCountUnset)
        ));
    }

    #[test]
    fn process_moves_to_reduced_and_arithmetic_invalidates() {
        let mut spectrum = Spectrum::new(SpectrumKind::Spectrum, "gray");
        spectrum
            .add_data(Array2::from_elem((3, 4), 20.0).into_dyn())
            .unwrap();
        spectrum.set_num_frames(2).unwrap();

        spectrum.process(10, &ReduceConfig::default()).unwrap();
        assert_eq!(spectrum.state(), SpectrumState::Reduced);
        assert_eq!(spectrum.threshold(), Some(10));
        assert_eq!(spectrum.spectrum1d().unwrap().to_vec(), vec![60.0; 4]);

        spectrum.average().unwrap();
        assert_eq!(spectrum.state(), SpectrumState::Loaded);
        assert!(spectrum.spectrum1d().is_err());

        // 20 / 2 = 10 survives threshold 10, but not 11.
        spectrum.process(11, &ReduceConfig::default()).unwrap();
        assert_eq!(spectrum.spectrum1d().unwrap().to_vec(), vec![0.0; 4]);
        spectrum.process(10, &ReduceConfig::default()).unwrap();
        assert_eq!(spectrum.spectrum1d().unwrap().to_vec(), vec![30.0; 4]);
        assert_eq!(spectrum.threshold(), Some(10));
    }

    #[test]
    fn summary_reports_range() {
        let mut spectrum = Spectrum::new(SpectrumKind::Unspecified, "s");
        spectrum
            .add_data(Array2::from_shape_vec((1, 4), vec![-1.0, 0.0, 2.0, 3.0]).unwrap().into_dyn())
            .unwrap();
        let summary = spectrum.summary().unwrap();
        assert_eq!(summary.shape, vec![1, 4]);
        assert_eq!(summary.min, -1.0);
        assert_eq!(summary.max, 3.0);
        assert_eq!(summary.mean, 1.0);
    }

    #[test]
    fn kind_parses_and_displays() {
        for kind in [
            SpectrumKind::Background,
            SpectrumKind::Spectrum,
            SpectrumKind::Unspecified,
        ] {
            assert_eq!(kind.to_string().parse::<SpectrumKind>().unwrap(), kind);
        }
        assert!("foreground".parse::<SpectrumKind>().is_err());
    }
}
