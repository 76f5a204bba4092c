use ndarray::{s, Array1, Array2, ArrayD, ArrayView2, Axis, Ix2, Ix3, Zip};
use serde::{Deserialize, Serialize};

use crate::error::{Result, SpectrumError};

/// ITU-R BT.601 luma weights, the same ones webcam toolchains use for
/// colour-to-gray conversion.
pub const LUMA_R: f64 = 0.299;
pub const LUMA_G: f64 = 0.587;
pub const LUMA_B: f64 = 0.114;

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Rectangular region of interest, in pixels of the accumulated image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Roi {
    pub row: usize,
    pub col: usize,
    pub height: usize,
    pub width: usize,
}

impl Roi {
    pub fn new(row: usize, col: usize, height: usize, width: usize) -> Self {
        Self {
            row,
            col,
            height,
            width,
        }
    }

    /// Check that the ROI is non-empty and lies inside an image of the given size.
    pub fn validate_for(&self, height: usize, width: usize) -> Result<()> {
        if self.height == 0 || self.width == 0 {
            return Err(SpectrumError::ContractViolation(
                "ROI has zero dimensions".to_string(),
            ));
        }
        self.bounds(height, width).map(|_| ())
    }

    /// End row and end column (exclusive) inside an image of the given size.
    fn bounds(&self, height: usize, width: usize) -> Result<(usize, usize)> {
        match (self.row.checked_add(self.height), self.col.checked_add(self.width)) {
            (Some(row_end), Some(col_end)) if row_end <= height && col_end <= width => {
                Ok((row_end, col_end))
            }
            _ => Err(SpectrumError::ContractViolation(format!(
                "ROI {}x{} at ({}, {}) extends beyond image bounds ({height}x{width})",
                self.height, self.width, self.row, self.col
            ))),
        }
    }
}

/// Channel layout of three-channel data.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelOrder {
    /// Webcam native order, also what the image loaders in this crate produce.
    #[default]
    Bgr,
    Rgb,
}

impl ChannelOrder {
    /// Channel indices of (red, green, blue).
    fn rgb_indices(self) -> (usize, usize, usize) {
        match self {
            ChannelOrder::Bgr => (2, 1, 0),
            ChannelOrder::Rgb => (0, 1, 2),
        }
    }
}

/// Explicit reduction settings. Nothing is inferred from the image resolution.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ReduceConfig {
    #[serde(default)]
    pub roi: Option<Roi>,
    #[serde(default)]
    pub channel_order: ChannelOrder,
}

// ---------------------------------------------------------------------------
// Reduction result
// ---------------------------------------------------------------------------

/// Derived data produced by [`SpectralReducer::process`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reduction {
    /// Grayscale image with every pixel below `threshold` set to zero.
    pub spectrum2d: Array2<f64>,
    /// Column sums of `spectrum2d`: intensity per horizontal pixel.
    pub spectrum1d: Array1<f64>,
    pub threshold: u32,
}

// ---------------------------------------------------------------------------
// Reducer
// ---------------------------------------------------------------------------

/// Reduces an accumulated 2D/3D image to a 1D, uncalibrated spectrum.
#[derive(Debug, Clone, Default)]
pub struct SpectralReducer {
    config: ReduceConfig,
}

impl SpectralReducer {
    pub fn new(config: ReduceConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ReduceConfig {
        &self.config
    }

    /// Crop to the ROI and reduce to a single luminance channel.
    ///
    /// Accepts `(H, W)`, `(H, W, 1)` and `(H, W, 3)` arrays.
    pub fn grayscale(&self, data: &ArrayD<f64>) -> Result<Array2<f64>> {
        match data.ndim() {
            2 => {
                let image = data.view().into_dimensionality::<Ix2>()?;
                let (height, width) = image.dim();
                let (rows, cols) = self.crop_ranges(height, width)?;
                Ok(image.slice(s![rows.0..rows.1, cols.0..cols.1]).to_owned())
            }
            3 => {
                let image = data.view().into_dimensionality::<Ix3>()?;
                let (height, width, channels) = image.dim();
                let (rows, cols) = self.crop_ranges(height, width)?;
                let roi = image.slice(s![rows.0..rows.1, cols.0..cols.1, ..]);
                match channels {
                    1 => Ok(roi.index_axis(Axis(2), 0).to_owned()),
                    3 => {
                        let (r, g, b) = self.config.channel_order.rgb_indices();
                        Ok(Zip::from(roi.index_axis(Axis(2), r))
                            .and(roi.index_axis(Axis(2), g))
                            .and(roi.index_axis(Axis(2), b))
                            .map_collect(|&red, &green, &blue| luma(red, green, blue)))
                    }
                    n => Err(SpectrumError::ContractViolation(format!(
                        "cannot reduce {n}-channel data to grayscale"
                    ))),
                }
            }
            n => Err(SpectrumError::ContractViolation(format!(
                "expected a 2D or 3D array, got {n} dimensions"
            ))),
        }
    }

    /// Full reduction: grayscale, threshold mask, column projection.
    pub fn process(&self, data: &ArrayD<f64>, threshold: u32) -> Result<Reduction> {
        let gray = self.grayscale(data)?;
        let spectrum2d = threshold_mask(gray.view(), threshold);
        let spectrum1d = project_columns(spectrum2d.view());
        Ok(Reduction {
            spectrum2d,
            spectrum1d,
            threshold,
        })
    }

    fn crop_ranges(&self, height: usize, width: usize) -> Result<((usize, usize), (usize, usize))> {
        match self.config.roi {
            Some(roi) => {
                roi.validate_for(height, width)?;
                let (row_end, col_end) = roi.bounds(height, width)?;
                Ok(((roi.row, row_end), (roi.col, col_end)))
            }
            None => Ok(((0, height), (0, width))),
        }
    }
}

/// BT.601 luma. Expanded around green so equal channels map to exactly that
/// value; the weights sum to one, so this equals `R*LUMA_R + G*LUMA_G + B*LUMA_B`.
fn luma(red: f64, green: f64, blue: f64) -> f64 {
    green + LUMA_R * (red - green) + LUMA_B * (blue - green)
}

/// Keep every value `>= threshold`, replace the rest with zero.
pub fn threshold_mask(gray: ArrayView2<f64>, threshold: u32) -> Array2<f64> {
    let t = f64::from(threshold);
    gray.mapv(|v| if v >= t { v } else { 0.0 })
}

/// Sum over rows, one value per pixel column.
pub fn project_columns(image: ArrayView2<f64>) -> Array1<f64> {
    image.sum_axis(Axis(0))
}
