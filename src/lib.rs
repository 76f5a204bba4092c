//! Acquisition and reduction of spectra from a webcam spectrometer.
//!
//! Frames from a [`acquisition::FrameSource`] are summed by the accumulator,
//! wrapped in a [`data::model::Spectrum`], reduced to a 1D spectrum by
//! thresholded column projection, and combined (background subtraction,
//! frame averaging) before being saved or exported.

pub mod acquisition;
pub mod data;
pub mod error;
pub mod hardware;

pub use data::model::{Spectrum, SpectrumKind, SpectrumState, SubtractOperand};
pub use data::reduce::{ReduceConfig, Roi};
pub use error::{Result, SpectrumError};
