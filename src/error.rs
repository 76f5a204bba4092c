use std::time::Duration;

use thiserror::Error;

// ---------------------------------------------------------------------------
// Acquisition errors
// ---------------------------------------------------------------------------

/// Failures raised by a frame source or while accumulating frames.
///
/// None of these are retried: the caller decides whether to start a whole
/// new measurement.
#[derive(Error, Debug)]
pub enum AcquisitionError {
    #[error("frame source could not be opened: {0}")]
    Open(String),

    #[error("frame source ended after {achieved} of {requested} frames")]
    EndOfStream { achieved: usize, requested: usize },

    #[error("no frame within {timeout:?} (frame {frame_index})")]
    Timeout {
        frame_index: usize,
        timeout: Duration,
    },

    #[error("device error: {0}")]
    Device(String),

    #[error("frame {frame_index} has shape {actual:?}, source declared {expected:?}")]
    FrameShape {
        frame_index: usize,
        expected: [usize; 3],
        actual: Vec<usize>,
    },
}

/// Errors a frame source reports for a single read.
#[derive(Error, Debug)]
pub enum SourceError {
    #[error("read timed out")]
    Timeout,

    #[error("{0}")]
    Device(String),
}

/// Errors from the serial light source.
#[derive(Error, Debug)]
pub enum LightSourceError {
    #[error("unknown emitter: {0}")]
    UnknownEmitter(String),

    #[error("brightness {0} outside 0..=1023")]
    InvalidBrightness(u16),

    #[error("serial port: {0}")]
    Serial(#[from] serialport::Error),

    #[error("serial write failed: {0}")]
    Io(#[from] std::io::Error),
}

// ---------------------------------------------------------------------------
// Spectrum errors
// ---------------------------------------------------------------------------

/// Top-level error type of the crate.
#[derive(Error, Debug)]
pub enum SpectrumError {
    /// An argument has the wrong type or range. Caller bug.
    #[error("contract violation: {0}")]
    ContractViolation(String),

    /// A pipeline step ran before the step that produces its input.
    #[error("{0} not found")]
    DataNotFound(&'static str),

    #[error("incompatible spectra: {0}")]
    IncompatibleSpectra(String),

    #[error("number of frames not set")]
    FrameCountUnset,

    #[error("unsupported file format: {0}")]
    UnsupportedFormat(String),

    #[error("malformed file: {0}")]
    Malformed(String),

    #[error(transparent)]
    LightSource(#[from] LightSourceError),

    #[error(transparent)]
    Acquisition(#[from] AcquisitionError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("array shape error: {0}")]
    Shape(#[from] ndarray::ShapeError),

    #[error("Arrow error: {0}")]
    Arrow(#[from] arrow::error::ArrowError),

    #[error("Parquet error: {0}")]
    Parquet(#[from] parquet::errors::ParquetError),
}

pub type Result<T> = std::result::Result<T, SpectrumError>;
