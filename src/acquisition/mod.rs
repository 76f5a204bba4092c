//! Frame acquisition.
//!
//! A [`FrameSource`] hands out frames of a fixed shape; the accumulator sums
//! them into one `f64` buffer; the [`Spectrometer`] wires a frame source and
//! an optional light source into complete measurements.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use ndarray::Array3;

use crate::error::{AcquisitionError, SourceError};

pub mod accumulator;
pub mod config;
pub mod source;
pub mod spectrometer;

pub use accumulator::{accumulate, Accumulation, AccumulationOutcome};
pub use config::MeasurementConfig;
pub use source::{ImageSequenceSource, ReplaySource};
pub use spectrometer::{MeasurementOutcome, Spectrometer};

/// One 8-bit frame, `(height, width, channels)`.
pub type Frame = Array3<u8>;

/// Fixed frame geometry of a source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameShape {
    pub height: usize,
    pub width: usize,
    pub channels: usize,
}

impl FrameShape {
    pub fn new(height: usize, width: usize, channels: usize) -> Self {
        Self {
            height,
            width,
            channels,
        }
    }

    pub fn as_array(&self) -> [usize; 3] {
        [self.height, self.width, self.channels]
    }
}

/// Anything that yields camera frames.
///
/// Implementations own the device. `read_frame` blocks for at most `timeout`.
pub trait FrameSource {
    fn open(&mut self) -> Result<(), AcquisitionError>;

    fn is_open(&self) -> bool;

    /// Frame geometry; `None` until the source is open.
    fn shape(&self) -> Option<FrameShape>;

    /// Next frame, `Ok(None)` at end of stream.
    fn read_frame(&mut self, timeout: Duration) -> Result<Option<Frame>, SourceError>;
}

impl<S: FrameSource + ?Sized> FrameSource for Box<S> {
    fn open(&mut self) -> Result<(), AcquisitionError> {
        (**self).open()
    }

    fn is_open(&self) -> bool {
        (**self).is_open()
    }

    fn shape(&self) -> Option<FrameShape> {
        (**self).shape()
    }

    fn read_frame(&mut self, timeout: Duration) -> Result<Option<Frame>, SourceError> {
        (**self).read_frame(timeout)
    }
}

/// Shared abort flag, polled between frames.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// Clear the flag before the next measurement.
    pub fn reset(&self) {
        self.0.store(false, Ordering::SeqCst);
    }
}
