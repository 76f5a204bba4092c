use log::{debug, info};
use ndarray::Array3;

use super::{CancelToken, FrameShape, FrameSource, MeasurementConfig};
use crate::data::model::SpectrumKind;
use crate::error::{AcquisitionError, SourceError};

/// Raw sum of `num_frames` frames. Not divided by the frame count.
#[derive(Debug, Clone, PartialEq)]
pub struct Accumulation {
    pub data: Array3<f64>,
    pub num_frames: usize,
}

/// Result of an acquisition that did not fail.
#[derive(Debug, Clone, PartialEq)]
pub enum AccumulationOutcome {
    Completed(Accumulation),
    /// The operator aborted; the partial sum was discarded.
    Aborted { frames_accumulated: usize },
}

/// Drop `config.num_dropped_frames` warm-up frames, then sum
/// `config.num_frames` frames element-wise as `f64`.
///
/// Opens the source if needed. `kind` only labels the log output. The
/// cancel token is polled before every read, including warm-up reads.
pub fn accumulate<S: FrameSource + ?Sized>(
    source: &mut S,
    kind: SpectrumKind,
    config: &MeasurementConfig,
    cancel: &CancelToken,
) -> Result<AccumulationOutcome, AcquisitionError> {
    if !source.is_open() {
        source.open()?;
    }
    let shape = source
        .shape()
        .ok_or_else(|| AcquisitionError::Open("source reports no frame shape".to_string()))?;
    let timeout = config.frame_timeout();

    info!("Measuring {kind}");
    info!("Dropping first {} frames", config.num_dropped_frames);
    if config.show {
        info!("Enter q to abort.");
    }

    for i in 0..config.num_dropped_frames {
        if cancel.is_cancelled() {
            info!("Measurement of {kind} aborted while dropping frames");
            return Ok(AccumulationOutcome::Aborted {
                frames_accumulated: 0,
            });
        }
        match source.read_frame(timeout) {
            Ok(Some(_)) => {}
            Ok(None) => {
                return Err(AcquisitionError::EndOfStream {
                    achieved: 0,
                    requested: config.num_frames,
                })
            }
            Err(e) => return Err(source_error(e, i, timeout)),
        }
    }

    let mut data = Array3::<f64>::zeros((shape.height, shape.width, shape.channels));
    for i in 0..config.num_frames {
        if cancel.is_cancelled() {
            info!("Measurement of {kind} aborted after {i} frames");
            return Ok(AccumulationOutcome::Aborted {
                frames_accumulated: i,
            });
        }
        let frame = match source.read_frame(timeout) {
            Ok(Some(frame)) => frame,
            Ok(None) => {
                return Err(AcquisitionError::EndOfStream {
                    achieved: i,
                    requested: config.num_frames,
                })
            }
            Err(e) => return Err(source_error(e, config.num_dropped_frames + i, timeout)),
        };
        check_shape(&frame, shape, i)?;

        data.zip_mut_with(&frame, |acc, &v| *acc += f64::from(v));

        if config.show {
            info!("Capturing frame {i}");
        } else {
            debug!("Capturing frame {i}");
        }
    }

    Ok(AccumulationOutcome::Completed(Accumulation {
        data,
        num_frames: config.num_frames,
    }))
}

fn check_shape(frame: &Array3<u8>, shape: FrameShape, frame_index: usize) -> Result<(), AcquisitionError> {
    if frame.shape() != &shape.as_array()[..] {
        return Err(AcquisitionError::FrameShape {
            frame_index,
            expected: shape.as_array(),
            actual: frame.shape().to_vec(),
        });
    }
    Ok(())
}

fn source_error(e: SourceError, frame_index: usize, timeout: std::time::Duration) -> AcquisitionError {
    match e {
        SourceError::Timeout => AcquisitionError::Timeout {
            frame_index,
            timeout,
        },
        SourceError::Device(msg) => AcquisitionError::Device(msg),
    }
}
