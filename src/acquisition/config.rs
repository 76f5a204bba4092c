use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Result, SpectrumError};

fn default_frame_timeout_ms() -> u64 {
    5000
}

/// Settings for one measurement.
///
/// Constructed through [`MeasurementConfig::new`] or deserialized from JSON;
/// both paths validate. Unknown keys are rejected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawMeasurementConfig")]
pub struct MeasurementConfig {
    /// Frames summed into the result.
    pub num_frames: usize,
    /// Warm-up frames read and discarded first (auto-exposure settling).
    pub num_dropped_frames: usize,
    /// Report every captured frame and accept an operator abort.
    pub show: bool,
    pub name: String,
    pub frame_timeout_ms: u64,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct RawMeasurementConfig {
    num_frames: usize,
    num_dropped_frames: usize,
    #[serde(default)]
    show: bool,
    name: String,
    #[serde(default = "default_frame_timeout_ms")]
    frame_timeout_ms: u64,
}

impl TryFrom<RawMeasurementConfig> for MeasurementConfig {
    type Error = SpectrumError;

    fn try_from(raw: RawMeasurementConfig) -> Result<Self> {
        Ok(Self::new(raw.num_frames, raw.num_dropped_frames, raw.name)?
            .with_show(raw.show)
            .with_frame_timeout(Duration::from_millis(raw.frame_timeout_ms)))
    }
}

impl MeasurementConfig {
    pub fn new(num_frames: usize, num_dropped_frames: usize, name: impl Into<String>) -> Result<Self> {
        let name = name.into();
        if num_frames == 0 {
            return Err(SpectrumError::ContractViolation(
                "num_frames must be positive".to_string(),
            ));
        }
        if name.trim().is_empty() {
            return Err(SpectrumError::ContractViolation(
                "measurement name must not be empty".to_string(),
            ));
        }
        Ok(Self {
            num_frames,
            num_dropped_frames,
            show: false,
            name,
            frame_timeout_ms: default_frame_timeout_ms(),
        })
    }

    pub fn with_show(mut self, show: bool) -> Self {
        self.show = show;
        self
    }

    pub fn with_frame_timeout(mut self, timeout: Duration) -> Self {
        self.frame_timeout_ms = timeout.as_millis().try_into().unwrap_or(u64::MAX);
        self
    }

    pub fn frame_timeout(&self) -> Duration {
        Duration::from_millis(self.frame_timeout_ms)
    }

    /// Load from a JSON file.
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&text)?)
    }
}
