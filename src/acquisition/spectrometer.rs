use log::{info, warn};

use super::{accumulate, AccumulationOutcome, CancelToken, FrameSource, MeasurementConfig};
use crate::data::model::{Spectrum, SpectrumKind};
use crate::error::Result;
use crate::hardware::LightSource;

/// Result of a measurement that did not fail.
#[derive(Debug, Clone, PartialEq)]
pub enum MeasurementOutcome {
    Completed(Spectrum),
    Aborted { frames_accumulated: usize },
}

impl MeasurementOutcome {
    pub fn into_spectrum(self) -> Option<Spectrum> {
        match self {
            MeasurementOutcome::Completed(spectrum) => Some(spectrum),
            MeasurementOutcome::Aborted { .. } => None,
        }
    }
}

/// The whole instrument: a detector and, optionally, a light source.
pub struct Spectrometer<S: FrameSource> {
    detector: S,
    light: Option<Box<dyn LightSource>>,
    cancel: CancelToken,
}

impl<S: FrameSource> Spectrometer<S> {
    pub fn new(detector: S) -> Self {
        Self {
            detector,
            light: None,
            cancel: CancelToken::new(),
        }
    }

    pub fn with_light(mut self, light: impl LightSource + 'static) -> Self {
        self.light = Some(Box::new(light));
        self
    }

    /// Token that aborts the running measurement when cancelled.
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    pub fn detector(&self) -> &S {
        &self.detector
    }

    /// Measure with the light source off.
    pub fn measure_background(&mut self, config: &MeasurementConfig) -> Result<MeasurementOutcome> {
        if let Some(light) = self.light.as_mut() {
            light.off()?;
        }
        self.acquire(SpectrumKind::Background, config)
    }

    /// Measure with the light source on. The light is switched off again
    /// whether or not the acquisition succeeds.
    ///
    /// A failure to switch the light off is returned only when the
    /// acquisition itself succeeded; otherwise it is logged and the
    /// acquisition error wins.
    pub fn measure_spectrum(&mut self, config: &MeasurementConfig) -> Result<MeasurementOutcome> {
        match self.light.as_mut() {
            Some(light) => light.on()?,
            None => warn!("No light source attached; measuring with ambient light"),
        }
        let outcome = self.acquire(SpectrumKind::Spectrum, config);
        if let Some(light) = self.light.as_mut() {
            if let Err(err) = light.off() {
                if outcome.is_err() {
                    warn!("Failed to switch light source off: {err}");
                } else {
                    return Err(err.into());
                }
            }
        }
        outcome
    }

    /// Dispatch on kind; `Unspecified` measures without touching the light.
    pub fn measure(&mut self, kind: SpectrumKind, config: &MeasurementConfig) -> Result<MeasurementOutcome> {
        match kind {
            SpectrumKind::Background => self.measure_background(config),
            SpectrumKind::Spectrum => self.measure_spectrum(config),
            SpectrumKind::Unspecified => self.acquire(kind, config),
        }
    }

    fn acquire(&mut self, kind: SpectrumKind, config: &MeasurementConfig) -> Result<MeasurementOutcome> {
        self.cancel.reset();
        match accumulate(&mut self.detector, kind, config, &self.cancel)? {
            AccumulationOutcome::Completed(accumulation) => {
                let spectrum = Spectrum::from_accumulation(kind, config.name.clone(), accumulation)?;
                info!("Measured {kind} '{}' from {} frames", config.name, config.num_frames);
                Ok(MeasurementOutcome::Completed(spectrum))
            }
            AccumulationOutcome::Aborted { frames_accumulated } => {
                Ok(MeasurementOutcome::Aborted { frames_accumulated })
            }
        }
    }
}
