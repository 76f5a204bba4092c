use std::io::Write;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use log::{debug, info};
use serialport::SerialPort;

use crate::error::LightSourceError;

/// Highest brightness value the microcontroller accepts (10-bit PWM).
pub const MAX_BRIGHTNESS: u16 = 1023;

/// Line rate of the microcontroller sketch.
pub const BAUD_RATE: u32 = 115_200;

const WRITE_TIMEOUT: Duration = Duration::from_millis(500);

/// A switchable light source toggled around measurements.
pub trait LightSource {
    fn on(&mut self) -> Result<(), LightSourceError>;
    fn off(&mut self) -> Result<(), LightSourceError>;
    fn set_brightness(&mut self, value: u16) -> Result<(), LightSourceError>;
}

impl<L: LightSource + ?Sized> LightSource for Box<L> {
    fn on(&mut self) -> Result<(), LightSourceError> {
        (**self).on()
    }

    fn off(&mut self) -> Result<(), LightSourceError> {
        (**self).off()
    }

    fn set_brightness(&mut self, value: u16) -> Result<(), LightSourceError> {
        (**self).set_brightness(value)
    }
}

/// Emitters wired to the microcontroller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Emitter {
    Blue,
}

impl Emitter {
    /// Output pin the emitter is wired to.
    pub fn pin(self) -> u8 {
        match self {
            Emitter::Blue => 13,
        }
    }
}

impl FromStr for Emitter {
    type Err = LightSourceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "blue" => Ok(Emitter::Blue),
            other => Err(LightSourceError::UnknownEmitter(other.to_string())),
        }
    }
}

/// Light source behind a serial link to a microcontroller.
///
/// Protocol: `'1'` switches the emitter on, `'0'` off, and `B<value>\n` sets
/// the brightness. Generic over the port so any `Write` (a serial port, a
/// buffer in tests) can carry it.
#[derive(Debug)]
pub struct SerialLightSource<W: Write> {
    port: W,
    emitter: Emitter,
}

impl<W: Write> SerialLightSource<W> {
    pub fn new(port: W, emitter: Emitter) -> Self {
        Self { port, emitter }
    }

    pub fn emitter(&self) -> Emitter {
        self.emitter
    }

    pub fn into_inner(self) -> W {
        self.port
    }

    fn send(&mut self, bytes: &[u8]) -> Result<(), LightSourceError> {
        self.port.write_all(bytes)?;
        self.port.flush()?;
        Ok(())
    }
}

impl SerialLightSource<Box<dyn SerialPort>> {
    /// Open the serial device at [`BAUD_RATE`] with a bounded write timeout.
    pub fn open(device: &Path, emitter: Emitter) -> Result<Self, LightSourceError> {
        let path = device.to_string_lossy();
        info!("Opening light source on {path} at {BAUD_RATE} bps");
        let port = serialport::new(path, BAUD_RATE)
            .timeout(WRITE_TIMEOUT)
            .open()?;
        Ok(Self::new(port, emitter))
    }
}

impl<W: Write> LightSource for SerialLightSource<W> {
    fn on(&mut self) -> Result<(), LightSourceError> {
        debug!("Light source on (pin {})", self.emitter.pin());
        self.send(b"1")
    }

    fn off(&mut self) -> Result<(), LightSourceError> {
        debug!("Light source off (pin {})", self.emitter.pin());
        self.send(b"0")
    }

    fn set_brightness(&mut self, value: u16) -> Result<(), LightSourceError> {
        if value > MAX_BRIGHTNESS {
            return Err(LightSourceError::InvalidBrightness(value));
        }
        self.send(format!("B{value}\n").as_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn opening_missing_device_is_a_serial_error() {
        let dir = TempDir::new().unwrap();
        let missing = dir.path().join("ttyACM9");
        let err = SerialLightSource::open(&missing, Emitter::Blue).unwrap_err();
        assert!(matches!(err, LightSourceError::Serial(_)));
    }

    #[test]
    fn toggles_write_protocol_bytes() {
        let mut light = SerialLightSource::new(Vec::new(), Emitter::Blue);
        light.on().unwrap();
        light.off().unwrap();
        light.set_brightness(512).unwrap();
        assert_eq!(light.into_inner(), b"10B512\n".to_vec());
    }

    #[test]
    fn brightness_out_of_range_is_rejected() {
        let mut light = SerialLightSource::new(Vec::new(), Emitter::Blue);
        assert!(light.set_brightness(MAX_BRIGHTNESS).is_ok());
        assert!(matches!(
            light.set_brightness(1024),
            Err(LightSourceError::InvalidBrightness(1024))
        ));
    }

    #[test]
    fn emitter_lookup() {
        assert_eq!("blue".parse::<Emitter>().unwrap().pin(), 13);
        assert!(matches!(
            "green".parse::<Emitter>(),
            Err(LightSourceError::UnknownEmitter(_))
        ));
    }
}
