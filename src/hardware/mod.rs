//! Device glue around the acquisition core: light sources and device discovery.

pub mod discover;
pub mod light;

pub use discover::{find_serial_device, find_video_device};
pub use light::{Emitter, LightSource, SerialLightSource, BAUD_RATE, MAX_BRIGHTNESS};
