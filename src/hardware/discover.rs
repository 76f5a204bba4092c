use std::path::{Path, PathBuf};

const VIDEO_DEVICES: [&str; 2] = ["/dev/video0", "/dev/video1"];
const SERIAL_DEVICES: [&str; 2] = ["/dev/ttyACM0", "/dev/ttyACM1"];

/// First camera device node that exists.
pub fn find_video_device() -> Option<PathBuf> {
    first_existing(VIDEO_DEVICES.iter().map(Path::new))
}

/// First USB serial device node that exists.
pub fn find_serial_device() -> Option<PathBuf> {
    first_existing(SERIAL_DEVICES.iter().map(Path::new))
}

fn first_existing<'a>(candidates: impl IntoIterator<Item = &'a Path>) -> Option<PathBuf> {
    candidates
        .into_iter()
        .find(|p| p.exists())
        .map(Path::to_path_buf)
}
