use std::path::{Path, PathBuf};
use std::time::Duration;

use log::debug;

use super::{Frame, FrameShape, FrameSource};
use crate::data::loader::{extension, rgb_image_to_bgr};
use crate::error::{AcquisitionError, SourceError};

// ---------------------------------------------------------------------------
// ReplaySource – scripted in-memory frames
// ---------------------------------------------------------------------------

/// Plays back a fixed list of frames, then reports end of stream.
pub struct ReplaySource {
    frames: Vec<Frame>,
    index: usize,
    open: bool,
    stall_at: Option<usize>,
    on_read: Option<Box<dyn FnMut(usize)>>,
}

impl ReplaySource {
    pub fn new(frames: Vec<Frame>) -> Self {
        Self {
            frames,
            index: 0,
            open: false,
            stall_at: None,
            on_read: None,
        }
    }

    /// Report a timeout instead of delivering the read with this index.
    pub fn with_stall_at(mut self, index: usize) -> Self {
        self.stall_at = Some(index);
        self
    }

    /// Call `hook` with the read index before every read.
    pub fn on_read(mut self, hook: impl FnMut(usize) + 'static) -> Self {
        self.on_read = Some(Box::new(hook));
        self
    }

    /// Number of reads served so far.
    pub fn reads(&self) -> usize {
        self.index
    }

    pub fn reset(&mut self) {
        self.index = 0;
    }
}

impl FrameSource for ReplaySource {
    fn open(&mut self) -> Result<(), AcquisitionError> {
        if self.frames.is_empty() {
            return Err(AcquisitionError::Open("no frames to replay".to_string()));
        }
        self.open = true;
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.open
    }

    fn shape(&self) -> Option<FrameShape> {
        if !self.open {
            return None;
        }
        self.frames.first().map(|f| {
            let (h, w, c) = f.dim();
            FrameShape::new(h, w, c)
        })
    }

    fn read_frame(&mut self, _timeout: Duration) -> Result<Option<Frame>, SourceError> {
        if !self.open {
            return Err(SourceError::Device("source not open".to_string()));
        }
        let index = self.index;
        self.index += 1;
        if let Some(hook) = self.on_read.as_mut() {
            hook(index);
        }
        if self.stall_at == Some(index) {
            return Err(SourceError::Timeout);
        }
        Ok(self.frames.get(index).cloned())
    }
}

// ---------------------------------------------------------------------------
// ImageSequenceSource – frames from image files
// ---------------------------------------------------------------------------

/// Reads `.png`/`.jpg` frames from a directory in file name order.
///
/// Frames are delivered in BGR order like webcam frames. File reads do not
/// stall, so the timeout is not used.
#[derive(Debug)]
pub struct ImageSequenceSource {
    dir: PathBuf,
    files: Vec<PathBuf>,
    index: usize,
    shape: Option<FrameShape>,
}

impl ImageSequenceSource {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            files: Vec::new(),
            index: 0,
            shape: None,
        }
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    fn load(path: &Path) -> Result<Frame, image::ImageError> {
        Ok(rgb_image_to_bgr(&image::open(path)?.to_rgb8()))
    }
}

impl FrameSource for ImageSequenceSource {
    fn open(&mut self) -> Result<(), AcquisitionError> {
        let entries = std::fs::read_dir(&self.dir)
            .map_err(|e| AcquisitionError::Open(format!("{}: {e}", self.dir.display())))?;

        let mut files: Vec<PathBuf> = entries
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| matches!(extension(p).as_str(), "png" | "jpg" | "jpeg"))
            .collect();
        files.sort();

        let first = files.first().ok_or_else(|| {
            AcquisitionError::Open(format!("no image frames in {}", self.dir.display()))
        })?;
        let frame = Self::load(first)
            .map_err(|e| AcquisitionError::Open(format!("{}: {e}", first.display())))?;
        let (h, w, c) = frame.dim();

        debug!("Found {} frames of {w}x{h} in {}", files.len(), self.dir.display());
        self.shape = Some(FrameShape::new(h, w, c));
        self.files = files;
        self.index = 0;
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.shape.is_some()
    }

    fn shape(&self) -> Option<FrameShape> {
        self.shape
    }

    fn read_frame(&mut self, _timeout: Duration) -> Result<Option<Frame>, SourceError> {
        let Some(path) = self.files.get(self.index) else {
            return Ok(None);
        };
        self.index += 1;
        Self::load(path)
            .map(Some)
            .map_err(|e| SourceError::Device(format!("{}: {e}", path.display())))
    }
}
