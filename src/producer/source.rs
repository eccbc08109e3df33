//! Video sources the producer can capture from.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use image::{DynamicImage, Rgb, RgbImage};
use thiserror::Error;

/// Capture and encode failures. None of them are fatal for the producer.
#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("video source unavailable: {0}")]
    SourceUnavailable(String),

    #[error("failed to decode source image")]
    Decode(#[source] image::ImageError),

    #[error("failed to encode frame")]
    Encode(#[source] image::ImageError),
}

/// Something that yields the current video frame on demand.
pub trait VideoSource: Send {
    /// Human-readable name for logs.
    fn describe(&self) -> String;

    /// Capture the current frame in native resolution.
    fn grab(&mut self) -> Result<DynamicImage, CaptureError>;
}

impl<S: VideoSource + ?Sized> VideoSource for Box<S> {
    fn describe(&self) -> String {
        (**self).describe()
    }

    fn grab(&mut self) -> Result<DynamicImage, CaptureError> {
        (**self).grab()
    }
}

// ============================================================================
// Test pattern
// ============================================================================

/// Color bars that scroll one step per grab, so a viewer can tell the feed
/// is live.
pub struct TestPattern {
    width: u32,
    height: u32,
    step: u32,
}

const BARS: [[u8; 3]; 7] = [
    [192, 192, 192],
    [192, 192, 0],
    [0, 192, 192],
    [0, 192, 0],
    [192, 0, 192],
    [192, 0, 0],
    [0, 0, 192],
];

impl TestPattern {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width: width.max(1),
            height: height.max(1),
            step: 0,
        }
    }
}

impl Default for TestPattern {
    fn default() -> Self {
        Self::new(1280, 720)
    }
}

impl VideoSource for TestPattern {
    fn describe(&self) -> String {
        format!("test pattern {}x{}", self.width, self.height)
    }

    fn grab(&mut self) -> Result<DynamicImage, CaptureError> {
        let bar_width = (self.width / BARS.len() as u32).max(1);
        let shift = self.step % self.width;
        let img = RgbImage::from_fn(self.width, self.height, |x, _| {
            let bar = ((x + shift) % self.width / bar_width) as usize % BARS.len();
            Rgb(BARS[bar])
        });
        self.step = self.step.wrapping_add(4);
        Ok(DynamicImage::ImageRgb8(img))
    }
}

// ============================================================================
// Still image
// ============================================================================

/// An image file on disk, re-decoded whenever it changes.
///
/// A missing file makes the source unavailable until it reappears.
pub struct StillImage {
    path: PathBuf,
    cached: Option<(SystemTime, DynamicImage)>,
}

impl StillImage {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            cached: None,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl VideoSource for StillImage {
    fn describe(&self) -> String {
        format!("image {}", self.path.display())
    }

    fn grab(&mut self) -> Result<DynamicImage, CaptureError> {
        let modified = fs::metadata(&self.path)
            .and_then(|meta| meta.modified())
            .map_err(|e| {
                self.cached = None;
                CaptureError::SourceUnavailable(format!("{}: {e}", self.path.display()))
            })?;

        if let Some((cached_at, image)) = &self.cached
            && *cached_at == modified
        {
            return Ok(image.clone());
        }

        let image = image::open(&self.path).map_err(CaptureError::Decode)?;
        self.cached = Some((modified, image.clone()));
        Ok(image)
    }
}
