//! Crop rectangle in source-pixel space.

use std::fmt;

use image::DynamicImage;
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CropError {
    #[error("crop region must have positive width and height (got {width}x{height})")]
    Empty { width: u32, height: u32 },
}

/// A rectangle in source-video pixel coordinates.
///
/// Width and height are always positive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct CropRegion {
    x: u32,
    y: u32,
    width: u32,
    height: u32,
}

impl CropRegion {
    pub fn new(x: u32, y: u32, width: u32, height: u32) -> Result<Self, CropError> {
        if width == 0 || height == 0 {
            return Err(CropError::Empty { width, height });
        }
        Ok(Self {
            x,
            y,
            width,
            height,
        })
    }

    pub const fn x(&self) -> u32 {
        self.x
    }

    pub const fn y(&self) -> u32 {
        self.y
    }

    pub const fn width(&self) -> u32 {
        self.width
    }

    pub const fn height(&self) -> u32 {
        self.height
    }

    /// Intersect with a `source_width` x `source_height` frame.
    ///
    /// Returns `None` when the region lies entirely outside the frame, which
    /// happens when a crop was committed against a larger resolution than the
    /// source currently delivers.
    pub fn clip_to(&self, source_width: u32, source_height: u32) -> Option<Self> {
        if self.x >= source_width || self.y >= source_height {
            return None;
        }
        Some(Self {
            x: self.x,
            y: self.y,
            width: self.width.min(source_width - self.x),
            height: self.height.min(source_height - self.y),
        })
    }

    /// Extract this region from `frame`.
    ///
    /// Regions are not validated against the frame when they are committed, so
    /// a stale region is clipped to the frame bounds here. If nothing of it
    /// remains, the full frame is returned unchanged.
    pub fn extract(&self, frame: &DynamicImage) -> DynamicImage {
        match self.clip_to(frame.width(), frame.height()) {
            Some(clipped) => frame.crop_imm(clipped.x, clipped.y, clipped.width, clipped.height),
            None => {
                crate::debug!("frame"; "crop {} outside {}x{} source, using full frame", self, frame.width(), frame.height());
                frame.clone()
            }
        }
    }
}

impl fmt::Display for CropRegion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}+{}+{}", self.width, self.height, self.x, self.y)
    }
}
