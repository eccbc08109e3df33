//! `[producer]` section configuration.
//!
//! # Example
//!
//! ```toml
//! [producer]
//! enabled = true              # Capture video at launch
//! profile = "bandwidth"       # bandwidth (~24 fps, 480p) or local (~60 fps, native)
//! source = "test-pattern"     # or a path to a PNG/JPEG that is re-read on change
//! tick_ms = 16                # Scheduling cadence
//! # min_interval_ms = 41      # Override the profile's frame interval
//! # quality = 60              # Override the profile's JPEG quality
//!
//! [producer.crop]             # Optional initial crop, in source pixels
//! x = 0
//! y = 0
//! width = 640
//! height = 360
//! ```

use std::convert::Infallible;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::crop::CropRegion;
use crate::producer::{Profile, StillImage, TestPattern, VideoSource};

/// Where frames come from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum SourceSpec {
    TestPattern,
    Image(PathBuf),
}

impl SourceSpec {
    pub fn open(&self) -> Box<dyn VideoSource> {
        match self {
            Self::TestPattern => Box::new(TestPattern::default()),
            Self::Image(path) => Box::new(StillImage::new(path.clone())),
        }
    }
}

impl FromStr for SourceSpec {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "test-pattern" => Self::TestPattern,
            path => Self::Image(PathBuf::from(path)),
        })
    }
}

impl From<String> for SourceSpec {
    fn from(value: String) -> Self {
        match value.parse() {
            Ok(spec) => spec,
            Err(never) => match never {},
        }
    }
}

impl From<SourceSpec> for String {
    fn from(value: SourceSpec) -> Self {
        value.to_string()
    }
}

impl fmt::Display for SourceSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TestPattern => f.write_str("test-pattern"),
            Self::Image(path) => write!(f, "{}", path.display()),
        }
    }
}

/// Initial crop in source pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CropSection {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

/// Video producer settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProducerConfig {
    /// Capture video at launch.
    pub enabled: bool,

    pub profile: Profile,

    pub source: SourceSpec,

    /// Scheduling cadence in milliseconds.
    pub tick_ms: u64,

    /// Overrides the profile's minimum frame interval.
    pub min_interval_ms: Option<u64>,

    /// Overrides the profile's JPEG quality.
    pub quality: Option<u8>,

    pub crop: Option<CropSection>,
}

impl Default for ProducerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            profile: Profile::default(),
            source: SourceSpec::TestPattern,
            tick_ms: 16,
            min_interval_ms: None,
            quality: None,
            crop: None,
        }
    }
}

impl ProducerConfig {
    pub fn tick(&self) -> Duration {
        Duration::from_millis(self.tick_ms)
    }

    pub fn min_interval(&self) -> Duration {
        self.min_interval_ms
            .map_or_else(|| self.profile.min_interval(), Duration::from_millis)
    }

    pub fn quality(&self) -> u8 {
        self.quality.unwrap_or_else(|| self.profile.quality())
    }

    /// The configured crop, already checked by `validate`.
    pub fn crop_region(&self) -> Option<CropRegion> {
        self.crop
            .and_then(|c| CropRegion::new(c.x, c.y, c.width, c.height).ok())
    }

    pub(in crate::config) fn validate(&self) -> Result<(), String> {
        if self.tick_ms == 0 {
            return Err("[producer] tick_ms must be non-zero".into());
        }
        if let Some(quality) = self.quality
            && !(1..=100).contains(&quality)
        {
            return Err(format!("[producer] quality must be 1-100, got {quality}"));
        }
        if let Some(c) = self.crop {
            CropRegion::new(c.x, c.y, c.width, c.height)
                .map_err(|e| format!("[producer.crop] {e}"))?;
        }
        Ok(())
    }
}
