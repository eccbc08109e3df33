//! Capture profiles and JPEG encoding.

use std::time::{Duration, Instant};

use image::DynamicImage;
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use serde::{Deserialize, Serialize};

use super::{CaptureError, Frame};
use crate::utils::mime::types::JPEG;

/// Trade-off between bandwidth and quality.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum Profile {
    /// ~24 fps, 480p-bounded, quality 60. Keeps the socket light for remote
    /// browser sources.
    #[default]
    Bandwidth,
    /// ~60 fps, native resolution, quality 85. For a browser source on the
    /// same machine.
    Local,
}

impl Profile {
    pub const fn min_interval(self) -> Duration {
        match self {
            Self::Bandwidth => Duration::from_millis(41),
            Self::Local => Duration::from_millis(16),
        }
    }

    pub const fn quality(self) -> u8 {
        match self {
            Self::Bandwidth => 60,
            Self::Local => 85,
        }
    }

    /// Largest output size; frames above it are scaled down.
    pub const fn max_size(self) -> Option<(u32, u32)> {
        match self {
            Self::Bandwidth => Some((854, 480)),
            Self::Local => None,
        }
    }

    pub fn encode_settings(self) -> EncodeSettings {
        EncodeSettings {
            quality: self.quality(),
            max_size: self.max_size(),
        }
    }
}

/// JPEG encoding parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EncodeSettings {
    /// JPEG quality, 1-100.
    pub quality: u8,
    pub max_size: Option<(u32, u32)>,
}

/// Encode `image` as JPEG, scaling it down to fit `settings.max_size`.
///
/// Aspect ratio is preserved and frames are never scaled up.
pub fn encode_frame(
    image: &DynamicImage,
    settings: EncodeSettings,
    captured_at: Instant,
) -> Result<Frame, CaptureError> {
    let scaled;
    let image = match settings.max_size {
        Some((max_w, max_h)) if image.width() > max_w || image.height() > max_h => {
            scaled = image.resize(max_w, max_h, FilterType::Triangle);
            &scaled
        }
        _ => image,
    };

    let rgb = image.to_rgb8();
    let mut bytes = Vec::with_capacity(rgb.len() / 8);
    let encoder = JpegEncoder::new_with_quality(&mut bytes, settings.quality.clamp(1, 100));
    rgb.write_with_encoder(encoder)
        .map_err(CaptureError::Encode)?;

    Ok(Frame::new(bytes, JPEG, rgb.dimensions(), captured_at))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::RgbImage;

    fn solid(width: u32, height: u32) -> DynamicImage {
        DynamicImage::ImageRgb8(RgbImage::from_pixel(width, height, image::Rgb([200, 30, 30])))
    }

    fn decoded_size(frame: &Frame) -> (u32, u32) {
        let img = image::load_from_memory(frame.bytes()).unwrap();
        (img.width(), img.height())
    }

    #[test]
    fn test_profiles() {
        assert_eq!(Profile::Bandwidth.min_interval(), Duration::from_millis(41));
        assert!(Profile::Bandwidth.quality() < Profile::Local.quality());
        assert!(Profile::Local.max_size().is_none());
    }

    #[test]
    fn test_encode_keeps_small_frames() {
        let frame = encode_frame(&solid(100, 50), Profile::Bandwidth.encode_settings(), Instant::now()).unwrap();
        assert_eq!(frame.mime(), "image/jpeg");
        assert_eq!(frame.dimensions(), (100, 50));
        assert_eq!(decoded_size(&frame), (100, 50));
    }

    #[test]
    fn test_bandwidth_profile_scales_down() {
        let frame = encode_frame(&solid(1920, 1080), Profile::Bandwidth.encode_settings(), Instant::now()).unwrap();
        let (w, h) = decoded_size(&frame);
        assert!(w <= 854 && h <= 480);
        assert_eq!(frame.dimensions(), (w, h));
    }

    #[test]
    fn test_local_profile_keeps_native_size() {
        let frame = encode_frame(&solid(1280, 720), Profile::Local.encode_settings(), Instant::now()).unwrap();
        assert_eq!(decoded_size(&frame), (1280, 720));
    }

    #[test]
    fn test_profile_serde_names() {
        let profile: Profile = serde_json::from_str("\"local\"").unwrap();
        assert_eq!(profile, Profile::Local);
        assert_eq!(serde_json::to_string(&Profile::Bandwidth).unwrap(), "\"bandwidth\"");
    }
}
