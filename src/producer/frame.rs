//! Encoded video frames.

use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;

/// One encoded frame, ready for broadcast.
///
/// Cheap to clone: the encoded bytes are shared.
#[derive(Clone)]
pub struct Frame {
    bytes: Arc<[u8]>,
    mime: &'static str,
    width: u32,
    height: u32,
    captured_at: Instant,
}

impl Frame {
    pub fn new(bytes: Vec<u8>, mime: &'static str, (width, height): (u32, u32), captured_at: Instant) -> Self {
        Self {
            bytes: bytes.into(),
            mime,
            width,
            height,
            captured_at,
        }
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn mime(&self) -> &'static str {
        self.mime
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn captured_at(&self) -> Instant {
        self.captured_at
    }

    /// `data:<mime>;base64,<bytes>`, the form overlay pages assign to `<img src>`.
    pub fn to_data_url(&self) -> String {
        format!("data:{};base64,{}", self.mime, STANDARD.encode(&self.bytes))
    }
}

impl fmt::Debug for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Frame")
            .field("mime", &self.mime)
            .field("width", &self.width)
            .field("height", &self.height)
            .field("len", &self.bytes.len())
            .finish()
    }
}
