//! Frame Producer - turns a video source into a bounded-rate frame stream.
//!
//! ```text
//! VideoSource --grab--> crop --encode--> FrameSink (latest-wins) --> BroadcastService
//! ```
//!
//! The producer runs on its own thread with its own cadence. Each tick
//! passes through a minimum-interval limiter; nothing is captured while the
//! producer is disabled or the server is not running.
//!
//! # Module Structure
//!
//! - `frame` - encoded frame type
//! - `profile` - bandwidth/local profiles and JPEG encoding
//! - `source` - `VideoSource` trait with test-pattern and still-image sources
//! - `throttle` - minimum-interval limiter

mod frame;
mod profile;
mod source;
mod throttle;

pub use frame::Frame;
pub use profile::{EncodeSettings, Profile, encode_frame};
pub use source::{CaptureError, StillImage, TestPattern, VideoSource};
pub use throttle::FrameThrottle;

use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use arc_swap::ArcSwapOption;
use parking_lot::Mutex;

use crate::bridge::FrameSink;
use crate::crop::CropRegion;
use crate::{debug, log};

/// Sleep between checks while there is nothing to capture for.
const IDLE_BACKOFF: Duration = Duration::from_millis(250);

/// Knobs the operator can turn while the producer runs.
pub struct ProducerControls {
    enabled: AtomicBool,
    crop: ArcSwapOption<CropRegion>,
    source_size: Mutex<Option<(u32, u32)>>,
}

impl ProducerControls {
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled: AtomicBool::new(enabled),
            crop: ArcSwapOption::empty(),
            source_size: Mutex::new(None),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Relaxed)
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::Relaxed);
    }

    pub fn crop(&self) -> Option<CropRegion> {
        self.crop.load_full().map(|region| *region)
    }

    pub fn set_crop(&self, region: Option<CropRegion>) {
        self.crop.store(region.map(Arc::new));
    }

    /// Native size of the last captured frame, if any.
    pub fn source_size(&self) -> Option<(u32, u32)> {
        *self.source_size.lock()
    }

    fn record_source_size(&self, size: (u32, u32)) {
        *self.source_size.lock() = Some(size);
    }
}

/// What a single scheduling tick did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// Disabled, or the server is not running. No capture work was done.
    Idle,
    /// Too soon after the previous frame.
    Throttled,
    /// The source has nothing to read.
    SourceUnavailable,
    /// A frame was captured but could not be decoded or encoded.
    Failed,
    /// A frame went into the sink.
    Emitted,
}

/// Rate-limited capture loop feeding a [`FrameSink`].
pub struct FrameProducer<S> {
    source: S,
    sink: FrameSink,
    controls: Arc<ProducerControls>,
    throttle: FrameThrottle,
    settings: EncodeSettings,
    degraded: bool,
}

impl<S: VideoSource> FrameProducer<S> {
    pub fn new(source: S, sink: FrameSink, controls: Arc<ProducerControls>, profile: Profile) -> Self {
        Self {
            source,
            sink,
            controls,
            throttle: FrameThrottle::new(profile.min_interval()),
            settings: profile.encode_settings(),
            degraded: false,
        }
    }

    /// Override the profile's minimum inter-frame gap.
    pub fn with_min_interval(mut self, min_interval: Duration) -> Self {
        self.throttle = FrameThrottle::new(min_interval);
        self
    }

    /// Override the profile's JPEG quality.
    pub fn with_quality(mut self, quality: u8) -> Self {
        self.settings.quality = quality;
        self
    }

    /// Run one scheduling tick at `now`.
    pub fn tick(&mut self, now: Instant) -> TickOutcome {
        if !self.controls.is_enabled() || !self.sink.is_ready() {
            return TickOutcome::Idle;
        }
        if !self.throttle.is_due(now) {
            return TickOutcome::Throttled;
        }

        let image = match self.source.grab() {
            Ok(image) => {
                if self.degraded {
                    self.degraded = false;
                    log!("frame"; "source restored: {}", self.source.describe());
                }
                image
            }
            Err(e) => {
                if !self.degraded {
                    self.degraded = true;
                    log!("frame"; "{}", e);
                }
                return match e {
                    CaptureError::SourceUnavailable(_) => TickOutcome::SourceUnavailable,
                    _ => TickOutcome::Failed,
                };
            }
        };

        self.controls
            .record_source_size((image.width(), image.height()));
        let image = match self.controls.crop() {
            Some(region) => region.extract(&image),
            None => image,
        };

        match encode_frame(&image, self.settings, now) {
            Ok(frame) => {
                self.throttle.mark(frame.captured_at());
                self.sink.push(frame);
                TickOutcome::Emitted
            }
            Err(e) => {
                debug!("frame"; "{}", e);
                TickOutcome::Failed
            }
        }
    }

    /// Tick every `tick` until the receiving side of the sink is gone.
    pub fn run(mut self, tick: Duration) {
        debug!("frame"; "capturing from {}", self.source.describe());
        while !self.sink.is_closed() {
            let pause = match self.tick(Instant::now()) {
                TickOutcome::Emitted | TickOutcome::Throttled => tick,
                TickOutcome::Idle | TickOutcome::SourceUnavailable | TickOutcome::Failed => {
                    IDLE_BACKOFF
                }
            };
            thread::sleep(pause);
        }
        debug!("frame"; "sink closed, producer stopped");
    }
}

impl<S: VideoSource + 'static> FrameProducer<S> {
    /// Run on a dedicated thread.
    pub fn spawn(self, tick: Duration) -> io::Result<JoinHandle<()>> {
        thread::Builder::new()
            .name("cardcast-producer".into())
            .spawn(move || self.run(tick))
    }
}
