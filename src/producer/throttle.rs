//! Minimum-interval frame limiter.

use std::time::{Duration, Instant};

/// Admits a tick only if at least `min_interval` passed since the last
/// admitted one.
///
/// This is a limiter rather than a fixed-rate timer: irregular tick spacing
/// never accumulates drift, and skipped ticks leave no backlog.
#[derive(Debug, Clone)]
pub struct FrameThrottle {
    min_interval: Duration,
    last_emitted: Option<Instant>,
}

impl FrameThrottle {
    pub const fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            last_emitted: None,
        }
    }

    pub const fn min_interval(&self) -> Duration {
        self.min_interval
    }

    /// Would a frame be admitted at `now`? Does not record anything.
    pub fn is_due(&self, now: Instant) -> bool {
        self.last_emitted
            .is_none_or(|last| now.saturating_duration_since(last) >= self.min_interval)
    }

    /// Record an emitted frame at `now`.
    pub fn mark(&mut self, now: Instant) {
        self.last_emitted = Some(now);
    }
}
