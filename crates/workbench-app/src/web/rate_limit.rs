use std::time::Duration;
use tokio::time::Instant;

use crate::config::RateLimitConfig;

/// Fixed-window counter for one connection's input frames.
///
/// Frames past the ceiling are refused until the window rolls over; the
/// caller drops them without replying.
#[derive(Debug, Clone)]
pub struct RateLimiter {
    max_frames: u32,
    window: Duration,
    window_start: Instant,
    count: u32,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            max_frames: config.max_frames,
            window: config.window,
            window_start: Instant::now(),
            count: 0,
        }
    }

    /// Count a frame arriving now; false when it must be dropped
    pub fn check(&mut self) -> bool {
        self.check_at(Instant::now())
    }

    pub fn check_at(&mut self, now: Instant) -> bool {
        if now.saturating_duration_since(self.window_start) > self.window {
            self.window_start = now;
            self.count = 0;
        }
        self.count = self.count.saturating_add(1);
        self.count <= self.max_frames
    }
}
