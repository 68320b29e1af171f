use std::time::Duration;

use tokio::time::Instant;

/// Per-session token bucket over inbound lines.
///
/// The control loop consults it for every line; when the bucket is empty it
/// answers with the penalty to put on the session's delay gate.
#[derive(Debug, Clone)]
pub struct InputThrottle {
    lines_per_second: u32,
    penalty: Duration,
    tokens: f64,
    last_refill: Instant,
}

impl InputThrottle {
    /// `lines_per_second == 0` disables throttling.
    pub fn new(lines_per_second: u32, penalty: Duration) -> Self {
        Self {
            lines_per_second,
            penalty,
            tokens: lines_per_second as f64,
            last_refill: Instant::now(),
        }
    }

    pub fn unlimited() -> Self {
        Self::new(0, Duration::ZERO)
    }

    /// Account for one line. Returns the delay to impose, if any.
    pub fn record_line(&mut self) -> Option<Duration> {
        self.record_line_at(Instant::now())
    }

    fn record_line_at(&mut self, now: Instant) -> Option<Duration> {
        if self.lines_per_second == 0 {
            return None;
        }
        let elapsed = now.saturating_duration_since(self.last_refill);
        let capacity = self.lines_per_second as f64;
        self.tokens = (self.tokens + elapsed.as_secs_f64() * capacity).min(capacity);
        self.last_refill = now;

        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            None
        } else {
            Some(self.penalty)
        }
    }
}
