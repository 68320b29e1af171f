use std::time::Duration;

use tracing_subscriber::{fmt, EnvFilter};

pub fn init_logging() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info"));
    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .init();
}

/// Time the control loop spent processing a single event.
#[derive(Debug, Clone)]
pub struct EventMetrics {
    /// Short label of the event ("line", "timer:world_tick", ...).
    pub kind: &'static str,
    pub sequence: u64,
    pub duration_us: u128,
    pub sessions: usize,
}

impl EventMetrics {
    pub const BUDGET: Duration = Duration::from_millis(50);

    pub fn new(kind: &'static str, sequence: u64, elapsed: Duration, sessions: usize) -> Self {
        Self {
            kind,
            sequence,
            duration_us: elapsed.as_micros(),
            sessions,
        }
    }

    pub fn over_budget(&self) -> bool {
        self.duration_us > Self::BUDGET.as_micros()
    }

    pub fn log(&self) {
        if self.over_budget() {
            tracing::warn!(
                event = self.kind,
                seq = self.sequence,
                duration_us = self.duration_us,
                sessions = self.sessions,
                "event exceeded budget ({}us > {}us)",
                self.duration_us,
                Self::BUDGET.as_micros()
            );
        } else {
            tracing::trace!(
                event = self.kind,
                seq = self.sequence,
                duration_us = self.duration_us,
                sessions = self.sessions,
                "event processed"
            );
        }
    }
}
