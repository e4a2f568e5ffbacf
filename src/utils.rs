use std::time::{Duration, Instant};
use tracing::info;

/// Wall-clock timer that reports split and total times for named events.
pub struct PerfTimer {
    start: Instant,
    last_split: Instant,
}

impl PerfTimer {
    pub fn new() -> Self {
        let now = Instant::now();
        Self {
            start: now,
            last_split: now,
        }
    }

    /// Returns (total, split) and starts a new split.
    pub fn split(&mut self) -> (Duration, Duration) {
        let now = Instant::now();
        let total = now - self.start;
        let split = now - self.last_split;
        self.last_split = now;
        (total, split)
    }

    pub fn log_split(&mut self, event: &str) {
        let (total, split) = self.split();
        info!(
            "{}: {:.6}s split, {:.6}s since start",
            event,
            split.as_secs_f64(),
            total.as_secs_f64()
        );
    }
}

impl Default for PerfTimer {
    fn default() -> Self {
        Self::new()
    }
}
