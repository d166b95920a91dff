//! Exponential backoff for retry loops on blocking threads

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

/// Longest single sleep before re-checking the stop flag
const STOP_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Delay doubling from `initial` up to `max`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backoff {
    pub initial: Duration,
    pub max: Duration,
}

impl Backoff {
    pub fn new(initial: Duration, max: Duration) -> Self {
        Self {
            initial,
            max: max.max(initial),
        }
    }

    /// Delay after `failures` consecutive failures: `min(2^(n-1) * initial, max)`
    pub fn delay(&self, failures: u32) -> Duration {
        let exp = failures.saturating_sub(1).min(16);
        self.initial.saturating_mul(1 << exp).min(self.max)
    }

    /// Sleep for `delay(failures)`, waking early if `stop` is raised
    ///
    /// Returns false if stopped before the full delay elapsed.
    pub fn sleep(&self, failures: u32, stop: &AtomicBool) -> bool {
        let total = self.delay(failures);
        let start = Instant::now();
        while start.elapsed() < total {
            if stop.load(Ordering::Relaxed) {
                return false;
            }
            let remaining = total.saturating_sub(start.elapsed());
            std::thread::sleep(remaining.min(STOP_POLL_INTERVAL));
        }
        !stop.load(Ordering::Relaxed)
    }
}
