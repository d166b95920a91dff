//! Real-time pacing
//!
//! Keeps broadcast batches in step with wall-clock time. After each batch
//! the pacer adds the batch's playback time to what it owes and subtracts
//! the wall-clock time that actually passed; a positive balance is slept
//! off. Time spent in the sleep itself is subtracted again, so imprecise
//! sleeps self-correct on the next batch.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

/// Longest single sleep before re-checking the stop flag
const STOP_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Per-track pacing stopwatch
#[derive(Debug)]
pub(crate) struct Pacer {
    clock: Instant,
    last_lap: Duration,
    /// Audio time broadcast minus wall time elapsed, in nanoseconds
    owed: i128,
}

impl Pacer {
    /// Start the stopwatch at track begin
    pub fn start() -> Self {
        Self {
            clock: Instant::now(),
            last_lap: Duration::ZERO,
            owed: 0,
        }
    }

    /// Wall time since the previous lap
    fn lap(&mut self) -> i128 {
        let now = self.clock.elapsed();
        let delta = now.saturating_sub(self.last_lap);
        self.last_lap = now;
        delta.as_nanos() as i128
    }

    /// Record `audio` of freshly broadcast playback time; returns the wait owed
    pub fn account(&mut self, audio: Duration) -> Option<Duration> {
        self.owed += audio.as_nanos() as i128;
        self.owed -= self.lap();

        (self.owed > 0).then(|| Duration::from_nanos(self.owed as u64))
    }

    /// Subtract the wall time consumed by a sleep
    pub fn settle(&mut self) {
        self.owed -= self.lap();
    }

    /// Account `audio` and sleep off any lead, waking early on `stop`
    pub fn pace(&mut self, audio: Duration, stop: &AtomicBool) {
        if let Some(wait) = self.account(audio) {
            let deadline = Instant::now() + wait;
            loop {
                if stop.load(Ordering::Relaxed) {
                    break;
                }
                let remaining = deadline.saturating_duration_since(Instant::now());
                if remaining.is_zero() {
                    break;
                }
                std::thread::sleep(remaining.min(STOP_POLL_INTERVAL));
            }
            self.settle();
        }
    }

    /// Current balance; positive means ahead of real time
    #[cfg(test)]
    pub fn owed(&self) -> i128 {
        self.owed
    }
}
