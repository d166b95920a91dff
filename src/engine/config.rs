//! Broadcast engine configuration

use std::time::Duration;

/// Frames read and broadcast per pacing step
pub const DEFAULT_BATCH_FRAMES: usize = 100;

/// Restart behavior after a fatal playback error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RestartPolicy {
    /// Delay before the first restart
    pub initial_backoff: Duration,
    /// Cap for the doubling delay
    pub max_backoff: Duration,
    /// Give up after this many restarts (None = never give up)
    pub max_restarts: Option<u32>,
}

impl Default for RestartPolicy {
    fn default() -> Self {
        Self {
            initial_backoff: Duration::from_secs(1),
            max_backoff: Duration::from_secs(30),
            max_restarts: None,
        }
    }
}

/// Engine configuration options
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Frames per broadcast batch
    pub batch_frames: usize,

    /// Frames kept for late-joiner catch-up
    pub history_frames: usize,

    /// First delay when the catalog has nothing playable
    pub catalog_retry_initial: Duration,

    /// Cap for the catalog retry delay
    pub catalog_retry_max: Duration,

    /// Restart the playback loop after fatal errors (None = stop for good)
    pub restart: Option<RestartPolicy>,

    /// Capacity of the event channel
    pub event_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            batch_frames: DEFAULT_BATCH_FRAMES,
            history_frames: DEFAULT_BATCH_FRAMES * 3,
            catalog_retry_initial: Duration::from_millis(100),
            catalog_retry_max: Duration::from_secs(5),
            restart: None,
            event_capacity: 256,
        }
    }
}

impl EngineConfig {
    /// Set frames per batch (at least 1)
    pub fn batch_frames(mut self, frames: usize) -> Self {
        self.batch_frames = frames.max(1);
        self
    }

    /// Set the catch-up window in frames (at least 1)
    pub fn history_frames(mut self, frames: usize) -> Self {
        self.history_frames = frames.max(1);
        self
    }

    /// Set the catalog retry backoff
    pub fn catalog_retry(mut self, initial: Duration, max: Duration) -> Self {
        self.catalog_retry_initial = initial;
        self.catalog_retry_max = max;
        self
    }

    /// Restart the playback loop after fatal errors
    pub fn restart(mut self, policy: RestartPolicy) -> Self {
        self.restart = Some(policy);
        self
    }

    /// Set the event channel capacity (at least 1)
    pub fn event_capacity(mut self, capacity: usize) -> Self {
        self.event_capacity = capacity.max(1);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = EngineConfig::default();

        assert_eq!(config.batch_frames, 100);
        assert_eq!(config.history_frames, 300);
        assert!(config.restart.is_none());
        assert!(config.catalog_retry_initial <= config.catalog_retry_max);
    }

    #[test]
    fn test_builder_clamps_zero() {
        let config = EngineConfig::default()
            .batch_frames(0)
            .history_frames(0)
            .event_capacity(0);

        assert_eq!(config.batch_frames, 1);
        assert_eq!(config.history_frames, 1);
        assert_eq!(config.event_capacity, 1);
    }

    #[test]
    fn test_builder_chaining() {
        let config = EngineConfig::default()
            .batch_frames(10)
            .history_frames(30)
            .catalog_retry(Duration::from_millis(5), Duration::from_millis(50))
            .restart(RestartPolicy {
                max_restarts: Some(3),
                ..Default::default()
            });

        assert_eq!(config.batch_frames, 10);
        assert_eq!(config.history_frames, 30);
        assert_eq!(config.catalog_retry_max, Duration::from_millis(50));
        assert_eq!(config.restart.unwrap().max_restarts, Some(3));
    }
}
