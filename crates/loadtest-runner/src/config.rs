//! Pool configuration.

use crate::retry::RetryPolicy;
use std::time::Duration;

/// Default number of concurrent runners.
pub const DEFAULT_WORKERS: usize = 10;
/// Default tick interval.
pub const DEFAULT_INTERVAL: Duration = Duration::from_millis(5);
/// Default run duration.
pub const DEFAULT_DURATION: Duration = Duration::from_secs(10);

/// Configuration for a [`RunnerPool`](crate::RunnerPool).
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Number of runners to start.
    pub workers: usize,
    /// Period of the create/patch loop.
    pub interval: Duration,
    /// How long to generate load before stopping.
    pub duration: Duration,
    /// Only delete what an earlier run left behind.
    pub clean_only: bool,
    /// Patch a label on every tick in addition to the re-create.
    pub update: bool,
    /// Policy for obtaining a session.
    pub connect_retry: RetryPolicy,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            workers: DEFAULT_WORKERS,
            interval: DEFAULT_INTERVAL,
            duration: DEFAULT_DURATION,
            clean_only: false,
            update: true,
            connect_retry: RetryPolicy::default(),
        }
    }
}

impl PoolConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    /// Set the tick interval. Intervals under a millisecond are raised to one.
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval.max(Duration::from_millis(1));
        self
    }

    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration = duration;
        self
    }

    pub fn with_clean_only(mut self, clean_only: bool) -> Self {
        self.clean_only = clean_only;
        self
    }

    pub fn with_update(mut self, update: bool) -> Self {
        self.update = update;
        self
    }

    pub fn with_connect_retry(mut self, policy: RetryPolicy) -> Self {
        self.connect_retry = policy;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = PoolConfig::new();
        assert_eq!(config.workers, 10);
        assert_eq!(config.interval, Duration::from_millis(5));
        assert_eq!(config.duration, Duration::from_secs(10));
        assert!(!config.clean_only);
        assert!(config.update);
        assert_eq!(config.connect_retry.max_attempts, 30);
    }

    #[test]
    fn test_zero_interval_is_clamped() {
        let config = PoolConfig::new().with_interval(Duration::ZERO);
        assert_eq!(config.interval, Duration::from_millis(1));
    }
}
