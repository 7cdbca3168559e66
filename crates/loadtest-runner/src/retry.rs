//! Bounded retry with a fixed delay.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

/// Default number of attempts when obtaining a session.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 30;
/// Default pause between attempts.
pub const DEFAULT_DELAY: Duration = Duration::from_millis(10);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            delay: DEFAULT_DELAY,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            delay,
        }
    }

    /// Run `op` until it succeeds or `max_attempts` calls have failed.
    ///
    /// Sleeps `delay` between attempts but not after the last one. Returns the
    /// last error on exhaustion.
    pub async fn retry<T, E, F, Fut>(&self, what: &str, mut op: F) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Display,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            match op().await {
                Ok(value) => {
                    if attempt > 1 {
                        tracing::info!("{} succeeded after {} attempts", what, attempt);
                    }
                    return Ok(value);
                }
                Err(e) if attempt < max_attempts => {
                    tracing::warn!(
                        "{} failed (attempt {}/{}): {}. Retrying in {:?}...",
                        what,
                        attempt,
                        max_attempts,
                        e,
                        self.delay
                    );
                    tokio::time::sleep(self.delay).await;
                    attempt += 1;
                }
                Err(e) => {
                    tracing::error!("{} failed after {} attempts: {}", what, max_attempts, e);
                    return Err(e);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use tokio::time::Instant;

    #[tokio::test(start_paused = true)]
    async fn test_gives_up_after_max_attempts() {
        let calls = &AtomicU32::new(0);
        let start = Instant::now();

        let result: Result<(), String> = RetryPolicy::default()
            .retry("connect", move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err("refused".to_string())
            })
            .await;

        assert_eq!(result.unwrap_err(), "refused");
        assert_eq!(calls.load(Ordering::SeqCst), 30);
        // 29 pauses between 30 attempts, none after the last.
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_millis(290), "elapsed {elapsed:?}");
        assert!(elapsed < Duration::from_millis(300), "elapsed {elapsed:?}");
    }

    #[tokio::test(start_paused = true)]
    async fn test_stops_on_first_success() {
        let calls = &AtomicU32::new(0);
        let start = Instant::now();

        let result: Result<u32, String> = RetryPolicy::new(5, Duration::from_millis(100))
            .retry("connect", move || async move {
                let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
                if n < 3 {
                    Err(format!("attempt {n}"))
                } else {
                    Ok(n)
                }
            })
            .await;

        assert_eq!(result.unwrap(), 3);
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_millis(200), "elapsed {elapsed:?}");
        assert!(elapsed < Duration::from_millis(300), "elapsed {elapsed:?}");
    }

    #[tokio::test]
    async fn test_zero_attempts_still_tries_once() {
        let calls = &AtomicU32::new(0);
        let policy = RetryPolicy {
            max_attempts: 0,
            delay: Duration::ZERO,
        };
        let _: Result<(), &str> = policy
            .retry("op", move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err("no")
            })
            .await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
