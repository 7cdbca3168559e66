//! Client-side token bucket.
//!
//! Each session throttles its own requests the way `client-go` does with its
//! QPS/burst settings, so a single runner cannot monopolise the API server.

use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

#[derive(Debug)]
pub struct RateLimiter {
    qps: f64,
    burst: f64,
    bucket: Mutex<Bucket>,
}

#[derive(Debug)]
struct Bucket {
    tokens: f64,
    last_refill: Instant,
}

impl RateLimiter {
    /// A bucket refilled at `qps` tokens per second, holding at most `burst`
    /// tokens. It starts full. A non-positive or non-finite `qps` disables
    /// limiting.
    pub fn new(qps: f64, burst: u32) -> Self {
        let burst = f64::from(burst.max(1));
        Self {
            qps: if qps.is_finite() { qps } else { 0.0 },
            burst,
            bucket: Mutex::new(Bucket {
                tokens: burst,
                last_refill: Instant::now(),
            }),
        }
    }

    pub fn unlimited() -> Self {
        Self::new(0.0, 1)
    }

    /// Wait until a token is available and take it.
    pub async fn acquire(&self) {
        if self.qps <= 0.0 {
            return;
        }
        loop {
            let wait = {
                let mut bucket = self.bucket.lock().await;
                let now = Instant::now();
                let refill = now.duration_since(bucket.last_refill).as_secs_f64() * self.qps;
                bucket.tokens = (bucket.tokens + refill).min(self.burst);
                bucket.last_refill = now;

                if bucket.tokens >= 1.0 {
                    bucket.tokens -= 1.0;
                    return;
                }
                // Rates near zero overflow Duration: wait indefinitely.
                Duration::try_from_secs_f64((1.0 - bucket.tokens) / self.qps)
                    .unwrap_or(Duration::MAX)
            };
            tokio::time::sleep(wait).await;
        }
    }
}
