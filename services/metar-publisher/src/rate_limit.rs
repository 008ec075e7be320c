//! Minimum-spacing rate limiter for outbound weather requests.
//!
//! Shared by every concurrent fetch so the upstream sees at most one
//! request per `min_interval`, regardless of how many batches are in flight.

use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::{sleep_until, Instant};

#[derive(Debug)]
pub struct RateLimiter {
    min_interval: Duration,
    last_request: Mutex<Option<Instant>>,
}

impl RateLimiter {
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            last_request: Mutex::new(None),
        }
    }

    pub fn min_interval(&self) -> Duration {
        self.min_interval
    }

    /// Wait until a request may be issued, then claim the slot.
    ///
    /// The lock is held across the wait so callers are released one at a
    /// time in arrival order.
    pub async fn acquire(&self) {
        let mut last = self.last_request.lock().await;
        if let Some(previous) = *last {
            let next = previous + self.min_interval;
            if next > Instant::now() {
                sleep_until(next).await;
            }
        }
        *last = Some(Instant::now());
    }
}
