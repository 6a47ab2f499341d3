//! Request pacing shared by every probe and page fetch of a run.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{AcquireError, Semaphore};
use tokio::time::Instant;

/// Bounds in-flight upstream requests and spaces out their start times.
pub struct RateLimiter {
    semaphore: Arc<Semaphore>,
    min_delay: Duration,
    last_request: tokio::sync::Mutex<Option<Instant>>,
}

impl RateLimiter {
    /// Create a new rate limiter.
    ///
    /// - `max_concurrent`: maximum number of concurrent requests (at least 1)
    /// - `min_delay_ms`: minimum milliseconds between request starts
    pub fn new(max_concurrent: usize, min_delay_ms: u64) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(max_concurrent.max(1))),
            min_delay: Duration::from_millis(min_delay_ms),
            last_request: tokio::sync::Mutex::new(None),
        }
    }

    /// Wait for a request slot. The slot is released when the guard drops.
    pub async fn acquire(&self) -> Result<RateLimitGuard, AcquireError> {
        let permit = self.semaphore.clone().acquire_owned().await?;

        if !self.min_delay.is_zero() {
            let mut last = self.last_request.lock().await;
            if let Some(at) = *last {
                let elapsed = at.elapsed();
                if elapsed < self.min_delay {
                    tokio::time::sleep(self.min_delay - elapsed).await;
                }
            }
            *last = Some(Instant::now());
        }

        Ok(RateLimitGuard { _permit: permit })
    }

    /// Slots currently free.
    pub fn available(&self) -> usize {
        self.semaphore.available_permits()
    }
}

/// Guard that releases the rate limiter permit when dropped.
#[derive(Debug)]
pub struct RateLimitGuard {
    _permit: tokio::sync::OwnedSemaphorePermit,
}
