//! Per-domain outbound token-bucket rate limiting (§5).
//!
//! Grounded on the reference architecture's factored-out
//! `infrastructure/core/http_client_factory.rs` pattern of building one
//! shared client per external domain -- here each domain additionally gets
//! its own bucket so a burst against the broker can never starve market
//! data or vice versa. Built on `tokio::sync::Semaphore` rather than
//! `parking_lot` (not part of the crate's dependency stack) so permit
//! acquisition composes naturally with the rest of the async call sites.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;

pub struct RateLimiter {
    semaphore: Arc<Semaphore>,
}

impl RateLimiter {
    /// `capacity` tokens, refilled back up to `capacity` every `interval`.
    pub fn new(capacity: usize, interval: Duration, shutdown: CancellationToken) -> Self {
        let semaphore = Arc::new(Semaphore::new(capacity));
        let refill_semaphore = semaphore.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => return,
                    _ = ticker.tick() => {
                        let available = refill_semaphore.available_permits();
                        if available < capacity {
                            refill_semaphore.add_permits(capacity - available);
                        }
                    }
                }
            }
        });
        Self { semaphore }
    }

    /// Blocks until a token is available, then consumes it.
    pub async fn acquire(&self) {
        let permit = self
            .semaphore
            .acquire()
            .await
            .expect("rate limiter semaphore is never closed");
        permit.forget();
    }
}

/// The three outbound domains named in §5: broker (3 rps), market data
/// (1 rps, "Yahoo-equivalent"), and symbol lookup (25 rpm, "OpenFIGI-
/// equivalent without key").
pub struct RateLimiters {
    pub broker: RateLimiter,
    pub market_data: RateLimiter,
    pub lookup: RateLimiter,
}

impl RateLimiters {
    pub fn new(shutdown: CancellationToken) -> Self {
        Self {
            broker: RateLimiter::new(3, Duration::from_secs(1), shutdown.clone()),
            market_data: RateLimiter::new(1, Duration::from_secs(1), shutdown.clone()),
            lookup: RateLimiter::new(25, Duration::from_secs(60), shutdown),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn acquire_does_not_block_within_capacity() {
        let limiter = RateLimiter::new(3, Duration::from_secs(60), CancellationToken::new());
        for _ in 0..3 {
            limiter.acquire().await;
        }
    }

    #[tokio::test]
    async fn refill_restores_capacity_after_interval() {
        let limiter = RateLimiter::new(1, Duration::from_millis(20), CancellationToken::new());
        limiter.acquire().await;
        tokio::time::sleep(Duration::from_millis(60)).await;
        tokio::time::timeout(Duration::from_millis(50), limiter.acquire())
            .await
            .expect("token should have refilled");
    }
}
