// Interval rate limiter for enrichment calls.
//
// Chat-completion endpoints throttle per key. Each call waits until at least
// `1 / requests_per_second` has passed since the previous one was let
// through, across every worker sharing the limiter.

use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::time::{Duration, Instant};

use crate::error::EngineError;

#[derive(Clone)]
pub struct RateLimiter {
    inner: Arc<Mutex<RateLimiterInner>>,
}

struct RateLimiterInner {
    interval: Duration,
    /// When the next call may go out.
    next_slot: Option<Instant>,
}

/// Slowest accepted pace: one call per hour.
const MAX_INTERVAL: Duration = Duration::from_secs(60 * 60);

impl RateLimiter {
    /// Gap enforced between calls for a given rate. A non-positive rate
    /// disables limiting; a rate slower than one call per hour, or one that
    /// is not a number, is rejected.
    pub fn min_interval(requests_per_second: f64) -> Result<Duration, EngineError> {
        if requests_per_second.is_nan() {
            return Err(EngineError::InvalidParameter(
                "requests per second is not a number".to_string(),
            ));
        }
        if requests_per_second <= 0.0 {
            return Ok(Duration::ZERO);
        }
        match Duration::try_from_secs_f64(1.0 / requests_per_second) {
            Ok(interval) if interval <= MAX_INTERVAL => Ok(interval),
            _ => Err(EngineError::InvalidParameter(format!(
                "{requests_per_second} requests per second is slower than one call per hour"
            ))),
        }
    }

    /// Rates `min_interval` rejects are clamped to one call per hour.
    pub fn new(requests_per_second: f64) -> Self {
        let interval = Self::min_interval(requests_per_second).unwrap_or(MAX_INTERVAL);
        Self {
            inner: Arc::new(Mutex::new(RateLimiterInner {
                interval,
                next_slot: None,
            })),
        }
    }

    pub fn unlimited() -> Self {
        Self::new(0.0)
    }

    /// Wait for this caller's slot.
    ///
    /// The slot is reserved under the lock and the sleep happens after the
    /// lock is released, so waiting callers queue up in order without
    /// holding the mutex.
    pub async fn acquire(&self) {
        let wait = {
            let mut inner = self.inner.lock().await;
            let now = Instant::now();
            let slot = match inner.next_slot {
                Some(next) if next > now => next,
                _ => now,
            };
            inner.next_slot = Some(slot + inner.interval);
            slot.saturating_duration_since(now)
        };

        if !wait.is_zero() {
            tokio::time::sleep(wait).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_first_request_is_immediate() {
        let limiter = RateLimiter::new(1.0);
        let start = Instant::now();
        limiter.acquire().await;
        assert!(start.elapsed() < Duration::from_millis(50));
    }

    #[tokio::test]
    async fn test_second_request_waits_for_interval() {
        let limiter = RateLimiter::new(5.0); // 200ms between calls
        limiter.acquire().await;
        let start = Instant::now();
        limiter.acquire().await;
        let elapsed = start.elapsed();
        assert!(
            elapsed >= Duration::from_millis(150),
            "Expected ~200ms delay, got {:?}",
            elapsed
        );
    }

    #[tokio::test]
    async fn test_unlimited_never_waits() {
        let limiter = RateLimiter::unlimited();
        let start = Instant::now();
        for _ in 0..20 {
            limiter.acquire().await;
        }
        assert!(start.elapsed() < Duration::from_millis(50));
    }

    #[test]
    fn test_min_interval_bounds() {
        assert_eq!(RateLimiter::min_interval(4.0).unwrap(), Duration::from_millis(250));
        assert_eq!(RateLimiter::min_interval(0.0).unwrap(), Duration::ZERO);
        assert!(RateLimiter::min_interval(1e-300).is_err());
        assert!(RateLimiter::min_interval(f64::NAN).is_err());
    }

    #[tokio::test]
    async fn test_tiny_rate_does_not_panic() {
        let limiter = RateLimiter::new(1e-300);
        let start = Instant::now();
        limiter.acquire().await;
        assert!(start.elapsed() < Duration::from_millis(50));
    }
}
