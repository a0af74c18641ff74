//! Per-mapping fixed-window rate limiting.
//!
//! Each one-second window has its own counter in the repository. The counter
//! is incremented atomically and the request is admitted when the
//! post-increment value is within the limit. Up to twice the nominal limit
//! can pass across a window boundary.

use std::sync::Arc;
use std::time::Duration;

use crate::clock::Clock;
use crate::config::RateLimitConfig;
use crate::observability::metrics;
use crate::store::{BreakerRepository, StoreResult};

/// Distributed fixed-window rate limiter.
#[derive(Clone)]
pub struct RateLimiter {
    repo: Arc<dyn BreakerRepository>,
    clock: Arc<dyn Clock>,
    limit_per_second: u64,
    window_ttl: Duration,
}

impl RateLimiter {
    pub fn new(repo: Arc<dyn BreakerRepository>, clock: Arc<dyn Clock>, config: &RateLimitConfig) -> Self {
        Self {
            repo,
            clock,
            limit_per_second: config.requests_per_second,
            window_ttl: Duration::from_secs(config.window_ttl_secs),
        }
    }

    /// Limit applied when the caller does not pass one explicitly.
    pub fn limit_per_second(&self) -> u64 {
        self.limit_per_second
    }

    /// Admit or deny one request for `key` using the configured limit.
    pub async fn check(&self, key: &str, request_id: &str) -> StoreResult<bool> {
        self.check_with_limit(key, self.limit_per_second, request_id).await
    }

    /// Admit or deny one request for `key` against `limit_per_second`.
    pub async fn check_with_limit(
        &self,
        key: &str,
        limit_per_second: u64,
        request_id: &str,
    ) -> StoreResult<bool> {
        let window = self.clock.now_millis() / 1000;
        let count = self.repo.increment_and_get(key, window, self.window_ttl).await?;

        if count <= limit_per_second {
            tracing::trace!(request_id = %request_id, mapping = %key, window, count, "Rate limit admitted");
            Ok(true)
        } else {
            tracing::warn!(
                request_id = %request_id,
                mapping = %key,
                window,
                count,
                limit = limit_per_second,
                "Rate limit exceeded"
            );
            metrics::record_rate_limited(key);
            Ok(false)
        }
    }
}

impl std::fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimiter")
            .field("store", &self.repo.store_type())
            .field("limit_per_second", &self.limit_per_second)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::store::MemoryRepository;

    fn limiter(limit: u64) -> (RateLimiter, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(1_700_000_000_000));
        let config = RateLimitConfig {
            enabled: true,
            requests_per_second: limit,
            window_ttl_secs: 60,
        };
        let limiter = RateLimiter::new(Arc::new(MemoryRepository::new()), clock.clone(), &config);
        (limiter, clock)
    }

    #[tokio::test]
    async fn test_limit_within_window() {
        let (limiter, _) = limiter(2);

        assert!(limiter.check("/hmrc", "r1").await.unwrap());
        assert!(limiter.check("/hmrc", "r2").await.unwrap());
        assert!(!limiter.check("/hmrc", "r3").await.unwrap());
    }

    #[tokio::test]
    async fn test_next_window_admits_again() {
        let (limiter, clock) = limiter(1);

        assert!(limiter.check("/hmrc", "r1").await.unwrap());
        assert!(!limiter.check("/hmrc", "r2").await.unwrap());

        clock.advance_millis(1_000);
        assert!(limiter.check("/hmrc", "r3").await.unwrap());
    }

    #[tokio::test]
    async fn test_boundary_burst_is_permitted() {
        let (limiter, clock) = limiter(2);
        clock.set_millis(1_700_000_000_999);

        assert!(limiter.check("k", "a").await.unwrap());
        assert!(limiter.check("k", "b").await.unwrap());

        // 1ms later is a fresh window: four admissions within 2ms
        clock.advance_millis(1);
        assert!(limiter.check("k", "c").await.unwrap());
        assert!(limiter.check("k", "d").await.unwrap());
        assert!(!limiter.check("k", "e").await.unwrap());
    }

    #[tokio::test]
    async fn test_keys_are_independent() {
        let (limiter, _) = limiter(1);

        assert!(limiter.check("a", "1").await.unwrap());
        assert!(!limiter.check("a", "2").await.unwrap());
        assert!(limiter.check("b", "3").await.unwrap());
    }

    #[tokio::test]
    async fn test_explicit_limit_overrides_default() {
        let (limiter, _) = limiter(1);

        assert!(limiter.check_with_limit("k", 3, "1").await.unwrap());
        assert!(limiter.check_with_limit("k", 3, "2").await.unwrap());
        assert!(limiter.check_with_limit("k", 3, "3").await.unwrap());
        assert!(!limiter.check_with_limit("k", 3, "4").await.unwrap());
    }
}
