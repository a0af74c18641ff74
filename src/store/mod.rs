//! Breaker and rate-limit state repository.
//!
//! # Data Flow
//! ```text
//! RateLimiter  ──increment_and_get(key, window)──▶ ┐
//!                                                   ├─▶ BreakerRepository ─▶ Redis / memory
//! CircuitBreaker ──load / save (CAS on version)──▶ ┘
//! ```
//!
//! # Design Decisions
//! - The repository is the only owner of durable state; callers never cache it
//! - Counter increments are a single atomic store operation
//! - Breaker writes are compare-and-set on a version token; a lost race
//!   returns `false` and the caller reloads
//! - Keys are namespaced by component: `rl:{key}:{window}`, `cb:{key}`

pub mod memory;
pub mod redis;

pub use self::memory::MemoryRepository;
pub use self::redis::RedisRepository;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Errors surfaced by a repository backend.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The backend could not be reached or rejected the command.
    #[error("store backend error: {0}")]
    Backend(String),

    /// A stored record could not be decoded.
    #[error("corrupt record for key '{key}': {reason}")]
    Corrupt { key: String, reason: String },
}

impl From<::redis::RedisError> for StoreError {
    fn from(e: ::redis::RedisError) -> Self {
        StoreError::Backend(e.to_string())
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Persisted circuit breaker record for one mapping key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct BreakerState {
    /// Consecutive failures observed since the last success.
    pub error_count: u32,
    /// `0` when closed, otherwise the epoch millis the circuit opened at.
    pub open_since_epoch_ms: u64,
    /// Optimistic concurrency token. An absent record has version `0`.
    pub version: u64,
}

impl BreakerState {
    pub fn is_open(&self) -> bool {
        self.open_since_epoch_ms != 0
    }

    pub fn is_pristine(&self) -> bool {
        self.error_count == 0 && self.open_since_epoch_ms == 0
    }
}

/// Persistence for rate-limit counters and breaker records.
#[async_trait]
pub trait BreakerRepository: Send + Sync {
    /// Atomically increment the counter for `(key, window)` and return the new
    /// value. The counter expires `ttl` after its creation.
    async fn increment_and_get(&self, key: &str, window: u64, ttl: Duration) -> StoreResult<u64>;

    /// Load the breaker record, or the zero record when absent.
    async fn load_breaker_state(&self, key: &str) -> StoreResult<BreakerState>;

    /// Write `state` if the stored version still equals `state.version`.
    ///
    /// On success the stored version becomes `state.version + 1`.
    /// Returns `false` when another writer got there first.
    async fn save_breaker_state(&self, key: &str, state: &BreakerState) -> StoreResult<bool>;

    /// Short backend name for logs and the admin API.
    fn store_type(&self) -> &'static str;
}

pub(crate) fn rate_limit_key(prefix: &str, key: &str, window: u64) -> String {
    format!("{}:rl:{}:{}", prefix, key, window)
}

pub(crate) fn breaker_key(prefix: &str, key: &str) -> String {
    format!("{}:cb:{}", prefix, key)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_namespacing() {
        assert_eq!(rate_limit_key("egress", "/hmrc", 42), "egress:rl:/hmrc:42");
        assert_eq!(breaker_key("egress", "/hmrc"), "egress:cb:/hmrc");
    }

    #[test]
    fn test_default_state_is_closed() {
        let state = BreakerState::default();
        assert!(!state.is_open());
        assert!(state.is_pristine());
        assert_eq!(state.version, 0);
    }
}
