//! In-memory repository.
//!
//! Uses DashMap so that every operation holds the shard lock for its key,
//! giving the same per-key atomicity the Redis scripts provide. Suitable for
//! tests and single-process development; state is lost on restart.

use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tracing::{debug, trace};

use crate::store::{breaker_key, rate_limit_key, BreakerRepository, BreakerState, StoreResult};

/// Expired counters are swept once the map grows past this many entries,
/// at most once per `SWEEP_INTERVAL`.
const SWEEP_THRESHOLD: usize = 4096;
const SWEEP_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy)]
struct Counter {
    count: u64,
    expires_at: Instant,
}

/// DashMap-backed repository.
#[derive(Debug)]
pub struct MemoryRepository {
    prefix: String,
    counters: DashMap<String, Counter>,
    breakers: DashMap<String, BreakerState>,
    last_sweep: Mutex<Option<Instant>>,
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self::with_prefix("egress")
    }

    pub fn with_prefix(prefix: impl Into<String>) -> Self {
        let prefix = prefix.into();
        debug!(prefix = %prefix, "Creating in-memory breaker repository");
        Self {
            prefix,
            counters: DashMap::new(),
            breakers: DashMap::new(),
            last_sweep: Mutex::new(None),
        }
    }

    /// Number of live rate-limit counters (for monitoring and tests).
    pub fn counter_count(&self) -> usize {
        self.counters.len()
    }

    /// Drop expired counters.
    pub fn sweep(&self) {
        let now = Instant::now();
        self.counters.retain(|_, c| c.expires_at > now);
    }

    /// Sweep when the map is over `SWEEP_THRESHOLD` and the last sweep is at
    /// least `SWEEP_INTERVAL` old. Returns whether a sweep ran.
    fn sweep_if_due(&self, now: Instant) -> bool {
        if self.counters.len() <= SWEEP_THRESHOLD {
            return false;
        }
        // Another caller holding the lock is already sweeping.
        let Ok(mut last) = self.last_sweep.try_lock() else {
            return false;
        };
        if last.is_some_and(|at| now.duration_since(at) < SWEEP_INTERVAL) {
            return false;
        }
        *last = Some(now);
        drop(last);

        self.counters.retain(|_, c| c.expires_at > now);
        trace!(remaining = self.counters.len(), "Swept expired counters");
        true
    }
}

impl Default for MemoryRepository {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BreakerRepository for MemoryRepository {
    async fn increment_and_get(&self, key: &str, window: u64, ttl: Duration) -> StoreResult<u64> {
        let now = Instant::now();
        self.sweep_if_due(now);

        let full_key = rate_limit_key(&self.prefix, key, window);
        let mut entry = self.counters.entry(full_key).or_insert(Counter {
            count: 0,
            expires_at: now + ttl,
        });

        // An expired counter that has not been swept yet starts over.
        if entry.expires_at <= now {
            entry.count = 0;
            entry.expires_at = now + ttl;
        }

        entry.count += 1;
        trace!(key = %key, window = window, count = entry.count, "Counter incremented");
        Ok(entry.count)
    }

    async fn load_breaker_state(&self, key: &str) -> StoreResult<BreakerState> {
        let full_key = breaker_key(&self.prefix, key);
        Ok(self
            .breakers
            .get(&full_key)
            .map(|r| *r.value())
            .unwrap_or_default())
    }

    async fn save_breaker_state(&self, key: &str, state: &BreakerState) -> StoreResult<bool> {
        let full_key = breaker_key(&self.prefix, key);
        let mut entry = self.breakers.entry(full_key).or_default();

        if entry.version != state.version {
            trace!(
                key = %key,
                expected = state.version,
                actual = entry.version,
                "Breaker write lost version race"
            );
            return Ok(false);
        }

        *entry = BreakerState {
            error_count: state.error_count,
            open_since_epoch_ms: state.open_since_epoch_ms,
            version: state.version + 1,
        };
        Ok(true)
    }

    fn store_type(&self) -> &'static str {
        "memory"
    }
}
