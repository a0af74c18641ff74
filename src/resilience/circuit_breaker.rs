//! Circuit breaker for upstream protection.
//!
//! # States
//! - Closed: normal operation, requests pass through
//! - Open: upstream assumed down, requests fail fast with 503
//! - Probing: cooldown elapsed, a single trial request is let through
//!
//! # State Transitions
//! ```text
//! Closed  → Open:    error_count >= error_threshold
//! Open    → Probing: after cooldown
//! Probing → Closed:  probe succeeds
//! Probing → Open:    probe fails (open_since re-armed)
//! ```
//!
//! # Design Decisions
//! - Per-mapping breaker, state lives in the repository, never in memory
//! - Every write is a compare-and-set; lost races reload and recompute
//! - The probe is claimed by re-arming `open_since`, so concurrent workers
//!   past the cooldown see an open circuit again and only one gets through
//! - 4xx responses are a client problem and never count as failures

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;

use crate::clock::Clock;
use crate::config::BreakerConfig;
use crate::observability::metrics;
use crate::store::{BreakerRepository, BreakerState, StoreResult};

/// Attempts at a compare-and-set before giving up on a write.
const MAX_CAS_ATTEMPTS: usize = 5;

/// Externally visible breaker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    Closed,
    Open,
    Probing,
}

/// Result of the pre-call admission check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Admission {
    pub allow: bool,
    pub state: CircuitState,
}

/// What happened on the upstream call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallOutcome {
    /// Final status, or `None` when the transport failed.
    pub status: Option<u16>,
    /// Wall time of the whole call, redirects included.
    pub latency: Duration,
}

impl CallOutcome {
    pub fn response(status: u16, latency: Duration) -> Self {
        Self { status: Some(status), latency }
    }

    pub fn transport_error(latency: Duration) -> Self {
        Self { status: None, latency }
    }
}

/// Snapshot of one breaker record for the admin API.
#[derive(Debug, Clone, Serialize)]
pub struct BreakerSnapshot {
    pub key: String,
    pub state: CircuitState,
    pub error_count: u32,
    pub open_since_epoch_ms: u64,
}

/// Repository-backed circuit breaker.
#[derive(Clone)]
pub struct CircuitBreaker {
    repo: Arc<dyn BreakerRepository>,
    clock: Arc<dyn Clock>,
    error_threshold: u32,
    latency_threshold: Duration,
    cooldown: Duration,
}

impl CircuitBreaker {
    pub fn new(repo: Arc<dyn BreakerRepository>, clock: Arc<dyn Clock>, config: &BreakerConfig) -> Self {
        Self {
            repo,
            clock,
            error_threshold: config.error_threshold,
            latency_threshold: Duration::from_millis(config.latency_threshold_ms),
            cooldown: Duration::from_secs(config.cooldown_secs),
        }
    }

    fn classify(&self, state: &BreakerState, now_ms: u64) -> CircuitState {
        if !state.is_open() {
            CircuitState::Closed
        } else if now_ms.saturating_sub(state.open_since_epoch_ms) < self.cooldown.as_millis() as u64 {
            CircuitState::Open
        } else {
            CircuitState::Probing
        }
    }

    /// Whether `outcome` counts against the upstream.
    pub fn is_failure(&self, outcome: &CallOutcome) -> bool {
        match outcome.status {
            None => true,
            Some(status) => status >= 500 || outcome.latency >= self.latency_threshold,
        }
    }

    /// Decide whether a call for `key` may proceed.
    pub async fn should_allow(&self, key: &str) -> StoreResult<Admission> {
        for _ in 0..MAX_CAS_ATTEMPTS {
            let state = self.repo.load_breaker_state(key).await?;
            let now = self.clock.now_millis();

            match self.classify(&state, now) {
                CircuitState::Closed => {
                    return Ok(Admission { allow: true, state: CircuitState::Closed });
                }
                CircuitState::Open => {
                    tracing::debug!(mapping = %key, open_since = state.open_since_epoch_ms, "Circuit open");
                    return Ok(Admission { allow: false, state: CircuitState::Open });
                }
                CircuitState::Probing => {
                    // Claim the probe by re-arming the cooldown.
                    let claim = BreakerState { open_since_epoch_ms: now, ..state };
                    if self.repo.save_breaker_state(key, &claim).await? {
                        tracing::info!(mapping = %key, error_count = state.error_count, "Circuit probing");
                        return Ok(Admission { allow: true, state: CircuitState::Probing });
                    }
                    // Lost the race: reload, another worker probably holds the probe.
                }
            }
        }

        tracing::warn!(mapping = %key, "Breaker contention, denying call");
        Ok(Admission { allow: false, state: CircuitState::Open })
    }

    /// Feed the result of an upstream call back into the breaker.
    pub async fn record_outcome(&self, key: &str, outcome: CallOutcome) -> StoreResult<()> {
        let failure = self.is_failure(&outcome);

        for _ in 0..MAX_CAS_ATTEMPTS {
            let state = self.repo.load_breaker_state(key).await?;
            let now = self.clock.now_millis();

            let next = if failure {
                let error_count = state.error_count.saturating_add(1);
                let open_since_epoch_ms = if error_count >= self.error_threshold {
                    now
                } else {
                    state.open_since_epoch_ms
                };
                BreakerState { error_count, open_since_epoch_ms, version: state.version }
            } else {
                if state.is_pristine() {
                    return Ok(());
                }
                BreakerState { error_count: 0, open_since_epoch_ms: 0, version: state.version }
            };

            if self.repo.save_breaker_state(key, &next).await? {
                if failure && next.is_open() && !state.is_open() {
                    tracing::warn!(
                        mapping = %key,
                        error_count = next.error_count,
                        cooldown_secs = self.cooldown.as_secs(),
                        "Circuit opened"
                    );
                    metrics::record_breaker_trip(key);
                } else if !failure && state.is_open() {
                    tracing::info!(mapping = %key, "Circuit closed");
                }
                return Ok(());
            }
        }

        tracing::warn!(mapping = %key, failure, "Breaker outcome dropped after repeated write conflicts");
        Ok(())
    }

    /// Force the breaker for `key` back to closed.
    pub async fn reset(&self, key: &str) -> StoreResult<bool> {
        for _ in 0..MAX_CAS_ATTEMPTS {
            let state = self.repo.load_breaker_state(key).await?;
            if state.is_pristine() {
                return Ok(true);
            }
            let next = BreakerState { error_count: 0, open_since_epoch_ms: 0, version: state.version };
            if self.repo.save_breaker_state(key, &next).await? {
                tracing::info!(mapping = %key, "Circuit reset");
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Read-only view of the breaker for `key`.
    pub async fn snapshot(&self, key: &str) -> StoreResult<BreakerSnapshot> {
        let state = self.repo.load_breaker_state(key).await?;
        Ok(BreakerSnapshot {
            key: key.to_string(),
            state: self.classify(&state, self.clock.now_millis()),
            error_count: state.error_count,
            open_since_epoch_ms: state.open_since_epoch_ms,
        })
    }
}

impl std::fmt::Debug for CircuitBreaker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CircuitBreaker")
            .field("store", &self.repo.store_type())
            .field("error_threshold", &self.error_threshold)
            .field("latency_threshold", &self.latency_threshold)
            .field("cooldown", &self.cooldown)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::store::MemoryRepository;

    const FAST: Duration = Duration::from_millis(20);

    fn breaker(threshold: u32) -> (CircuitBreaker, Arc<MemoryRepository>, Arc<ManualClock>) {
        let repo = Arc::new(MemoryRepository::new());
        let clock = Arc::new(ManualClock::new(1_700_000_000_000));
        let config = BreakerConfig {
            enabled: true,
            error_threshold: threshold,
            latency_threshold_ms: 1_000,
            cooldown_secs: 30,
        };
        (CircuitBreaker::new(repo.clone(), clock.clone(), &config), repo, clock)
    }

    #[tokio::test]
    async fn test_starts_closed() {
        let (cb, _, _) = breaker(3);
        let admission = cb.should_allow("k").await.unwrap();
        assert!(admission.allow);
        assert_eq!(admission.state, CircuitState::Closed);
    }

    #[tokio::test]
    async fn test_trips_after_threshold_failures() {
        let (cb, repo, _) = breaker(3);

        cb.record_outcome("k", CallOutcome::response(500, FAST)).await.unwrap();
        cb.record_outcome("k", CallOutcome::response(502, FAST)).await.unwrap();
        assert!(cb.should_allow("k").await.unwrap().allow);

        cb.record_outcome("k", CallOutcome::transport_error(FAST)).await.unwrap();
        let admission = cb.should_allow("k").await.unwrap();
        assert!(!admission.allow);
        assert_eq!(admission.state, CircuitState::Open);

        let stored = repo.load_breaker_state("k").await.unwrap();
        assert_eq!(stored.error_count, 3);
        assert_ne!(stored.open_since_epoch_ms, 0);
    }

    #[tokio::test]
    async fn test_client_errors_are_not_failures() {
        let (cb, repo, _) = breaker(2);

        for _ in 0..10 {
            cb.record_outcome("k", CallOutcome::response(404, FAST)).await.unwrap();
        }

        assert_eq!(repo.load_breaker_state("k").await.unwrap(), BreakerState::default());
        assert!(cb.should_allow("k").await.unwrap().allow);
    }

    #[tokio::test]
    async fn test_slow_success_is_failure() {
        let (cb, repo, _) = breaker(5);
        cb.record_outcome("k", CallOutcome::response(200, Duration::from_millis(1_000))).await.unwrap();
        assert_eq!(repo.load_breaker_state("k").await.unwrap().error_count, 1);
    }

    #[tokio::test]
    async fn test_success_resets() {
        let (cb, repo, _) = breaker(5);

        cb.record_outcome("k", CallOutcome::response(503, FAST)).await.unwrap();
        cb.record_outcome("k", CallOutcome::response(503, FAST)).await.unwrap();
        cb.record_outcome("k", CallOutcome::response(201, FAST)).await.unwrap();

        let stored = repo.load_breaker_state("k").await.unwrap();
        assert_eq!(stored.error_count, 0);
        assert_eq!(stored.open_since_epoch_ms, 0);
    }

    #[tokio::test]
    async fn test_single_probe_after_cooldown() {
        let (cb, _, clock) = breaker(1);

        cb.record_outcome("k", CallOutcome::response(500, FAST)).await.unwrap();
        assert!(!cb.should_allow("k").await.unwrap().allow);

        clock.advance_millis(30_000);
        let probe = cb.should_allow("k").await.unwrap();
        assert!(probe.allow);
        assert_eq!(probe.state, CircuitState::Probing);

        // A second caller during the probe is refused
        let second = cb.should_allow("k").await.unwrap();
        assert!(!second.allow);
        assert_eq!(second.state, CircuitState::Open);
    }

    #[tokio::test]
    async fn test_probe_success_closes() {
        let (cb, _, clock) = breaker(1);

        cb.record_outcome("k", CallOutcome::response(500, FAST)).await.unwrap();
        clock.advance_millis(30_000);
        assert!(cb.should_allow("k").await.unwrap().allow);

        cb.record_outcome("k", CallOutcome::response(200, FAST)).await.unwrap();
        let admission = cb.should_allow("k").await.unwrap();
        assert!(admission.allow);
        assert_eq!(admission.state, CircuitState::Closed);
    }

    #[tokio::test]
    async fn test_probe_failure_reopens() {
        let (cb, _, clock) = breaker(1);

        cb.record_outcome("k", CallOutcome::response(500, FAST)).await.unwrap();
        clock.advance_millis(30_000);
        assert!(cb.should_allow("k").await.unwrap().allow);

        cb.record_outcome("k", CallOutcome::response(500, FAST)).await.unwrap();
        clock.advance_millis(29_999);
        assert!(!cb.should_allow("k").await.unwrap().allow);
        clock.advance_millis(1);
        assert!(cb.should_allow("k").await.unwrap().allow);
    }

    #[tokio::test]
    async fn test_stale_write_is_recomputed() {
        let (cb, repo, _) = breaker(10);

        cb.record_outcome("k", CallOutcome::response(500, FAST)).await.unwrap();
        // Another worker bumps the record behind our back
        let current = repo.load_breaker_state("k").await.unwrap();
        let bumped = BreakerState { error_count: current.error_count + 1, ..current };
        assert!(repo.save_breaker_state("k", &bumped).await.unwrap());

        cb.record_outcome("k", CallOutcome::response(500, FAST)).await.unwrap();
        assert_eq!(repo.load_breaker_state("k").await.unwrap().error_count, 3);
    }

    #[tokio::test]
    async fn test_reset_and_snapshot() {
        let (cb, _, _) = breaker(1);

        cb.record_outcome("k", CallOutcome::response(500, FAST)).await.unwrap();
        let snap = cb.snapshot("k").await.unwrap();
        assert_eq!(snap.state, CircuitState::Open);
        assert_eq!(snap.error_count, 1);

        assert!(cb.reset("k").await.unwrap());
        let snap = cb.snapshot("k").await.unwrap();
        assert_eq!(snap.state, CircuitState::Closed);
        assert_eq!(snap.error_count, 0);
    }
}
