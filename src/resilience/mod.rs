//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Request to upstream:
//!     → circuit_breaker.rs (admit, deny, or let one probe through)
//!     → timeouts.rs (deadline over the whole redirect chain)
//!     → circuit_breaker.rs (record status + latency outcome)
//! ```
//!
//! # Design Decisions
//! - Timeouts are non-negotiable; every external call has a deadline
//! - No retries at this layer; retrying is the caller's concern
//! - Breaker state is persisted, so every worker sees the same circuit

pub mod circuit_breaker;
pub mod timeouts;

pub use circuit_breaker::{Admission, CallOutcome, CircuitBreaker, CircuitState};
