//! Security subsystem.
//!
//! # Data Flow
//! ```text
//! Inbound request:
//!     → rate_limit.rs (per-mapping admission, shared counter in the store)
//!     → headers.rs (strip hop-by-hop, rewrite Host, keep correlation IDs)
//!     → Pass to the redirect-following client
//! ```
//!
//! # Design Decisions
//! - Rate limiting happens before the breaker check and is never a breaker failure
//! - Credentials are stripped on cross-origin redirects (see `http::redirect`)

pub mod headers;
pub mod rate_limit;

pub use rate_limit::RateLimiter;
