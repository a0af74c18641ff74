//! Egress proxy library.
//!
//! Outbound HTTP proxy that forwards calls to external APIs with per-mapping
//! rate limiting, a distributed circuit breaker and safe redirect following.
//! Breaker and rate-limit state lives in a shared repository (Redis in
//! production), so any number of proxy processes enforce one set of limits.

pub mod admin;
pub mod clock;
pub mod config;
pub mod error;
pub mod http;
pub mod lifecycle;
pub mod observability;
pub mod resilience;
pub mod routing;
pub mod security;
pub mod store;

pub use config::schema::ProxyConfig;
pub use error::ProxyError;
pub use http::{HttpServer, ProxyService};
pub use lifecycle::Shutdown;
