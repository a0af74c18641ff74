//! Routing subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming Request (host, path)
//!     → router.rs (mapping lookup)
//!     → matcher.rs (evaluate match conditions)
//!     → Return: matched Route (upstream base URL + mapping key) or NoMapping
//!
//! Mapping Compilation (at startup):
//!     MappingConfig[]
//!     → Compile matchers, keep declaration order
//!     → Freeze as immutable Router
//! ```
//!
//! # Design Decisions
//! - Mappings compiled at startup, immutable at runtime
//! - No regex in hot path (prefix matching only)
//! - Deterministic: same input always matches same mapping
//! - First match wins

pub mod matcher;
pub mod router;

pub use router::{Route, Router, RoutingError};
