//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, body buffering)
//!     → request.rs (platform-neutral InboundRequest)
//!     → proxy.rs (route, rate limit, breaker)
//!     → redirect.rs (hop loop) → transport.rs (one round trip per hop)
//!     → response.rs (sanitized headers, JSON errors)
//!     → Send to client
//! ```

pub mod proxy;
pub mod redirect;
pub mod request;
pub mod response;
pub mod server;
pub mod transport;

pub use proxy::ProxyService;
pub use request::{InboundRequest, ProxyRequest, X_REQUEST_ID};
pub use response::ProxyResponse;
pub use server::HttpServer;
pub use transport::{ReqwestTransport, Transport, TransportError};
