//! Request types on both sides of the proxy.
//!
//! # Responsibilities
//! - Platform-neutral inbound request (method, path, host, headers, query, body)
//! - Per-hop upstream request
//! - Resolve a request ID for log correlation
//!
//! # Design Decisions
//! - Headers live in `HeaderMap`, so every lookup is case-insensitive
//! - The request ID is taken from the inbound correlation headers; a local
//!   UUID is used in logs only and never forwarded

use axum::http::{header, HeaderMap, HeaderName, Method};
use bytes::Bytes;
use url::Url;

/// Header carrying the request ID.
pub const X_REQUEST_ID: &str = "x-request-id";

/// An inbound call, independent of the serving platform.
#[derive(Debug, Clone)]
pub struct InboundRequest {
    pub method: Method,
    pub path: String,
    pub headers: HeaderMap,
    pub raw_query: Option<String>,
    pub body: Bytes,
}

impl InboundRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            headers: HeaderMap::new(),
            raw_query: None,
            body: Bytes::new(),
        }
    }

    /// The Host header, if present and valid UTF-8.
    pub fn host(&self) -> Option<&str> {
        self.headers.get(header::HOST).and_then(|h| h.to_str().ok())
    }

    /// First correlation header present on the request, else a fresh UUID.
    pub fn request_id(&self, correlation_headers: &[HeaderName]) -> String {
        correlation_headers
            .iter()
            .find_map(|name| self.headers.get(name))
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string())
    }
}

/// One hop's worth of upstream request.
#[derive(Debug, Clone)]
pub struct ProxyRequest {
    pub method: Method,
    pub url: Url,
    pub headers: HeaderMap,
    pub body: Option<Bytes>,
}

impl ProxyRequest {
    pub fn new(method: Method, url: Url) -> Self {
        Self {
            method,
            url,
            headers: HeaderMap::new(),
            body: None,
        }
    }
}
