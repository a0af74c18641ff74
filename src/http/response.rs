//! Response type and conversion to the serving platform.
//!
//! # Responsibilities
//! - Hold an upstream (or synthetic) response
//! - Build JSON error bodies for locally generated responses
//! - Convert into an axum response
//!
//! # Design Decisions
//! - Bodies are buffered; upstream API payloads are small JSON documents
//! - Hop-by-hop headers are stripped before conversion (see `security::headers`)

use axum::body::Body;
use axum::http::{header, HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use bytes::Bytes;

/// A response from the upstream, or one produced by the proxy itself.
#[derive(Debug, Clone)]
pub struct ProxyResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl ProxyResponse {
    pub fn new(status: StatusCode, headers: HeaderMap, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            headers,
            body: body.into(),
        }
    }

    /// A locally generated JSON error response.
    pub fn error(status: StatusCode, code: &str, message: &str) -> Self {
        let body = serde_json::json!({ "error": code, "message": message }).to_string();
        let mut headers = HeaderMap::new();
        headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("application/json"));
        Self::new(status, headers, body)
    }

    /// Returned when a redirect chain exceeds the hop limit.
    pub fn loop_detected(max_hops: u32) -> Self {
        Self::error(
            StatusCode::LOOP_DETECTED,
            "loop_detected",
            &format!("redirect chain exceeded {} hops", max_hops),
        )
    }
}

impl IntoResponse for ProxyResponse {
    fn into_response(self) -> Response {
        let mut response = Response::new(Body::from(self.body));
        *response.status_mut() = self.status;
        *response.headers_mut() = self.headers;
        response
    }
}
