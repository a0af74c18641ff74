//! Proxy-level errors and their HTTP mapping.
//!
//! | Error            | Status |
//! |------------------|--------|
//! | Routing          | 400    |
//! | PayloadTooLarge  | 413    |
//! | RateLimited      | 429    |
//! | Internal, Store  | 500    |
//! | Upstream         | 502    |
//! | CircuitOpen      | 503    |
//! | Upstream timeout | 504    |

use axum::http::StatusCode;
use thiserror::Error;

use crate::http::response::ProxyResponse;
use crate::http::transport::TransportError;
use crate::routing::RoutingError;
use crate::store::StoreError;

#[derive(Debug, Error)]
pub enum ProxyError {
    #[error(transparent)]
    Routing(#[from] RoutingError),

    #[error("rate limit exceeded for {mapping}")]
    RateLimited { mapping: String },

    #[error("circuit open for {mapping}")]
    CircuitOpen { mapping: String },

    #[error("upstream call for {mapping} failed: {source}")]
    Upstream {
        mapping: String,
        #[source]
        source: TransportError,
    },

    #[error("state store error: {0}")]
    Store(#[from] StoreError),

    #[error("request body exceeds {limit} bytes")]
    PayloadTooLarge { limit: usize },

    #[error("internal error: {0}")]
    Internal(String),
}

impl ProxyError {
    pub fn status(&self) -> StatusCode {
        match self {
            ProxyError::Routing(_) => StatusCode::BAD_REQUEST,
            ProxyError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            ProxyError::CircuitOpen { .. } => StatusCode::SERVICE_UNAVAILABLE,
            ProxyError::Upstream { source, .. } if source.is_timeout() => StatusCode::GATEWAY_TIMEOUT,
            ProxyError::Upstream { .. } => StatusCode::BAD_GATEWAY,
            ProxyError::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            ProxyError::Store(_) | ProxyError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Short machine-readable code for the JSON body.
    pub fn code(&self) -> &'static str {
        match self {
            ProxyError::Routing(RoutingError::DotSegment { .. }) => "invalid_path",
            ProxyError::Routing(_) => "no_mapping",
            ProxyError::RateLimited { .. } => "rate_limited",
            ProxyError::CircuitOpen { .. } => "circuit_open",
            ProxyError::Upstream { source, .. } if source.is_timeout() => "upstream_timeout",
            ProxyError::Upstream { .. } => "upstream_error",
            ProxyError::PayloadTooLarge { .. } => "payload_too_large",
            ProxyError::Store(_) | ProxyError::Internal(_) => "internal_error",
        }
    }

    /// Render as a JSON error response. Store and internal details stay in
    /// the logs.
    pub fn to_response(&self) -> ProxyResponse {
        let message = match self {
            ProxyError::Store(_) | ProxyError::Internal(_) => "internal proxy error".to_string(),
            other => other.to_string(),
        };
        ProxyResponse::error(self.status(), self.code(), &message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_status_mapping() {
        let routing = ProxyError::from(RoutingError::NoMapping { path: "/x".into() });
        assert_eq!(routing.status(), StatusCode::BAD_REQUEST);

        let limited = ProxyError::RateLimited { mapping: "m".into() };
        assert_eq!(limited.status(), StatusCode::TOO_MANY_REQUESTS);

        let open = ProxyError::CircuitOpen { mapping: "m".into() };
        assert_eq!(open.status(), StatusCode::SERVICE_UNAVAILABLE);

        let timeout = ProxyError::Upstream {
            mapping: "m".into(),
            source: TransportError::Timeout(Duration::from_secs(20)),
        };
        assert_eq!(timeout.status(), StatusCode::GATEWAY_TIMEOUT);

        let refused = ProxyError::Upstream {
            mapping: "m".into(),
            source: TransportError::Connect("refused".into()),
        };
        assert_eq!(refused.status(), StatusCode::BAD_GATEWAY);

        let store = ProxyError::from(StoreError::Backend("down".into()));
        assert_eq!(store.status(), StatusCode::INTERNAL_SERVER_ERROR);

        assert_eq!(ProxyError::PayloadTooLarge { limit: 10 }.status(), StatusCode::PAYLOAD_TOO_LARGE);
    }

    #[test]
    fn test_store_details_not_leaked() {
        let err = ProxyError::from(StoreError::Backend("redis://secret-host refused".into()));
        let resp = err.to_response();
        let body = String::from_utf8(resp.body.to_vec()).unwrap();
        assert!(!body.contains("secret-host"));
        assert!(body.contains("internal_error"));
    }

    #[test]
    fn test_no_mapping_message() {
        let err = ProxyError::from(RoutingError::NoMapping { path: "/nope".into() });
        let json: serde_json::Value = serde_json::from_slice(&err.to_response().body).unwrap();
        assert_eq!(json["error"], "no_mapping");
        assert_eq!(json["message"], "no proxy mapping for path /nope");
    }
}
