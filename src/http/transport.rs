//! Single-hop upstream transport.
//!
//! # Responsibilities
//! - Perform exactly one HTTP round trip
//! - Never follow redirects (the redirect loop owns that)
//! - Classify failures as timeout or network error
//!
//! # Design Decisions
//! - `Transport` is a trait so the redirect loop and pipeline can be driven by
//!   scripted responses in tests
//! - The reqwest client carries connect and per-hop timeouts

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::config::TimeoutConfig;
use crate::http::request::ProxyRequest;
use crate::http::response::ProxyResponse;

/// Transport-level failures. These propagate to the caller unmodified.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("upstream timed out after {0:?}")]
    Timeout(Duration),

    #[error("upstream connection failed: {0}")]
    Connect(String),

    #[error("upstream request failed: {0}")]
    Request(String),

    #[error("failed to build HTTP client: {0}")]
    Client(String),
}

impl TransportError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, TransportError::Timeout(_))
    }
}

/// One HTTP round trip.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: &ProxyRequest) -> Result<ProxyResponse, TransportError>;
}

/// reqwest-backed transport with automatic redirects disabled.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
    hop_timeout: Duration,
}

impl ReqwestTransport {
    pub fn new(config: &TimeoutConfig) -> Result<Self, TransportError> {
        let hop_timeout = Duration::from_secs(config.upstream_secs);
        let client = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .connect_timeout(Duration::from_secs(config.connect_secs))
            .timeout(hop_timeout)
            .build()
            .map_err(|e| TransportError::Client(e.to_string()))?;

        Ok(Self { client, hop_timeout })
    }

    fn classify(&self, e: reqwest::Error) -> TransportError {
        if e.is_timeout() {
            TransportError::Timeout(self.hop_timeout)
        } else if e.is_connect() {
            TransportError::Connect(e.to_string())
        } else {
            TransportError::Request(e.to_string())
        }
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn send(&self, request: &ProxyRequest) -> Result<ProxyResponse, TransportError> {
        let mut builder = self
            .client
            .request(request.method.clone(), request.url.clone())
            .headers(request.headers.clone());
        if let Some(body) = &request.body {
            builder = builder.body(body.clone());
        }

        let response = builder.send().await.map_err(|e| self.classify(e))?;
        let status = response.status();
        let headers = response.headers().clone();
        let body = response.bytes().await.map_err(|e| self.classify(e))?;

        Ok(ProxyResponse::new(status, headers, body))
    }
}
