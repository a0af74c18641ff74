//! The per-request proxy pipeline.
//!
//! # Data Flow
//! ```text
//! InboundRequest
//!     → Router          (400 on no mapping)
//!     → RateLimiter     (429 when over the per-second limit)
//!     → CircuitBreaker  (503 when open, upstream not called)
//!     → follow_redirects under the chain deadline (502 / 504 / 508)
//!     → CircuitBreaker::record_outcome
//!     → ProxyResponse   (correlation headers echoed)
//! ```
//!
//! # Design Decisions
//! - Strictly sequential per request; all cross-request coordination goes
//!   through the repository
//! - A store failure before the upstream call is a 500; a failure to record
//!   the outcome afterwards is logged and the upstream response still returned
//! - The chain deadline is shorter than the inbound timeout, so a slow
//!   upstream surfaces as a 504 and a breaker failure

use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::http::HeaderName;

use crate::clock::Clock;
use crate::config::ProxyConfig;
use crate::error::ProxyError;
use crate::http::redirect::follow_redirects;
use crate::http::request::{InboundRequest, ProxyRequest};
use crate::http::response::ProxyResponse;
use crate::http::transport::Transport;
use crate::observability::metrics;
use crate::resilience::timeouts::with_deadline;
use crate::resilience::{CallOutcome, CircuitBreaker};
use crate::routing::{Route, Router};
use crate::security::headers::{echo_correlation, forward_headers, response_headers};
use crate::security::RateLimiter;
use crate::store::BreakerRepository;

/// Everything needed to serve one inbound request. Shared across handlers.
pub struct ProxyService {
    router: Router,
    rate_limiter: Option<RateLimiter>,
    breaker: Option<CircuitBreaker>,
    transport: Arc<dyn Transport>,
    repo: Arc<dyn BreakerRepository>,
    max_hops: u32,
    upstream_deadline: Duration,
    correlation_headers: Vec<HeaderName>,
}

impl ProxyService {
    pub fn new(
        config: &ProxyConfig,
        repo: Arc<dyn BreakerRepository>,
        transport: Arc<dyn Transport>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, ProxyError> {
        let router = Router::from_config(&config.mappings)?;

        let rate_limiter = config
            .rate_limit
            .enabled
            .then(|| RateLimiter::new(repo.clone(), clock.clone(), &config.rate_limit));
        let breaker = config
            .breaker
            .enabled
            .then(|| CircuitBreaker::new(repo.clone(), clock.clone(), &config.breaker));

        let correlation_headers = config
            .correlation_headers
            .iter()
            .map(|name| {
                HeaderName::from_bytes(name.as_bytes())
                    .map_err(|e| ProxyError::Internal(format!("invalid correlation header '{}': {}", name, e)))
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            router,
            rate_limiter,
            breaker,
            transport,
            repo,
            max_hops: config.redirects.max_hops,
            upstream_deadline: Duration::from_secs(config.timeouts.upstream_secs),
            correlation_headers,
        })
    }

    pub fn router(&self) -> &Router {
        &self.router
    }

    pub fn breaker(&self) -> Option<&CircuitBreaker> {
        self.breaker.as_ref()
    }

    pub fn store_type(&self) -> &'static str {
        self.repo.store_type()
    }

    /// Serve one request. Errors are rendered into responses here, so the
    /// caller always gets something to send back.
    pub async fn handle(&self, inbound: InboundRequest) -> ProxyResponse {
        let start = Instant::now();
        let request_id = inbound.request_id(&self.correlation_headers);

        tracing::debug!(
            request_id = %request_id,
            method = %inbound.method,
            path = %inbound.path,
            host = inbound.host().unwrap_or("-"),
            "Proxying request"
        );

        let (mapping, result) = match self.router.match_request(&inbound.path, inbound.host()) {
            Ok(route) => (route.key().to_string(), self.forward(route, &inbound, &request_id).await),
            Err(e) => ("none".to_string(), Err(ProxyError::from(e))),
        };

        let mut response = match result {
            Ok(response) => response,
            Err(e) => {
                match &e {
                    ProxyError::Store(_) | ProxyError::Internal(_) => {
                        tracing::error!(request_id = %request_id, mapping = %mapping, error = %e, "Request failed")
                    }
                    _ => tracing::warn!(
                        request_id = %request_id,
                        mapping = %mapping,
                        status = e.status().as_u16(),
                        error = %e,
                        "Request rejected"
                    ),
                }
                e.to_response()
            }
        };

        echo_correlation(&inbound.headers, &mut response.headers, &self.correlation_headers);
        metrics::record_request(&mapping, response.status.as_u16(), start);

        tracing::info!(
            request_id = %request_id,
            mapping = %mapping,
            status = response.status.as_u16(),
            latency_ms = start.elapsed().as_millis() as u64,
            "Request completed"
        );
        response
    }

    async fn forward(
        &self,
        route: &Route,
        inbound: &InboundRequest,
        request_id: &str,
    ) -> Result<ProxyResponse, ProxyError> {
        let key = route.key();

        if let Some(limiter) = &self.rate_limiter {
            if !limiter.check(key, request_id).await? {
                return Err(ProxyError::RateLimited { mapping: key.to_string() });
            }
        }

        if let Some(breaker) = &self.breaker {
            let admission = breaker.should_allow(key).await?;
            if !admission.allow {
                metrics::record_breaker_rejection(key);
                return Err(ProxyError::CircuitOpen { mapping: key.to_string() });
            }
            tracing::debug!(request_id = %request_id, mapping = %key, state = ?admission.state, "Breaker admitted");
        }

        let url = route.upstream_url(&inbound.path, inbound.raw_query.as_deref());
        let mut request = ProxyRequest::new(inbound.method.clone(), url);
        request.headers = forward_headers(&inbound.headers, &request.url);
        if !inbound.body.is_empty() {
            request.body = Some(inbound.body.clone());
        }

        let started = Instant::now();
        let result = with_deadline(
            self.upstream_deadline,
            follow_redirects(self.transport.as_ref(), request, self.max_hops, key),
        )
        .await;
        let latency = started.elapsed();

        let outcome = match &result {
            Ok(response) => CallOutcome::response(response.status.as_u16(), latency),
            Err(_) => CallOutcome::transport_error(latency),
        };
        if let Some(breaker) = &self.breaker {
            if let Err(e) = breaker.record_outcome(key, outcome).await {
                tracing::error!(request_id = %request_id, mapping = %key, error = %e, "Failed to record breaker outcome");
            }
        }

        match result {
            Ok(upstream) => {
                tracing::debug!(
                    request_id = %request_id,
                    mapping = %key,
                    status = upstream.status.as_u16(),
                    latency_ms = latency.as_millis() as u64,
                    "Upstream responded"
                );
                Ok(ProxyResponse::new(upstream.status, response_headers(&upstream.headers), upstream.body))
            }
            Err(source) => Err(ProxyError::Upstream { mapping: key.to_string(), source }),
        }
    }
}

impl std::fmt::Debug for ProxyService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProxyService")
            .field("routes", &self.router.routes().len())
            .field("rate_limiter", &self.rate_limiter)
            .field("breaker", &self.breaker)
            .field("max_hops", &self.max_hops)
            .field("upstream_deadline", &self.upstream_deadline)
            .finish()
    }
}
