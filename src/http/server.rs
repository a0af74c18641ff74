//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create the Axum Router with the catch-all proxy handler
//! - Wire up middleware (tracing, request timeout, body limit)
//! - Translate axum requests into `InboundRequest`
//! - Bind to a listener and drain gracefully on shutdown

use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Body,
    extract::State,
    http::{header, HeaderValue, Request},
    response::{IntoResponse, Response},
    routing::any,
    Router,
};
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower_http::{limit::RequestBodyLimitLayer, timeout::TimeoutLayer, trace::TraceLayer};

use crate::config::ProxyConfig;
use crate::error::ProxyError;
use crate::http::proxy::ProxyService;
use crate::http::request::InboundRequest;

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<ProxyService>,
    pub max_body_bytes: usize,
}

/// HTTP server for the egress proxy.
pub struct HttpServer {
    router: Router,
}

impl HttpServer {
    pub fn new(service: Arc<ProxyService>, config: &ProxyConfig) -> Self {
        let state = AppState {
            service,
            max_body_bytes: config.listener.max_body_bytes,
        };
        Self {
            router: Self::build_router(config, state),
        }
    }

    /// Build the Axum router with all middleware layers.
    #[allow(deprecated)]
    fn build_router(config: &ProxyConfig, state: AppState) -> Router {
        Router::new()
            .route("/{*path}", any(proxy_handler))
            .route("/", any(proxy_handler))
            .with_state(state)
            .layer(RequestBodyLimitLayer::new(config.listener.max_body_bytes))
            .layer(TimeoutLayer::new(Duration::from_secs(config.timeouts.request_secs)))
            .layer(TraceLayer::new_for_http())
    }

    /// The router, for driving the server without a socket.
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    /// Serve on `listener` until `shutdown` fires, then drain in-flight requests.
    pub async fn run(self, listener: TcpListener, mut shutdown: broadcast::Receiver<()>) -> std::io::Result<()> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server starting");

        axum::serve(listener, self.router)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
            })
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

/// Catch-all proxy handler.
async fn proxy_handler(State(state): State<AppState>, request: Request<Body>) -> Response {
    match into_inbound(request, state.max_body_bytes).await {
        Ok(inbound) => state.service.handle(inbound).await.into_response(),
        Err(e) => {
            tracing::warn!(error = %e, "Rejected inbound request");
            e.to_response().into_response()
        }
    }
}

/// Buffer the body and flatten the request into the platform-neutral shape.
async fn into_inbound(request: Request<Body>, max_body_bytes: usize) -> Result<InboundRequest, ProxyError> {
    let (parts, body) = request.into_parts();
    let body = axum::body::to_bytes(body, max_body_bytes)
        .await
        .map_err(|_| ProxyError::PayloadTooLarge { limit: max_body_bytes })?;

    let mut headers = parts.headers;
    // HTTP/2 carries the host in the :authority pseudo-header.
    if !headers.contains_key(header::HOST) {
        if let Some(authority) = parts.uri.authority() {
            if let Ok(value) = HeaderValue::from_str(authority.as_str()) {
                headers.insert(header::HOST, value);
            }
        }
    }

    Ok(InboundRequest {
        method: parts.method,
        path: parts.uri.path().to_string(),
        headers,
        raw_query: parts.uri.query().map(str::to_string),
        body,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::SystemClock;
    use crate::config::MappingConfig;
    use crate::http::response::ProxyResponse;
    use crate::http::transport::{Transport, TransportError};
    use crate::store::MemoryRepository;
    use async_trait::async_trait;
    use axum::http::{HeaderMap, StatusCode};
    use tower::ServiceExt;

    /// Answers every hop with 200 and the upstream URL as the body.
    struct Echo;

    #[async_trait]
    impl Transport for Echo {
        async fn send(&self, request: &crate::http::request::ProxyRequest) -> Result<ProxyResponse, TransportError> {
            Ok(ProxyResponse::new(StatusCode::OK, HeaderMap::new(), request.url.to_string()))
        }
    }

    fn server(max_body_bytes: usize) -> HttpServer {
        let mut config = ProxyConfig::default();
        config.listener.max_body_bytes = max_body_bytes;
        config.mappings.push(MappingConfig {
            key: None,
            host: None,
            path_prefix: Some("/vat".into()),
            egress_base_url: "https://api.gov.example/organisations/vat".into(),
        });
        let service = ProxyService::new(
            &config,
            Arc::new(MemoryRepository::new()),
            Arc::new(Echo),
            Arc::new(SystemClock),
        )
        .unwrap();
        HttpServer::new(Arc::new(service), &config)
    }

    #[tokio::test]
    async fn test_proxies_through_router() {
        let resp = server(1024)
            .router()
            .oneshot(Request::get("/vat/123/returns?from=2024").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(resp.status(), StatusCode::OK);
        let body = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        assert_eq!(body, "https://api.gov.example/organisations/vat/123/returns?from=2024");
    }

    #[tokio::test]
    async fn test_unknown_path_is_400() {
        let resp = server(1024)
            .router()
            .oneshot(Request::get("/unknown/path").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_oversized_body_is_413() {
        let resp = server(8)
            .router()
            .oneshot(
                Request::post("/vat/1")
                    .body(Body::from("this body is longer than eight bytes"))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::PAYLOAD_TOO_LARGE);
    }
}
