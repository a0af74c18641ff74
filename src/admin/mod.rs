//! Admin API: breaker inspection and reset on a separate listener.
//!
//! Mapping keys may contain `/`, so clients percent-encode the `{key}`
//! segment (`/vat` → `%2Fvat`).

pub mod auth;
pub mod handlers;

use std::sync::Arc;

use axum::{
    middleware,
    routing::{get, post},
    Router,
};

use crate::http::ProxyService;
use self::auth::admin_auth_middleware;
use self::handlers::*;

/// Shared state for admin handlers.
#[derive(Clone)]
pub struct AdminState {
    pub service: Arc<ProxyService>,
    pub api_key: Arc<str>,
}

impl AdminState {
    pub fn new(service: Arc<ProxyService>, api_key: &str) -> Self {
        Self {
            service,
            api_key: Arc::from(api_key),
        }
    }
}

pub fn setup_admin_router(state: AdminState) -> Router {
    Router::new()
        .route("/admin/status", get(get_status))
        .route("/admin/breakers", get(get_breakers))
        .route("/admin/breakers/{key}", get(get_breaker))
        .route("/admin/breakers/{key}/reset", post(reset_breaker))
        .layer(middleware::from_fn_with_state(state.clone(), admin_auth_middleware))
        .with_state(state)
}
