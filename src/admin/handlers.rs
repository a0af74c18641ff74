use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::Serialize;

use crate::admin::AdminState;
use crate::resilience::circuit_breaker::BreakerSnapshot;
use crate::resilience::CircuitBreaker;

#[derive(Serialize)]
pub struct SystemStatus {
    pub version: &'static str,
    pub status: &'static str,
    pub store: &'static str,
    pub mappings: usize,
    pub breaker_enabled: bool,
}

#[derive(Serialize)]
pub struct ResetResult {
    pub key: String,
    pub reset: bool,
}

type ApiError = (StatusCode, Json<serde_json::Value>);

fn api_error(status: StatusCode, message: impl Into<String>) -> ApiError {
    (status, Json(serde_json::json!({ "error": message.into() })))
}

/// The breaker, provided `key` names a configured mapping.
fn breaker_for<'a>(state: &'a AdminState, key: &str) -> Result<&'a CircuitBreaker, ApiError> {
    if !state.service.router().contains_key(key) {
        return Err(api_error(StatusCode::NOT_FOUND, format!("unknown mapping key '{}'", key)));
    }
    state
        .service
        .breaker()
        .ok_or_else(|| api_error(StatusCode::NOT_FOUND, "circuit breaker disabled"))
}

fn store_error(e: impl std::fmt::Display) -> ApiError {
    tracing::error!(error = %e, "Admin store access failed");
    api_error(StatusCode::INTERNAL_SERVER_ERROR, "state store unavailable")
}

pub async fn get_status(State(state): State<AdminState>) -> Json<SystemStatus> {
    Json(SystemStatus {
        version: env!("CARGO_PKG_VERSION"),
        status: "operational",
        store: state.service.store_type(),
        mappings: state.service.router().routes().len(),
        breaker_enabled: state.service.breaker().is_some(),
    })
}

pub async fn get_breakers(State(state): State<AdminState>) -> Result<Json<Vec<BreakerSnapshot>>, ApiError> {
    let Some(breaker) = state.service.breaker() else {
        return Ok(Json(Vec::new()));
    };

    let mut snapshots = Vec::new();
    for route in state.service.router().routes() {
        snapshots.push(breaker.snapshot(route.key()).await.map_err(store_error)?);
    }
    Ok(Json(snapshots))
}

pub async fn get_breaker(
    State(state): State<AdminState>,
    Path(key): Path<String>,
) -> Result<Json<BreakerSnapshot>, ApiError> {
    let breaker = breaker_for(&state, &key)?;
    let snapshot = breaker.snapshot(&key).await.map_err(store_error)?;
    Ok(Json(snapshot))
}

pub async fn reset_breaker(
    State(state): State<AdminState>,
    Path(key): Path<String>,
) -> Result<Json<ResetResult>, ApiError> {
    let breaker = breaker_for(&state, &key)?;
    let reset = breaker.reset(&key).await.map_err(store_error)?;
    if !reset {
        return Err(api_error(StatusCode::CONFLICT, "breaker changed concurrently, retry"));
    }
    tracing::info!(mapping = %key, "Breaker reset via admin API");
    Ok(Json(ResetResult { key, reset }))
}
