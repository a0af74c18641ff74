//! Metrics collection and exposition.
//!
//! # Metrics
//! - `egress_requests_total` (counter): requests by mapping, status
//! - `egress_request_duration_seconds` (histogram): end-to-end latency by mapping
//! - `egress_rate_limited_total` (counter): rate-limit rejections by mapping
//! - `egress_breaker_rejections_total` (counter): calls refused by an open circuit
//! - `egress_breaker_trips_total` (counter): closed → open transitions
//! - `egress_redirects_total` (counter): redirects followed by mapping, status
//!
//! # Design Decisions
//! - Uses the `metrics` facade; without an installed recorder every call is a no-op
//! - Unmatched requests are labelled with mapping `none`

use std::net::SocketAddr;
use std::time::Instant;

use metrics::{counter, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus recorder and its scrape listener on `addr`.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_request(mapping: &str, status: u16, start: Instant) {
    counter!(
        "egress_requests_total",
        "mapping" => mapping.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
    histogram!("egress_request_duration_seconds", "mapping" => mapping.to_string())
        .record(start.elapsed().as_secs_f64());
}

pub fn record_rate_limited(mapping: &str) {
    counter!("egress_rate_limited_total", "mapping" => mapping.to_string()).increment(1);
}

pub fn record_breaker_rejection(mapping: &str) {
    counter!("egress_breaker_rejections_total", "mapping" => mapping.to_string()).increment(1);
}

pub fn record_breaker_trip(mapping: &str) {
    counter!("egress_breaker_trips_total", "mapping" => mapping.to_string()).increment(1);
}

pub fn record_redirect(mapping: &str, status: u16) {
    counter!(
        "egress_redirects_total",
        "mapping" => mapping.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
}
