//! Header manipulation on the proxy boundary.
//!
//! # Responsibilities
//! - Strip hop-by-hop headers in both directions
//! - Replace the inbound Host with the upstream authority
//! - Pass correlation headers through untouched and echo them back
//!
//! # Design Decisions
//! - `HeaderMap` is case-insensitive, so `Authorization` and `authorization`
//!   are the same header everywhere
//! - Content-Length is dropped and recomputed by the client for the body
//!   actually sent

use axum::http::header::{self, HeaderMap, HeaderName, HeaderValue};
use url::Url;

const HOP_BY_HOP: [HeaderName; 8] = [
    header::CONNECTION,
    HeaderName::from_static("keep-alive"),
    header::PROXY_AUTHENTICATE,
    header::PROXY_AUTHORIZATION,
    header::TE,
    header::TRAILER,
    header::TRANSFER_ENCODING,
    header::UPGRADE,
];

/// Remove hop-by-hop headers, including any named in `Connection`.
pub fn strip_hop_by_hop(headers: &mut HeaderMap) {
    let listed: Vec<HeaderName> = headers
        .get_all(header::CONNECTION)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .filter_map(|name| HeaderName::from_bytes(name.trim().as_bytes()).ok())
        .collect();

    for name in listed.iter().chain(HOP_BY_HOP.iter()) {
        headers.remove(name);
    }
}

/// Build the header set for the first upstream hop.
pub fn forward_headers(inbound: &HeaderMap, upstream: &Url) -> HeaderMap {
    let mut headers = inbound.clone();
    strip_hop_by_hop(&mut headers);
    headers.remove(header::CONTENT_LENGTH);
    set_host(&mut headers, upstream);
    headers
}

/// Sanitize an upstream response's headers before returning them.
pub fn response_headers(upstream: &HeaderMap) -> HeaderMap {
    let mut headers = upstream.clone();
    strip_hop_by_hop(&mut headers);
    headers.remove(header::CONTENT_LENGTH);
    headers
}

/// Copy the configured correlation headers from the inbound request onto
/// the outgoing response.
pub fn echo_correlation(inbound: &HeaderMap, response: &mut HeaderMap, names: &[HeaderName]) {
    for name in names {
        if let Some(value) = inbound.get(name) {
            response.insert(name.clone(), value.clone());
        }
    }
}

/// The `Host` header value for a URL: host plus non-default port.
pub fn host_value(url: &Url) -> Option<HeaderValue> {
    let host = url.host_str()?;
    let value = match url.port() {
        Some(port) => format!("{}:{}", host, port),
        None => host.to_string(),
    };
    HeaderValue::from_str(&value).ok()
}

/// Point the `Host` header at `url`, removing it if the URL has no host.
pub fn set_host(headers: &mut HeaderMap, url: &Url) {
    match host_value(url) {
        Some(v) => {
            headers.insert(header::HOST, v);
        }
        None => {
            headers.remove(header::HOST);
        }
    }
}
