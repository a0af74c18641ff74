//! Redirect following.
//!
//! # Algorithm
//! ```text
//! loop:
//!     response = transport.send(request)
//!     not 301/302/303/307/308      → return response
//!     no usable Location           → return response
//!     hops += 1; hops > max_hops   → return 508
//!     301/302/303                  → GET, no body, drop Content-Type/Length
//!     307/308                      → method and body unchanged
//!     cross-origin                 → drop Authorization and Cookie, Host = next authority
//!     request.url = Location resolved against request.url
//! ```
//!
//! # Design Decisions
//! - 301/302 become GET for every method, like browsers and legacy clients
//! - Origin is (scheme, host, port); any difference counts as cross-origin
//! - Transport errors propagate untouched; only the hop limit becomes a response

use axum::http::{header, Method, StatusCode};
use url::Url;

use crate::http::request::ProxyRequest;
use crate::http::response::ProxyResponse;
use crate::http::transport::{Transport, TransportError};
use crate::observability::metrics;
use crate::security::headers::set_host;

/// Default upper bound on followed redirects.
pub const DEFAULT_MAX_HOPS: u32 = 5;

pub fn is_redirect(status: StatusCode) -> bool {
    matches!(status.as_u16(), 301 | 302 | 303 | 307 | 308)
}

/// Statuses whose follow-up request is a body-less GET.
fn rewrites_to_get(status: StatusCode) -> bool {
    matches!(status.as_u16(), 301 | 302 | 303)
}

pub fn same_origin(a: &Url, b: &Url) -> bool {
    a.scheme() == b.scheme()
        && a.host_str().map(str::to_ascii_lowercase) == b.host_str().map(str::to_ascii_lowercase)
        && a.port_or_known_default() == b.port_or_known_default()
}

/// Resolve the `Location` header of `response` against `current`.
pub fn resolve_location(current: &Url, response: &ProxyResponse) -> Option<Url> {
    let location = response.headers.get(header::LOCATION)?.to_str().ok()?;
    let next = current.join(location.trim()).ok()?;
    matches!(next.scheme(), "http" | "https").then_some(next)
}

/// Build the request for the next hop.
pub fn next_hop(mut request: ProxyRequest, status: StatusCode, next_url: Url) -> ProxyRequest {
    if rewrites_to_get(status) {
        request.method = Method::GET;
        request.body = None;
        request.headers.remove(header::CONTENT_TYPE);
        request.headers.remove(header::CONTENT_LENGTH);
    }

    if !same_origin(&request.url, &next_url) {
        request.headers.remove(header::AUTHORIZATION);
        request.headers.remove(header::COOKIE);
        set_host(&mut request.headers, &next_url);
    }

    request.url = next_url;
    request
}

/// Send `request`, following redirects up to `max_hops`. `mapping` labels
/// logs and metrics.
pub async fn follow_redirects(
    transport: &dyn Transport,
    mut request: ProxyRequest,
    max_hops: u32,
    mapping: &str,
) -> Result<ProxyResponse, TransportError> {
    let mut hops = 0u32;

    loop {
        let response = transport.send(&request).await?;
        if !is_redirect(response.status) {
            return Ok(response);
        }

        let Some(next_url) = resolve_location(&request.url, &response) else {
            tracing::debug!(url = %request.url, status = %response.status, "Redirect without usable Location");
            return Ok(response);
        };

        hops += 1;
        if hops > max_hops {
            tracing::warn!(mapping = %mapping, url = %request.url, max_hops, "Redirect loop detected");
            return Ok(ProxyResponse::loop_detected(max_hops));
        }

        tracing::debug!(
            mapping = %mapping,
            hop = hops,
            status = %response.status,
            from = %request.url,
            to = %next_url,
            cross_origin = !same_origin(&request.url, &next_url),
            "Following redirect"
        );
        metrics::record_redirect(mapping, response.status.as_u16());
        request = next_hop(request, response.status, next_url);
    }
}
