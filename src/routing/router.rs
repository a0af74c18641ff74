//! Mapping lookup.
//!
//! # Responsibilities
//! - Store compiled mappings in declaration order
//! - Look up the first matching mapping for a request
//! - Build the upstream URL for a matched request
//!
//! # Design Decisions
//! - Immutable after construction (thread-safe without locks)
//! - O(n) scan, declaration order is the tie-break for overlapping prefixes
//! - Explicit error on no match rather than a silent default

use thiserror::Error;
use url::Url;

use crate::config::MappingConfig;
use crate::routing::matcher::{AndMatcher, HostMatcher, Matcher, PathPrefixMatcher, RequestTarget};

/// Routing failures.
#[derive(Debug, Error)]
pub enum RoutingError {
    #[error("no proxy mapping for path {path}")]
    NoMapping { path: String },

    #[error("mapping '{key}' has invalid egress base URL '{url}': {reason}")]
    InvalidBaseUrl { key: String, url: String, reason: String },

    #[error("mapping '{key}' has neither a host nor a path prefix")]
    EmptyMatch { key: String },

    #[error("path {path} contains a dot segment")]
    DotSegment { path: String },
}

/// True for `.` and `..`, raw or percent-encoded (`%2e`), split on `/` or `\`.
/// `Url::set_path` would resolve these against the mapping's base path.
fn has_dot_segment(path: &str) -> bool {
    path.split(['/', '\\']).any(|segment| {
        let decoded = segment.to_ascii_lowercase().replace("%2e", ".");
        decoded == "." || decoded == ".."
    })
}

/// A compiled mapping.
#[derive(Debug)]
pub struct Route {
    key: String,
    upstream_base: Url,
    strip_prefix: Option<String>,
    matcher: Box<dyn Matcher>,
}

impl Route {
    /// Compile a mapping from configuration.
    pub fn from_config(config: &MappingConfig) -> Result<Self, RoutingError> {
        let key = config.mapping_key();

        let upstream_base = Url::parse(&config.egress_base_url).map_err(|e| RoutingError::InvalidBaseUrl {
            key: key.clone(),
            url: config.egress_base_url.clone(),
            reason: e.to_string(),
        })?;
        if upstream_base.cannot_be_a_base() || upstream_base.host_str().is_none() {
            return Err(RoutingError::InvalidBaseUrl {
                key,
                url: config.egress_base_url.clone(),
                reason: "not an absolute http(s) URL".to_string(),
            });
        }

        let mut matchers: Vec<Box<dyn Matcher>> = Vec::new();
        if let Some(host) = &config.host {
            matchers.push(Box::new(HostMatcher::new(host.clone())));
        }
        if let Some(prefix) = &config.path_prefix {
            matchers.push(Box::new(PathPrefixMatcher::new(prefix.clone())));
        }
        let matcher: Box<dyn Matcher> = match matchers.len() {
            0 => return Err(RoutingError::EmptyMatch { key }),
            1 => matchers.remove(0),
            _ => Box::new(AndMatcher::new(matchers)),
        };

        Ok(Self {
            key,
            upstream_base,
            strip_prefix: config.path_prefix.clone(),
            matcher,
        })
    }

    /// Stable key shared by the rate limiter and the breaker.
    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn upstream_base(&self) -> &Url {
        &self.upstream_base
    }

    pub fn matches(&self, target: &RequestTarget<'_>) -> bool {
        self.matcher.matches(target)
    }

    /// Upstream URL for an inbound `path` and raw query string.
    ///
    /// The matched prefix is removed and the remainder appended to the base
    /// URL's own path.
    pub fn upstream_url(&self, path: &str, raw_query: Option<&str>) -> Url {
        let remainder = match &self.strip_prefix {
            Some(prefix) => path.strip_prefix(prefix.trim_end_matches('/')).unwrap_or(path),
            None => path,
        };

        let mut combined = self.upstream_base.path().trim_end_matches('/').to_string();
        combined.push_str(remainder);
        if combined.is_empty() {
            combined.push('/');
        }

        let mut url = self.upstream_base.clone();
        url.set_path(&combined);
        url.set_query(raw_query.filter(|q| !q.is_empty()));
        url
    }
}

/// Ordered, immutable mapping table.
#[derive(Debug, Default)]
pub struct Router {
    routes: Vec<Route>,
}

impl Router {
    /// Compile every mapping, failing on the first invalid one.
    pub fn from_config(mappings: &[MappingConfig]) -> Result<Self, RoutingError> {
        let routes = mappings
            .iter()
            .map(Route::from_config)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { routes })
    }

    /// First mapping matching `path` / `host`, in declaration order. Paths
    /// with dot segments never match.
    pub fn match_request(&self, path: &str, host: Option<&str>) -> Result<&Route, RoutingError> {
        if has_dot_segment(path) {
            return Err(RoutingError::DotSegment { path: path.to_string() });
        }
        let target = RequestTarget::new(path, host);
        self.routes
            .iter()
            .find(|r| r.matches(&target))
            .ok_or_else(|| RoutingError::NoMapping { path: path.to_string() })
    }

    pub fn routes(&self) -> &[Route] {
        &self.routes
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.routes.iter().any(|r| r.key == key)
    }
}
