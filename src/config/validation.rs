//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate mappings (matchers present, base URLs absolute, keys unique)
//! - Validate value ranges (thresholds > 0, timeouts ordered)
//! - Check that the selected store backend is usable
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: ProxyConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::collections::HashSet;
use std::net::SocketAddr;

use axum::http::HeaderName;
use thiserror::Error;
use url::Url;

use crate::config::schema::{ProxyConfig, StoreBackend};

/// A single semantic problem with the configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("no mappings configured")]
    NoMappings,

    #[error("mapping #{index} has neither host nor path_prefix")]
    EmptyMatch { index: usize },

    #[error("mapping #{index} path_prefix '{prefix}' must start with '/'")]
    BadPrefix { index: usize, prefix: String },

    #[error("mapping #{index} egress_base_url '{url}' is not an absolute http(s) URL")]
    BadBaseUrl { index: usize, url: String },

    #[error("duplicate mapping key '{key}'")]
    DuplicateKey { key: String },

    #[error("{field} must be greater than zero")]
    Zero { field: &'static str },

    #[error("timeouts.upstream_secs ({upstream}) must be shorter than timeouts.request_secs ({request})")]
    UpstreamNotShorter { upstream: u64, request: u64 },

    #[error("store.redis_url is required for the redis backend")]
    MissingRedisUrl,

    #[error("invalid correlation header name '{0}'")]
    BadHeaderName(String),

    #[error("invalid {field} '{value}'")]
    BadAddress { field: &'static str, value: String },

    #[error("admin.api_key must be set when the admin API is enabled")]
    MissingAdminKey,
}

fn is_http_base(url: &str) -> bool {
    match Url::parse(url) {
        Ok(u) => matches!(u.scheme(), "http" | "https") && u.host_str().is_some(),
        Err(_) => false,
    }
}

/// Check `config`, collecting every problem found.
pub fn validate_config(config: &ProxyConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.mappings.is_empty() {
        errors.push(ValidationError::NoMappings);
    }

    let mut keys = HashSet::new();
    for (index, mapping) in config.mappings.iter().enumerate() {
        if mapping.host.is_none() && mapping.path_prefix.is_none() {
            errors.push(ValidationError::EmptyMatch { index });
        }
        if let Some(prefix) = &mapping.path_prefix {
            if !prefix.starts_with('/') {
                errors.push(ValidationError::BadPrefix { index, prefix: prefix.clone() });
            }
        }
        if !is_http_base(&mapping.egress_base_url) {
            errors.push(ValidationError::BadBaseUrl {
                index,
                url: mapping.egress_base_url.clone(),
            });
        }
        let key = mapping.mapping_key();
        if !keys.insert(key.clone()) {
            errors.push(ValidationError::DuplicateKey { key });
        }
    }

    if config.rate_limit.enabled && config.rate_limit.requests_per_second == 0 {
        errors.push(ValidationError::Zero { field: "rate_limit.requests_per_second" });
    }
    if config.rate_limit.window_ttl_secs == 0 {
        errors.push(ValidationError::Zero { field: "rate_limit.window_ttl_secs" });
    }
    if config.breaker.enabled {
        if config.breaker.error_threshold == 0 {
            errors.push(ValidationError::Zero { field: "breaker.error_threshold" });
        }
        if config.breaker.latency_threshold_ms == 0 {
            errors.push(ValidationError::Zero { field: "breaker.latency_threshold_ms" });
        }
    }
    if config.timeouts.upstream_secs == 0 {
        errors.push(ValidationError::Zero { field: "timeouts.upstream_secs" });
    }
    if config.timeouts.upstream_secs >= config.timeouts.request_secs {
        errors.push(ValidationError::UpstreamNotShorter {
            upstream: config.timeouts.upstream_secs,
            request: config.timeouts.request_secs,
        });
    }

    if config.store.backend == StoreBackend::Redis && config.store.redis_url.is_none() {
        errors.push(ValidationError::MissingRedisUrl);
    }

    for name in &config.correlation_headers {
        if HeaderName::from_bytes(name.as_bytes()).is_err() {
            errors.push(ValidationError::BadHeaderName(name.clone()));
        }
    }

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::BadAddress {
            field: "listener.bind_address",
            value: config.listener.bind_address.clone(),
        });
    }
    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::BadAddress {
            field: "observability.metrics_address",
            value: config.observability.metrics_address.clone(),
        });
    }
    if config.admin.enabled {
        if config.admin.api_key.is_empty() {
            errors.push(ValidationError::MissingAdminKey);
        }
        if config.admin.bind_address.parse::<SocketAddr>().is_err() {
            errors.push(ValidationError::BadAddress {
                field: "admin.bind_address",
                value: config.admin.bind_address.clone(),
            });
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::MappingConfig;

    fn valid() -> ProxyConfig {
        let mut config = ProxyConfig::default();
        config.mappings.push(MappingConfig {
            key: None,
            host: None,
            path_prefix: Some("/hmrc".into()),
            egress_base_url: "https://api.gov.example".into(),
        });
        config
    }

    #[test]
    fn test_valid_config() {
        assert!(validate_config(&valid()).is_ok());
    }

    #[test]
    fn test_collects_all_errors() {
        let mut config = valid();
        config.mappings.push(MappingConfig {
            key: None,
            host: None,
            path_prefix: Some("hmrc".into()),
            egress_base_url: "ftp://files.example".into(),
        });
        config.breaker.error_threshold = 0;
        config.timeouts.upstream_secs = 30;
        config.timeouts.request_secs = 30;
        config.store.backend = StoreBackend::Redis;

        let errors = validate_config(&config).unwrap_err();
        assert!(errors.contains(&ValidationError::BadPrefix { index: 1, prefix: "hmrc".into() }));
        assert!(errors.contains(&ValidationError::BadBaseUrl { index: 1, url: "ftp://files.example".into() }));
        assert!(errors.contains(&ValidationError::Zero { field: "breaker.error_threshold" }));
        assert!(errors.contains(&ValidationError::UpstreamNotShorter { upstream: 30, request: 30 }));
        assert!(errors.contains(&ValidationError::MissingRedisUrl));
    }

    #[test]
    fn test_duplicate_keys() {
        let mut config = valid();
        config.mappings.push(config.mappings[0].clone());
        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors, vec![ValidationError::DuplicateKey { key: "/hmrc".into() }]);
    }

    #[test]
    fn test_empty_mappings() {
        let errors = validate_config(&ProxyConfig::default()).unwrap_err();
        assert!(errors.contains(&ValidationError::NoMappings));
    }

    #[test]
    fn test_admin_requires_key() {
        let mut config = valid();
        config.admin.enabled = true;
        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors, vec![ValidationError::MissingAdminKey]);
    }
}
