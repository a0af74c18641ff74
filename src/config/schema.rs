//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the proxy.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};

/// Root configuration for the egress proxy.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ProxyConfig {
    /// Listener configuration (bind address, body limit).
    pub listener: ListenerConfig,

    /// Ordered mappings from inbound path/host to upstream base URL.
    pub mappings: Vec<MappingConfig>,

    /// Rate limiting configuration.
    pub rate_limit: RateLimitConfig,

    /// Circuit breaker configuration.
    pub breaker: BreakerConfig,

    /// Redirect-following configuration.
    pub redirects: RedirectConfig,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Breaker / rate-limit state store.
    pub store: StoreConfig,

    /// Headers passed through to the upstream and echoed on the response.
    pub correlation_headers: Vec<String>,

    /// Observability settings.
    pub observability: ObservabilityConfig,

    pub admin: AdminConfig,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            listener: ListenerConfig::default(),
            mappings: Vec::new(),
            rate_limit: RateLimitConfig::default(),
            breaker: BreakerConfig::default(),
            redirects: RedirectConfig::default(),
            timeouts: TimeoutConfig::default(),
            store: StoreConfig::default(),
            correlation_headers: vec![
                "x-request-id".to_string(),
                "x-correlation-id".to_string(),
                "traceparent".to_string(),
            ],
            observability: ObservabilityConfig::default(),
            admin: AdminConfig::default(),
        }
    }
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,

    /// Maximum inbound body size in bytes.
    pub max_body_bytes: usize,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
            max_body_bytes: 2 * 1024 * 1024, // 2MB
        }
    }
}

/// A single proxy mapping.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MappingConfig {
    /// Key for rate-limit and breaker bookkeeping. Defaults to the match string.
    #[serde(default)]
    pub key: Option<String>,

    /// Host header to match (exact match, case-insensitive).
    #[serde(default)]
    pub host: Option<String>,

    /// Path prefix to match. The prefix is stripped before forwarding.
    #[serde(default)]
    pub path_prefix: Option<String>,

    /// Upstream base URL (e.g., "https://api.service.example.gov").
    pub egress_base_url: String,
}

impl MappingConfig {
    /// The stable key used by the limiter and the breaker.
    pub fn mapping_key(&self) -> String {
        if let Some(key) = &self.key {
            return key.clone();
        }
        match (&self.host, &self.path_prefix) {
            (Some(host), Some(prefix)) => format!("{}{}", host.to_lowercase(), prefix),
            (Some(host), None) => host.to_lowercase(),
            (None, Some(prefix)) => prefix.clone(),
            (None, None) => self.egress_base_url.clone(),
        }
    }
}

/// Rate limiting configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Enable rate limiting.
    pub enabled: bool,

    /// Maximum requests per second per mapping key, across all workers.
    pub requests_per_second: u64,

    /// Lifetime of a window counter in the store.
    pub window_ttl_secs: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            requests_per_second: 3,
            window_ttl_secs: 60,
        }
    }
}

/// Circuit breaker configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct BreakerConfig {
    /// Enable the circuit breaker.
    pub enabled: bool,

    /// Consecutive failures before the circuit opens.
    pub error_threshold: u32,

    /// Calls at or above this latency count as failures.
    pub latency_threshold_ms: u64,

    /// How long an open circuit rejects calls before probing.
    pub cooldown_secs: u64,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            error_threshold: 5,
            latency_threshold_ms: 5_000,
            cooldown_secs: 30,
        }
    }
}

/// Redirect-following configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RedirectConfig {
    /// Maximum redirects followed before answering 508.
    pub max_hops: u32,
}

impl Default for RedirectConfig {
    fn default() -> Self {
        Self { max_hops: 5 }
    }
}

/// Timeout configuration for various operations.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Upstream connection establishment timeout in seconds.
    pub connect_secs: u64,

    /// Deadline for the whole upstream exchange, redirects included.
    pub upstream_secs: u64,

    /// Inbound request timeout (total time for request/response) in seconds.
    /// Must be longer than `upstream_secs`.
    pub request_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            connect_secs: 5,
            upstream_secs: 20,
            request_secs: 30,
        }
    }
}

/// Which repository backs the limiter and breaker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    Memory,
    Redis,
}

/// State store configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct StoreConfig {
    pub backend: StoreBackend,

    /// Redis connection URL, required for the redis backend.
    pub redis_url: Option<String>,

    /// Namespace for every key written by the proxy.
    pub key_prefix: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::Memory,
            redis_url: None,
            key_prefix: "egress".to_string(),
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Pretty,
    Json,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error). `RUST_LOG` wins when set.
    pub log_level: String,

    pub log_format: LogFormat,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

/// Admin API configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AdminConfig {
    /// Enable admin API.
    pub enabled: bool,

    /// API key for authentication (Bearer token).
    pub api_key: String,

    /// Admin API bind address.
    pub bind_address: String,
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            // Rejected by validation when the admin API is enabled.
            api_key: String::new(),
            bind_address: "127.0.0.1:8081".to_string(),
        }
    }
}
