use crate::retry::RetryPolicy;
use http::HeaderMap;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default User-Agent string for outgoing requests
pub const DEFAULT_USER_AGENT: &str = concat!("cf-http-pipeline/", env!("CARGO_PKG_VERSION"));

/// TLS root certificate configuration
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[non_exhaustive]
pub enum TlsRootConfig {
    /// Use Mozilla's root certificates (webpki-roots, no OS dependency)
    #[default]
    WebPki,
    /// Use OS native root certificate store
    Native,
}

/// Transport security configuration
///
/// Controls whether the pipeline enforces TLS or allows insecure HTTP.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[non_exhaustive]
pub enum TransportSecurity {
    /// Require TLS for all connections (HTTPS only) - default and recommended
    #[default]
    TlsOnly,
    /// Allow insecure HTTP connections (for testing with mock servers only)
    ///
    /// **WARNING**: This should only be used for local testing with mock servers.
    /// Never use in production as it exposes traffic to interception.
    AllowInsecureHttp,
}

/// Settings of the default [`crate::HyperTransport`].
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// Transport security mode (default: `TlsOnly`)
    pub security: TransportSecurity,

    /// TLS root certificate strategy (default: `WebPki`)
    pub tls_roots: TlsRootConfig,

    /// Maximum response body size in bytes, after decompression (default: 10 MB)
    ///
    /// The pipeline enforces the same limit on responses from any transport.
    pub max_body_size: usize,

    /// Maximum number of redirects to follow (default: 10, `0` disables)
    pub max_redirects: usize,

    /// Timeout for idle pooled connections (default: 90 seconds)
    ///
    /// Set to `None` to use hyper-util's default idle timeout.
    pub pool_idle_timeout: Option<Duration>,

    /// Maximum number of idle connections per host (default: 32)
    ///
    /// Setting this to `0` disables connection reuse entirely.
    pub pool_max_idle_per_host: usize,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            security: TransportSecurity::TlsOnly,
            tls_roots: TlsRootConfig::default(),
            max_body_size: 10 * 1024 * 1024, // 10 MB
            max_redirects: 10,
            pool_idle_timeout: Some(Duration::from_secs(90)),
            pool_max_idle_per_host: 32,
        }
    }
}

/// Overall pipeline configuration
///
/// A plain value: tweak fields directly or start from a preset, then hand it
/// to [`crate::HttpPipelineBuilder::with_config`].
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Per-attempt timeout (default: 30 seconds)
    ///
    /// A request's own timeout overrides this. Each retry attempt gets a fresh
    /// timeout.
    pub request_timeout: Duration,

    /// Deadline for the whole call, including all retries and backoff
    /// (default: None)
    pub total_timeout: Option<Duration>,

    /// Maximum request body size in bytes (default: 10 MB)
    pub max_request_body_size: usize,

    /// User-Agent header value, applied when the request has none
    pub user_agent: String,

    /// Headers added to every request that does not set them
    pub default_headers: HeaderMap,

    /// Tag requests with an `x-request-id` UUID (default: true)
    pub request_ids: bool,

    /// Retry policy (`None` disables retries)
    pub retry: Option<RetryPolicy>,

    /// Default transport settings and scheme policy
    pub transport: TransportConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(30),
            total_timeout: None,
            max_request_body_size: 10 * 1024 * 1024, // 10 MB
            user_agent: DEFAULT_USER_AGENT.to_owned(),
            default_headers: HeaderMap::new(),
            request_ids: true,
            retry: Some(RetryPolicy::default()),
            transport: TransportConfig::default(),
        }
    }
}

impl PipelineConfig {
    /// Create minimal configuration (no retry, small timeout and limits)
    #[must_use]
    pub fn minimal() -> Self {
        Self {
            request_timeout: Duration::from_secs(10),
            max_request_body_size: 1024 * 1024, // 1 MB
            request_ids: false,
            retry: None,
            transport: TransportConfig {
                max_body_size: 1024 * 1024, // 1 MB
                pool_idle_timeout: Some(Duration::from_secs(30)),
                pool_max_idle_per_host: 8,
                ..TransportConfig::default()
            },
            ..Self::default()
        }
    }

    /// Create configuration for infrastructure services (aggressive retry, large timeout)
    #[must_use]
    pub fn infra_default() -> Self {
        Self {
            request_timeout: Duration::from_secs(60),
            max_request_body_size: 50 * 1024 * 1024, // 50 MB
            retry: Some(RetryPolicy::aggressive()),
            transport: TransportConfig {
                max_body_size: 50 * 1024 * 1024, // 50 MB
                pool_idle_timeout: Some(Duration::from_secs(120)),
                pool_max_idle_per_host: 64,
                ..TransportConfig::default()
            },
            ..Self::default()
        }
    }

    /// Create configuration for testing with mock servers (allows insecure HTTP)
    ///
    /// **WARNING**: This configuration allows plain HTTP connections.
    /// Use only for local testing with mock servers, never in production.
    #[must_use]
    pub fn for_testing() -> Self {
        Self {
            request_timeout: Duration::from_secs(10),
            max_request_body_size: 1024 * 1024, // 1 MB
            retry: None,
            transport: TransportConfig {
                security: TransportSecurity::AllowInsecureHttp,
                max_body_size: 1024 * 1024, // 1 MB
                pool_idle_timeout: Some(Duration::from_secs(10)),
                pool_max_idle_per_host: 4,
                ..TransportConfig::default()
            },
            ..Self::default()
        }
    }
}
