//! File and environment driven pipeline settings.
//!
//! [`PipelineSettings`] is the serde view of [`PipelineConfig`]. Durations are
//! written in humantime form (`"30s"`, `"250ms"`, `"1m 30s"`).
//!
//! ```yaml
//! request_timeout: 10s
//! total_timeout: 45s
//! retry:
//!   max_retries: 5
//!   base_delay: 200ms
//! default_headers:
//!   accept: application/json
//! ```
//!
//! [`PipelineSettings::load`] layers built-in defaults, an optional YAML file
//! and `HTTP_PIPELINE_*` environment variables (`__` separates nesting, e.g.
//! `HTTP_PIPELINE_RETRY__MAX_RETRIES=1`).

use crate::config::{PipelineConfig, TlsRootConfig, TransportConfig, TransportSecurity};
use crate::retry::{ExponentialBackoff, RetryPolicy};
use figment::Figment;
use figment::providers::{Env, Format, Serialized, Yaml};
use http::header::{HeaderMap, HeaderName, HeaderValue};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// Environment variable prefix read by [`PipelineSettings::load`]
pub const ENV_PREFIX: &str = "HTTP_PIPELINE_";

#[derive(Error, Debug)]
pub enum SettingsError {
    #[error("failed to load pipeline settings: {0}")]
    Figment(#[from] Box<figment::Error>),

    #[error("invalid default header '{name}': {reason}")]
    InvalidHeader { name: String, reason: String },
}

impl From<figment::Error> for SettingsError {
    fn from(err: figment::Error) -> Self {
        Self::Figment(Box::new(err))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PipelineSettings {
    #[serde(with = "duration_serde")]
    pub request_timeout: Duration,
    #[serde(with = "duration_serde::option")]
    pub total_timeout: Option<Duration>,
    /// Response body limit in bytes
    pub max_body_size: usize,
    pub max_request_body_size: usize,
    pub user_agent: String,
    pub allow_insecure_http: bool,
    pub request_ids: bool,
    pub retry: RetrySettings,
    pub transport: TransportSettings,
    pub default_headers: BTreeMap<String, String>,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        let config = PipelineConfig::default();
        Self {
            request_timeout: config.request_timeout,
            total_timeout: config.total_timeout,
            max_body_size: config.transport.max_body_size,
            max_request_body_size: config.max_request_body_size,
            user_agent: config.user_agent,
            allow_insecure_http: false,
            request_ids: config.request_ids,
            retry: RetrySettings::default(),
            transport: TransportSettings::default(),
            default_headers: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RetrySettings {
    /// `false` disables retries regardless of `max_retries`
    pub enabled: bool,
    pub max_retries: usize,
    #[serde(with = "duration_serde")]
    pub base_delay: Duration,
    #[serde(with = "duration_serde")]
    pub max_delay: Duration,
    pub multiplier: f64,
    pub jitter: bool,
    pub honor_retry_after: bool,
}

impl Default for RetrySettings {
    fn default() -> Self {
        let policy = RetryPolicy::default();
        Self {
            enabled: true,
            max_retries: policy.max_retries,
            base_delay: policy.backoff.initial,
            max_delay: policy.backoff.max,
            multiplier: policy.backoff.multiplier,
            jitter: policy.backoff.jitter,
            honor_retry_after: policy.honor_retry_after,
        }
    }
}

impl RetrySettings {
    fn into_policy(self) -> Option<RetryPolicy> {
        if !self.enabled {
            return None;
        }
        let backoff = ExponentialBackoff {
            initial: self.base_delay,
            max: self.max_delay,
            multiplier: self.multiplier,
            jitter: self.jitter,
        };
        Some(
            RetryPolicy::new(self.max_retries, backoff)
                .with_honor_retry_after(self.honor_retry_after),
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TransportSettings {
    pub tls_roots: TlsRootConfig,
    #[serde(with = "duration_serde::option")]
    pub pool_idle_timeout: Option<Duration>,
    pub pool_max_idle_per_host: usize,
    pub max_redirects: usize,
}

impl Default for TransportSettings {
    fn default() -> Self {
        let transport = TransportConfig::default();
        Self {
            tls_roots: transport.tls_roots,
            pool_idle_timeout: transport.pool_idle_timeout,
            pool_max_idle_per_host: transport.pool_max_idle_per_host,
            max_redirects: transport.max_redirects,
        }
    }
}

impl PipelineSettings {
    /// Extract settings from an already assembled figment.
    ///
    /// # Errors
    /// Returns [`SettingsError::Figment`] on missing providers, type mismatches
    /// or unknown keys.
    pub fn from_figment(figment: &Figment) -> Result<Self, SettingsError> {
        Ok(figment.extract()?)
    }

    /// Defaults, then the YAML file at `path` (if given), then `HTTP_PIPELINE_*`
    /// environment variables.
    ///
    /// # Errors
    /// Returns [`SettingsError::Figment`] if a source cannot be read or parsed.
    pub fn load(path: Option<&Path>) -> Result<Self, SettingsError> {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));
        if let Some(path) = path {
            figment = figment.merge(Yaml::file(path));
        }
        figment = figment.merge(Env::prefixed(ENV_PREFIX).split("__"));
        Self::from_figment(&figment)
    }

    /// Convert into a [`PipelineConfig`].
    ///
    /// # Errors
    /// Returns [`SettingsError::InvalidHeader`] if a default header name or
    /// value is not valid HTTP.
    pub fn into_config(self) -> Result<PipelineConfig, SettingsError> {
        let mut default_headers = HeaderMap::with_capacity(self.default_headers.len());
        for (name, value) in &self.default_headers {
            let header_name =
                HeaderName::from_bytes(name.as_bytes()).map_err(|e| SettingsError::InvalidHeader {
                    name: name.clone(),
                    reason: e.to_string(),
                })?;
            let header_value =
                HeaderValue::from_str(value).map_err(|e| SettingsError::InvalidHeader {
                    name: name.clone(),
                    reason: e.to_string(),
                })?;
            default_headers.insert(header_name, header_value);
        }

        let security = if self.allow_insecure_http {
            tracing::warn!(
                target: "http_pipeline::security",
                "allow_insecure_http enabled in settings - HTTP traffic will NOT be encrypted"
            );
            TransportSecurity::AllowInsecureHttp
        } else {
            TransportSecurity::TlsOnly
        };

        Ok(PipelineConfig {
            request_timeout: self.request_timeout,
            total_timeout: self.total_timeout,
            max_request_body_size: self.max_request_body_size,
            user_agent: self.user_agent,
            default_headers,
            request_ids: self.request_ids,
            retry: self.retry.into_policy(),
            transport: TransportConfig {
                security,
                tls_roots: self.transport.tls_roots,
                max_body_size: self.max_body_size,
                max_redirects: self.transport.max_redirects,
                pool_idle_timeout: self.transport.pool_idle_timeout,
                pool_max_idle_per_host: self.transport.pool_max_idle_per_host,
            },
        })
    }
}

/// humantime (de)serialization for `Duration` fields.
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    #[allow(clippy::trivially_copy_pass_by_ref)]
    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(&humantime::format_duration(*value))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let raw = String::deserialize(deserializer)?;
        humantime::parse_duration(raw.trim()).map_err(serde::de::Error::custom)
    }

    pub mod option {
        use serde::{Deserialize, Deserializer, Serializer};
        use std::time::Duration;

        #[allow(clippy::ref_option)]
        pub fn serialize<S: Serializer>(
            value: &Option<Duration>,
            serializer: S,
        ) -> Result<S::Ok, S::Error> {
            match value {
                Some(d) => serializer.collect_str(&humantime::format_duration(*d)),
                None => serializer.serialize_none(),
            }
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(
            deserializer: D,
        ) -> Result<Option<Duration>, D::Error> {
            Option::<String>::deserialize(deserializer)?
                .map(|raw| humantime::parse_duration(raw.trim()).map_err(serde::de::Error::custom))
                .transpose()
        }
    }
}
