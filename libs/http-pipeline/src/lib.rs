#![cfg_attr(coverage_nightly, feature(coverage_attribute))]
#![warn(warnings)]

//! Client-side HTTP request pipeline
//!
//! [`HttpPipeline`] wraps a [`Transport`] with:
//! - Request and response interceptor chains (default headers, `User-Agent`,
//!   request ids, bearer tokens, trace context)
//! - Retries with exponential backoff, jitter and `Retry-After` support
//! - Per-attempt and whole-call timeouts, cancellation via `CancellationToken`
//! - Response validation (status, content type, size, headers, body)
//! - A closed [`NetworkError`] taxonomy with derived predicates
//! - Observers for logging, metrics and traffic recording
//!
//! The default transport is hyper over rustls (HTTPS only unless insecure HTTP
//! is explicitly allowed) with transparent decompression and a redirect limit.
//!
//! # Example
//!
//! ```ignore
//! use http_pipeline::{HttpPipeline, Request, RetryPolicy};
//! use std::time::Duration;
//!
//! let pipeline = HttpPipeline::builder()
//!     .timeout(Duration::from_secs(10))
//!     .user_agent("my-app/1.0")
//!     .retry(Some(RetryPolicy::default()))
//!     .build()?;
//!
//! let request = Request::get("https://example.com/api/items")
//!     .query("page", "2")
//!     .build()?;
//! let items: Vec<Item> = pipeline
//!     .send_as(request)
//!     .await?
//!     .into_value()
//!     .unwrap_or_default();
//! ```

mod builder;
mod codec;
mod config;
mod error;
pub mod interceptor;
pub mod observe;
pub mod otel;
mod pipeline;
mod request;
mod response;
mod retry;
mod settings;
pub mod transport;
pub mod validator;

pub use builder::HttpPipelineBuilder;
pub use codec::{Codec, CodecError, FormCodec, JsonCodec};
pub use config::{
    DEFAULT_USER_AGENT, PipelineConfig, TlsRootConfig, TransportConfig, TransportSecurity,
};
pub use error::{
    BoxError, ERROR_BODY_PREVIEW_LIMIT, InvalidUrlKind, NetworkError, TransportError,
    TransportErrorKind,
};
pub use interceptor::{RequestInterceptor, ResponseInterceptor};
pub use observe::{PipelineEvent, PipelineObserver};
pub use pipeline::{HttpPipeline, Outcome, RETRY_ATTEMPT_HEADER};
pub use request::{Request, RequestBuilder};
pub use response::{Response, parse_retry_after};
pub use retry::{ExponentialBackoff, RetryPolicy, RetryPredicate};
pub use settings::{ENV_PREFIX, PipelineSettings, RetrySettings, SettingsError, TransportSettings};
pub use transport::{HyperTransport, Transport};
pub use validator::ResponseValidator;
