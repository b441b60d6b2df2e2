use crate::config::{PipelineConfig, TransportConfig, TransportSecurity};
use crate::error::NetworkError;
use crate::interceptor::{
    DefaultHeadersInterceptor, RequestIdInterceptor, RequestInterceptor, RequestInterceptorChain,
    ResponseInterceptor, ResponseInterceptorChain, UserAgentInterceptor,
};
use crate::observe::{PipelineObserver, TracingObserver};
use crate::pipeline::{HttpPipeline, PipelineInner};
use crate::retry::RetryPolicy;
use crate::transport::{HyperTransport, Transport};
use crate::validator::{ResponseValidator, StatusValidator, ValidatorChain};
use http::header::{HeaderName, HeaderValue};
use std::sync::Arc;
use std::time::Duration;

/// Mutable builder, frozen into an [`HttpPipeline`] by [`build`](Self::build).
///
/// Request interceptors run in this order: default headers, `User-Agent`,
/// `x-request-id`, then the interceptors added here in registration order.
/// The validator chain starts with [`StatusValidator::success`]; use
/// [`validators`](Self::validators) to replace it wholesale.
pub struct HttpPipelineBuilder {
    config: PipelineConfig,
    transport: Option<Arc<dyn Transport>>,
    request_interceptors: RequestInterceptorChain,
    response_interceptors: ResponseInterceptorChain,
    validators: ValidatorChain,
    observers: Vec<Arc<dyn PipelineObserver>>,
    error: Option<NetworkError>,
}

impl HttpPipelineBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(PipelineConfig::default())
    }

    #[must_use]
    pub fn with_config(config: PipelineConfig) -> Self {
        Self {
            config,
            transport: None,
            request_interceptors: RequestInterceptorChain::new(),
            response_interceptors: ResponseInterceptorChain::new(),
            validators: ValidatorChain::new().with(StatusValidator::success()),
            observers: Vec::new(),
            error: None,
        }
    }

    /// Per-attempt timeout
    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.config.request_timeout = timeout;
        self
    }

    /// Deadline for the whole call including retries and backoff
    #[must_use]
    pub fn total_timeout(mut self, timeout: Duration) -> Self {
        self.config.total_timeout = Some(timeout);
        self
    }

    #[must_use]
    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.config.user_agent = user_agent.into();
        self
    }

    /// `None` disables retries
    #[must_use]
    pub fn retry(mut self, retry: Option<RetryPolicy>) -> Self {
        self.config.retry = retry;
        self
    }

    /// Response body limit in bytes
    #[must_use]
    pub fn max_body_size(mut self, size: usize) -> Self {
        self.config.transport.max_body_size = size;
        self
    }

    #[must_use]
    pub fn max_request_body_size(mut self, size: usize) -> Self {
        self.config.max_request_body_size = size;
        self
    }

    #[must_use]
    pub fn transport_security(mut self, security: TransportSecurity) -> Self {
        self.config.transport.security = security;
        self
    }

    /// Allow plain `http://` targets (for testing only)
    ///
    /// **WARNING**: This should only be used for local testing with mock servers.
    /// Never use in production as it exposes traffic to interception.
    ///
    /// Only available in debug builds or with the `allow-insecure-http` feature.
    #[must_use]
    #[cfg(any(debug_assertions, feature = "allow-insecure-http"))]
    pub fn allow_insecure_http(mut self) -> Self {
        tracing::warn!(
            target: "http_pipeline::security",
            "allow_insecure_http() called - HTTP traffic will NOT be encrypted"
        );
        self.config.transport.security = TransportSecurity::AllowInsecureHttp;
        self
    }

    /// Settings for the default [`HyperTransport`]; the scheme policy and
    /// body limit also apply to custom transports.
    #[must_use]
    pub fn transport_config(mut self, transport: TransportConfig) -> Self {
        self.config.transport = transport;
        self
    }

    /// Header added to every request that does not already carry it.
    ///
    /// An invalid name or value is reported by [`build`](Self::build).
    #[must_use]
    pub fn default_header(mut self, name: &str, value: &str) -> Self {
        if self.error.is_some() {
            return self;
        }
        match (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            (Ok(name), Ok(value)) => {
                self.config.default_headers.insert(name, value);
            }
            (Err(e), _) => {
                self.error = Some(NetworkError::InvalidRequest(format!(
                    "invalid default header name '{name}': {e}"
                )));
            }
            (_, Err(e)) => {
                self.error = Some(NetworkError::InvalidRequest(format!(
                    "invalid value for default header '{name}': {e}"
                )));
            }
        }
        self
    }

    /// Tag requests with an `x-request-id` UUID when they have none
    #[must_use]
    pub fn request_ids(mut self, enabled: bool) -> Self {
        self.config.request_ids = enabled;
        self
    }

    /// Replace the default [`HyperTransport`]
    #[must_use]
    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    #[must_use]
    pub fn request_interceptor(mut self, interceptor: impl RequestInterceptor + 'static) -> Self {
        self.request_interceptors.push(Arc::new(interceptor));
        self
    }

    #[must_use]
    pub fn response_interceptor(
        mut self,
        interceptor: impl ResponseInterceptor + 'static,
    ) -> Self {
        self.response_interceptors.push(Arc::new(interceptor));
        self
    }

    /// Append a validator after the ones already configured
    #[must_use]
    pub fn validator(mut self, validator: impl ResponseValidator + 'static) -> Self {
        self.validators.push(Arc::new(validator));
        self
    }

    /// Replace the whole validator chain, including the default status check
    #[must_use]
    pub fn validators(mut self, validators: ValidatorChain) -> Self {
        self.validators = validators;
        self
    }

    /// Observers run after the built-in [`TracingObserver`], in registration order
    #[must_use]
    pub fn observer(mut self, observer: Arc<dyn PipelineObserver>) -> Self {
        self.observers.push(observer);
        self
    }

    /// Freeze the configuration.
    ///
    /// # Errors
    /// Returns the first deferred builder error, [`NetworkError::InvalidRequest`]
    /// for an invalid `User-Agent`, or [`NetworkError::Security`] if the default
    /// transport cannot set up TLS.
    pub fn build(self) -> Result<HttpPipeline, NetworkError> {
        if let Some(err) = self.error {
            return Err(err);
        }
        let config = self.config;

        if config.transport.security == TransportSecurity::AllowInsecureHttp {
            tracing::warn!(
                "insecure HTTP enabled (TransportSecurity::AllowInsecureHttp); \
                 use only for testing with mock servers"
            );
        }

        let transport: Arc<dyn Transport> = match self.transport {
            Some(transport) => transport,
            None => Arc::new(HyperTransport::new(&config.transport)?),
        };

        let mut request_chain = RequestInterceptorChain::new();
        if !config.default_headers.is_empty() {
            request_chain.push(Arc::new(DefaultHeadersInterceptor::new(
                config.default_headers.clone(),
            )));
        }
        request_chain.push(Arc::new(UserAgentInterceptor::try_new(&config.user_agent)?));
        if config.request_ids {
            request_chain.push(Arc::new(RequestIdInterceptor::new()));
        }
        request_chain.push(Arc::new(self.request_interceptors));
        #[cfg(feature = "otel")]
        request_chain.push(Arc::new(crate::interceptor::TraceContextInterceptor::new()));

        let mut observers: Vec<Arc<dyn PipelineObserver>> = vec![Arc::new(TracingObserver)];
        observers.extend(self.observers);

        Ok(HttpPipeline {
            inner: Arc::new(PipelineInner {
                config,
                transport,
                request_chain,
                response_chain: self.response_interceptors,
                validator: Arc::new(self.validators),
                observers,
            }),
        })
    }
}

impl Default for HttpPipelineBuilder {
    fn default() -> Self {
        Self::new()
    }
}
