//! Request and response interceptors.
//!
//! Interceptors are async transformations applied around the transport. A
//! chain runs its members strictly in registration order, feeding each output
//! to the next; the first failure aborts the chain. Chains implement the same
//! traits as their members, so they nest.

mod auth;
mod headers;
mod trace_context;

pub use auth::{AccessToken, BearerAuthInterceptor, TokenSource};
pub use headers::{
    DefaultHeadersInterceptor, REQUEST_ID_HEADER, RequestIdInterceptor, UserAgentInterceptor,
};
pub use trace_context::TraceContextInterceptor;

use crate::error::NetworkError;
use crate::request::Request;
use crate::response::Response;
use async_trait::async_trait;
use std::sync::Arc;

/// Transforms an outgoing request, or rejects it.
#[async_trait]
pub trait RequestInterceptor: Send + Sync {
    /// # Errors
    /// Any error aborts the call; request interceptor failures are never retried.
    async fn intercept(&self, request: Request) -> Result<Request, NetworkError>;
}

/// Transforms a received response, or rejects it.
#[async_trait]
pub trait ResponseInterceptor: Send + Sync {
    /// # Errors
    /// The error enters the retry decision like any other attempt failure.
    async fn intercept(&self, response: Response) -> Result<Response, NetworkError>;
}

/// Ordered composite of request interceptors.
#[derive(Clone, Default)]
pub struct RequestInterceptorChain {
    interceptors: Vec<Arc<dyn RequestInterceptor>>,
}

impl RequestInterceptorChain {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, interceptor: Arc<dyn RequestInterceptor>) {
        self.interceptors.push(interceptor);
    }

    #[must_use]
    pub fn with(mut self, interceptor: impl RequestInterceptor + 'static) -> Self {
        self.push(Arc::new(interceptor));
        self
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.interceptors.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.interceptors.is_empty()
    }
}

#[async_trait]
impl RequestInterceptor for RequestInterceptorChain {
    async fn intercept(&self, mut request: Request) -> Result<Request, NetworkError> {
        for interceptor in &self.interceptors {
            request = interceptor.intercept(request).await?;
        }
        Ok(request)
    }
}

/// Ordered composite of response interceptors.
#[derive(Clone, Default)]
pub struct ResponseInterceptorChain {
    interceptors: Vec<Arc<dyn ResponseInterceptor>>,
}

impl ResponseInterceptorChain {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, interceptor: Arc<dyn ResponseInterceptor>) {
        self.interceptors.push(interceptor);
    }

    #[must_use]
    pub fn with(mut self, interceptor: impl ResponseInterceptor + 'static) -> Self {
        self.push(Arc::new(interceptor));
        self
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.interceptors.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.interceptors.is_empty()
    }
}

#[async_trait]
impl ResponseInterceptor for ResponseInterceptorChain {
    async fn intercept(&self, mut response: Response) -> Result<Response, NetworkError> {
        for interceptor in &self.interceptors {
            response = interceptor.intercept(response).await?;
        }
        Ok(response)
    }
}
