use super::RequestInterceptor;
use crate::error::NetworkError;
use crate::request::Request;
use async_trait::async_trait;

/// Propagates the current trace context (W3C `traceparent`/`tracestate`).
///
/// Runs inside the pipeline's `outgoing_http` span, so the injected parent is
/// that span. Does nothing unless the `otel` feature is enabled.
#[derive(Debug, Clone, Copy, Default)]
pub struct TraceContextInterceptor;

impl TraceContextInterceptor {
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl RequestInterceptor for TraceContextInterceptor {
    async fn intercept(&self, request: Request) -> Result<Request, NetworkError> {
        Ok(request.map_headers(crate::otel::inject_current_span))
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_no_headers_outside_an_exported_span() {
        use http::Method;

        let request = Request::new(Method::GET, "https://example.com");
        let request = TraceContextInterceptor::new().intercept(request).await.unwrap();
        assert!(request.headers().is_empty());
    }
}
