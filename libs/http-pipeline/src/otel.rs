//! OpenTelemetry trace context propagation for outgoing requests
//!
//! - With `otel` feature: injects W3C Trace Context through the global propagator
//! - Without `otel` feature: no-op

use http::HeaderMap;

/// W3C Trace Context header name
pub const TRACEPARENT: &str = "traceparent";

#[cfg(feature = "otel")]
mod imp {
    use http::{HeaderMap, HeaderName, HeaderValue};
    use opentelemetry::global;
    use opentelemetry::propagation::Injector;
    use tracing_opentelemetry::OpenTelemetrySpanExt;

    /// Adapter for injecting W3C Trace Context into HTTP headers
    struct HeadersInjector<'a>(&'a mut HeaderMap);

    impl Injector for HeadersInjector<'_> {
        fn set(&mut self, key: &str, value: String) {
            if let (Ok(name), Ok(val)) = (
                HeaderName::from_bytes(key.as_bytes()),
                HeaderValue::from_str(&value),
            ) {
                self.0.insert(name, val);
            }
        }
    }

    pub fn inject_current_span(headers: &mut HeaderMap) {
        let cx = tracing::Span::current().context();
        global::get_text_map_propagator(|propagator| {
            propagator.inject_context(&cx, &mut HeadersInjector(headers));
        });
    }
}

#[cfg(not(feature = "otel"))]
mod imp {
    use http::HeaderMap;

    /// No-op: OpenTelemetry is disabled
    pub fn inject_current_span(_headers: &mut HeaderMap) {}
}

/// Inject the context of the current `tracing` span into `headers`.
///
/// Existing trace headers are overwritten. Without the `otel` feature this
/// does nothing.
pub fn inject_current_span(headers: &mut HeaderMap) {
    imp::inject_current_span(headers);
}
