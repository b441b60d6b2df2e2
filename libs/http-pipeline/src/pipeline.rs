//! Request execution.
//!
//! One call runs this loop, at most `max_retries + 1` times:
//!
//! 1. request interceptors on the caller's original request (failure ends the call)
//! 2. validation, scheme policy, body limit, query merge
//! 3. transport round-trip under the per-attempt timeout
//! 4. response interceptors, then the validator
//! 5. on error, the retry policy decides between backoff and giving up
//!
//! Observers hear about the start, every retry and the completion. The whole
//! call runs inside an `outgoing_http` span.

use crate::builder::HttpPipelineBuilder;
use crate::codec::Codec;
use crate::config::{PipelineConfig, TransportSecurity};
use crate::error::{InvalidUrlKind, NetworkError};
use crate::interceptor::{
    RequestInterceptor, RequestInterceptorChain, ResponseInterceptor, ResponseInterceptorChain,
};
use crate::observe::{PipelineEvent, PipelineObserver};
use crate::request::Request;
use crate::response::Response;
use crate::transport::Transport;
use crate::validator::ResponseValidator;
use bytes::Bytes;
use http::header::{HeaderName, HeaderValue};
use serde::de::DeserializeOwned;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, Level};

/// Header carrying the 1-based retry number on retried attempts
pub const RETRY_ATTEMPT_HEADER: &str = "x-retry-attempt";

/// Result of a call together with how it got there.
#[derive(Debug)]
pub struct Outcome {
    pub result: Result<Response, NetworkError>,
    /// Attempts dispatched or prepared, including the first
    pub attempts: usize,
    pub elapsed: Duration,
}

impl Outcome {
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }

    /// # Errors
    /// Returns the call's final error.
    pub fn into_result(self) -> Result<Response, NetworkError> {
        self.result
    }
}

pub struct PipelineInner {
    pub(crate) config: PipelineConfig,
    pub(crate) transport: Arc<dyn Transport>,
    pub(crate) request_chain: RequestInterceptorChain,
    pub(crate) response_chain: ResponseInterceptorChain,
    pub(crate) validator: Arc<dyn ResponseValidator>,
    pub(crate) observers: Vec<Arc<dyn PipelineObserver>>,
}

/// Client-side HTTP pipeline.
///
/// Built once with [`HttpPipeline::builder`] and shared; clones are cheap and
/// all calls share the same frozen configuration.
///
/// ```ignore
/// let pipeline = HttpPipeline::builder()
///     .timeout(Duration::from_secs(5))
///     .retry(Some(RetryPolicy::default()))
///     .build()?;
///
/// let user: Response<User> = pipeline
///     .send_as(Request::get("https://api.example.com/users/42").build()?)
///     .await?;
/// ```
#[derive(Clone)]
pub struct HttpPipeline {
    pub(crate) inner: Arc<PipelineInner>,
}

impl std::fmt::Debug for HttpPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpPipeline")
            .field("config", &self.inner.config)
            .field("request_interceptors", &self.inner.request_chain.len())
            .field("response_interceptors", &self.inner.response_chain.len())
            .field("observers", &self.inner.observers.len())
            .finish_non_exhaustive()
    }
}

impl HttpPipeline {
    #[must_use]
    pub fn builder() -> HttpPipelineBuilder {
        HttpPipelineBuilder::new()
    }

    #[must_use]
    pub fn config(&self) -> &PipelineConfig {
        &self.inner.config
    }

    /// Execute `request` and return the validated response.
    ///
    /// # Errors
    /// Returns the classified error of the final attempt.
    pub async fn send(&self, request: Request) -> Result<Response, NetworkError> {
        self.execute(request, None).await.into_result()
    }

    /// Like [`send`](Self::send), aborting with [`NetworkError::Cancelled`]
    /// as soon as `cancel` fires.
    ///
    /// # Errors
    /// Returns [`NetworkError::Cancelled`] on cancellation, otherwise the
    /// classified error of the final attempt.
    pub async fn send_cancellable(
        &self,
        request: Request,
        cancel: &CancellationToken,
    ) -> Result<Response, NetworkError> {
        self.execute(request, Some(cancel)).await.into_result()
    }

    /// Execute `request` and report attempts and elapsed time alongside the result.
    pub async fn send_for_result(&self, request: Request) -> Outcome {
        self.execute(request, None).await
    }

    /// Send and decode the body as JSON.
    ///
    /// # Errors
    /// Returns the call's error, or a decode error for the body.
    pub async fn send_as<T: DeserializeOwned>(
        &self,
        request: Request,
    ) -> Result<Response<T>, NetworkError> {
        self.send(request).await?.json()
    }

    /// Send and decode the body with `codec`.
    ///
    /// # Errors
    /// Returns the call's error, or a decode error for the body.
    pub async fn send_with_codec<T, C>(
        &self,
        request: Request,
        codec: &C,
    ) -> Result<Response<T>, NetworkError>
    where
        T: DeserializeOwned,
        C: Codec,
    {
        self.send(request).await?.decode(codec)
    }

    async fn execute(&self, request: Request, cancel: Option<&CancellationToken>) -> Outcome {
        let span = tracing::span!(
            Level::INFO, "outgoing_http",
            http.method = %request.method(),
            http.url = %request.sanitized_url(),
            otel.kind = "client",
            http.status_code = tracing::field::Empty,
            http.attempts = tracing::field::Empty,
            error = tracing::field::Empty,
        );

        let outcome = self.run(&request, cancel).instrument(span.clone()).await;

        span.record("http.attempts", outcome.attempts);
        match &outcome.result {
            Ok(response) => {
                span.record("http.status_code", response.status());
            }
            Err(err) => {
                if let Some(status) = err.status_code() {
                    span.record("http.status_code", status);
                }
                span.record("error", true);
            }
        }
        outcome
    }

    async fn run(&self, request: &Request, cancel: Option<&CancellationToken>) -> Outcome {
        let inner = &*self.inner;
        let started = Instant::now();
        let total_timeout = inner.config.total_timeout;
        let deadline = total_timeout.map(|total| started + total);

        inner.notify(|o| o.on_request_start(&PipelineEvent::started(request)));

        let mut attempt = 0;
        loop {
            let prepared = until_deadline(
                deadline,
                total_timeout,
                self.prepare(request, attempt, cancel),
            )
            .await;

            let result = match prepared {
                Ok((http_request, timeout_override)) => {
                    let attempt_timeout = timeout_override.unwrap_or(inner.config.request_timeout);
                    until_deadline(
                        deadline,
                        total_timeout,
                        self.dispatch(http_request, attempt_timeout, deadline, cancel),
                    )
                    .await
                }
                // Interceptor and validation failures are final
                Err(err) => return self.finish(request, started, attempt + 1, Err(err)),
            };

            let error = match result {
                Ok(response) => return self.finish(request, started, attempt + 1, Ok(response)),
                Err(error) => error,
            };

            let Some(delay) = self.retry_delay(&error, attempt, deadline) else {
                return self.finish(request, started, attempt + 1, Err(error));
            };

            tracing::debug!(
                attempt = attempt + 1,
                backoff_ms = delay.as_millis(),
                error = %error,
                "attempt failed, backing off"
            );
            if let Err(cancelled) = with_cancel(cancel, tokio::time::sleep(delay)).await {
                return self.finish(request, started, attempt + 1, Err(cancelled));
            }

            inner.notify(|o| {
                o.on_retry(&PipelineEvent {
                    error: Some(&error),
                    attempts: attempt + 1,
                    elapsed: started.elapsed(),
                    delay: Some(delay),
                    ..PipelineEvent::started(request)
                });
            });
            attempt += 1;
        }
    }

    /// Interceptors, validation and finalization for one attempt.
    async fn prepare(
        &self,
        request: &Request,
        attempt: usize,
        cancel: Option<&CancellationToken>,
    ) -> Result<(http::Request<Bytes>, Option<Duration>), NetworkError> {
        let inner = &*self.inner;
        let request = with_cancel(cancel, inner.request_chain.intercept(request.clone())).await??;

        request.validate()?;

        if let Some(body) = request.body() {
            let limit = inner.config.max_request_body_size;
            if body.len() > limit {
                return Err(NetworkError::RequestTooLarge {
                    limit,
                    actual: body.len(),
                });
            }
        }

        let mut http_request = request.finalize()?;
        if http_request.uri().scheme_str() == Some("http")
            && inner.config.transport.security == TransportSecurity::TlsOnly
        {
            return Err(NetworkError::invalid_url(
                request.sanitized_url(),
                InvalidUrlKind::InsecureScheme,
                "plain HTTP is not allowed; use https:// or allow insecure HTTP for testing",
            ));
        }

        if attempt > 0 {
            http_request.headers_mut().insert(
                HeaderName::from_static(RETRY_ATTEMPT_HEADER),
                HeaderValue::from(attempt),
            );
        }
        Ok((http_request, request.timeout()))
    }

    /// Transport round-trip, response interceptors and validation.
    async fn dispatch(
        &self,
        request: http::Request<Bytes>,
        timeout: Duration,
        deadline: Option<Instant>,
        cancel: Option<&CancellationToken>,
    ) -> Result<Response, NetworkError> {
        let inner = &*self.inner;
        let timeout = deadline.map_or(timeout, |at| {
            timeout.min(at.saturating_duration_since(Instant::now()))
        });

        let started = Instant::now();
        let raw = with_cancel(
            cancel,
            tokio::time::timeout(timeout, inner.transport.perform(request)),
        )
        .await?
        .map_err(|_| NetworkError::Timeout(Some(timeout)))??;
        let response = Response::from_http(raw, started.elapsed());

        let limit = inner.config.transport.max_body_size;
        if response.body().len() > limit {
            return Err(NetworkError::ResponseTooLarge {
                limit,
                actual: response.body().len(),
            });
        }

        let response = with_cancel(cancel, inner.response_chain.intercept(response)).await??;
        inner.validator.validate(&response)?;
        Ok(response)
    }

    /// Backoff before the next attempt, or `None` to give up.
    fn retry_delay(
        &self,
        error: &NetworkError,
        attempt: usize,
        deadline: Option<Instant>,
    ) -> Option<Duration> {
        let policy = self.inner.config.retry.as_ref()?;
        if attempt >= policy.max_retries
            || is_final(error)
            || !policy.should_retry(error, attempt)
        {
            return None;
        }

        let delay = policy.delay_for(error, attempt);
        match deadline {
            // Never sleep into the deadline; the last real error is more useful
            Some(at) if Instant::now() + delay >= at => None,
            _ => Some(delay),
        }
    }

    fn finish(
        &self,
        request: &Request,
        started: Instant,
        attempts: usize,
        result: Result<Response, NetworkError>,
    ) -> Outcome {
        let elapsed = started.elapsed();
        let (response, error) = match &result {
            Ok(response) => (Some(response), None),
            Err(error) => (None, Some(error)),
        };
        self.inner.notify(|o| {
            o.on_request_complete(&PipelineEvent {
                response,
                error,
                attempts,
                elapsed,
                ..PipelineEvent::started(request)
            });
        });
        Outcome {
            result,
            attempts,
            elapsed,
        }
    }
}

impl PipelineInner {
    fn notify(&self, hook: impl Fn(&dyn PipelineObserver)) {
        for observer in &self.observers {
            hook(observer.as_ref());
        }
    }
}

/// Errors no predicate may retry.
fn is_final(error: &NetworkError) -> bool {
    matches!(
        error,
        NetworkError::Cancelled
            | NetworkError::Decode(_)
            | NetworkError::Encode(_)
            | NetworkError::InvalidRequest(_)
            | NetworkError::InvalidUrl { .. }
            | NetworkError::RequestTooLarge { .. }
    )
}

async fn with_cancel<F: Future>(
    cancel: Option<&CancellationToken>,
    future: F,
) -> Result<F::Output, NetworkError> {
    match cancel {
        Some(token) => tokio::select! {
            biased;
            () = token.cancelled() => Err(NetworkError::Cancelled),
            output = future => Ok(output),
        },
        None => Ok(future.await),
    }
}

async fn until_deadline<T, F>(
    deadline: Option<Instant>,
    total: Option<Duration>,
    future: F,
) -> Result<T, NetworkError>
where
    F: Future<Output = Result<T, NetworkError>>,
{
    match deadline {
        Some(at) => tokio::time::timeout_at(at, future)
            .await
            .unwrap_or(Err(NetworkError::Timeout(total))),
        None => future.await,
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use crate::error::{TransportError, TransportErrorKind};
    use crate::observe::MetricsObserver;
    use crate::retry::{ExponentialBackoff, RetryPolicy};
    use crate::validator::{StatusValidator, ValidatorChain};
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Clone, Copy)]
    enum Step {
        Status(u16),
        Fail(TransportErrorKind),
        Slow(Duration),
    }

    /// Replays `steps`, repeating the last one once exhausted.
    struct Scripted {
        steps: Mutex<VecDeque<Step>>,
        last: Step,
        calls: AtomicUsize,
        seen: Mutex<Vec<http::Request<Bytes>>>,
    }

    impl Scripted {
        fn new(steps: impl IntoIterator<Item = Step>) -> Arc<Self> {
            let steps: VecDeque<Step> = steps.into_iter().collect();
            let last = *steps.back().unwrap();
            Arc::new(Self {
                steps: Mutex::new(steps),
                last,
                calls: AtomicUsize::new(0),
                seen: Mutex::new(Vec::new()),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Transport for Scripted {
        async fn perform(
            &self,
            request: http::Request<Bytes>,
        ) -> Result<http::Response<Bytes>, TransportError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.seen.lock().push(request);
            let step = self.steps.lock().pop_front().unwrap_or(self.last);
            match step {
                Step::Status(status) => Ok(http::Response::builder()
                    .status(status)
                    .body(Bytes::from(format!("status {status}")))
                    .unwrap()),
                Step::Fail(kind) => Err(TransportError::new(kind, "scripted failure")),
                Step::Slow(delay) => {
                    tokio::time::sleep(delay).await;
                    Ok(http::Response::new(Bytes::from_static(b"slow")))
                }
            }
        }
    }

    fn pipeline(transport: &Arc<Scripted>, max_retries: usize) -> HttpPipeline {
        HttpPipeline::builder()
            .transport(transport.clone())
            .retry(Some(RetryPolicy::new(max_retries, ExponentialBackoff::fast())))
            .build()
            .unwrap()
    }

    fn get() -> Request {
        Request::new(http::Method::GET, "https://api.test/items")
    }

    #[test]
    fn test_pipeline_is_send_sync_clone() {
        fn assert_send_sync<T: Send + Sync + Clone>() {}
        assert_send_sync::<HttpPipeline>();
    }

    #[tokio::test]
    async fn test_retry_ceiling_is_max_retries_plus_one() {
        let transport = Scripted::new([Step::Fail(TransportErrorKind::ConnectionLost)]);
        let outcome = pipeline(&transport, 4).send_for_result(get()).await;

        assert_eq!(transport.calls(), 5);
        assert_eq!(outcome.attempts, 5);
        assert!(matches!(
            outcome.into_result(),
            Err(NetworkError::ConnectivityLost(_))
        ));
    }

    #[tokio::test]
    async fn test_client_error_is_not_retried() {
        let transport = Scripted::new([Step::Status(400)]);
        let err = pipeline(&transport, 3).send(get()).await.unwrap_err();

        assert_eq!(transport.calls(), 1);
        assert!(matches!(err, NetworkError::ClientError { status: 400, .. }));
        assert_eq!(err.response_body().unwrap().as_ref(), b"status 400");
    }

    #[tokio::test]
    async fn test_server_errors_then_success() {
        let transport = Scripted::new([
            Step::Status(500),
            Step::Status(500),
            Step::Status(500),
            Step::Status(200),
        ]);
        let metrics = Arc::new(MetricsObserver::new());
        let pipeline = HttpPipeline::builder()
            .transport(transport.clone())
            .retry(Some(RetryPolicy::new(3, ExponentialBackoff::fast())))
            .observer(metrics.clone())
            .build()
            .unwrap();

        let response = pipeline.send(get()).await.unwrap();
        assert_eq!(response.status(), 200);
        assert_eq!(transport.calls(), 4);

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.retries, 3);
        assert_eq!(snapshot.requests_succeeded, 1);

        let seen = transport.seen.lock();
        assert!(seen[0].headers().get(RETRY_ATTEMPT_HEADER).is_none());
        assert_eq!(seen[1].headers()[RETRY_ATTEMPT_HEADER], "1");
        assert_eq!(seen[3].headers()[RETRY_ATTEMPT_HEADER], "3");
    }

    #[tokio::test(start_paused = true)]
    async fn test_attempt_timeout() {
        let transport = Scripted::new([Step::Slow(Duration::from_secs(5))]);
        let pipeline = HttpPipeline::builder()
            .transport(transport.clone())
            .timeout(Duration::from_secs(1))
            .retry(None)
            .build()
            .unwrap();

        let outcome = pipeline.send_for_result(get()).await;
        assert!(matches!(outcome.result, Err(NetworkError::Timeout(_))));
        assert!(outcome.elapsed >= Duration::from_secs(1));
        assert!(outcome.elapsed < Duration::from_secs(2));
    }

    #[tokio::test(start_paused = true)]
    async fn test_request_timeout_overrides_default() {
        let transport = Scripted::new([Step::Slow(Duration::from_secs(5))]);
        let pipeline = HttpPipeline::builder()
            .transport(transport.clone())
            .timeout(Duration::from_secs(1))
            .retry(None)
            .build()
            .unwrap();

        let response = pipeline
            .send(get().with_timeout(Duration::from_secs(10)))
            .await
            .unwrap();
        assert_eq!(response.body().as_ref(), b"slow");
    }

    #[tokio::test(start_paused = true)]
    async fn test_total_timeout_bounds_retries() {
        let transport = Scripted::new([Step::Slow(Duration::from_secs(2))]);
        let pipeline = HttpPipeline::builder()
            .transport(transport.clone())
            .timeout(Duration::from_secs(1))
            .total_timeout(Duration::from_millis(2500))
            .retry(Some(RetryPolicy::new(10, ExponentialBackoff::fast())))
            .build()
            .unwrap();

        let outcome = pipeline.send_for_result(get()).await;
        assert!(matches!(outcome.result, Err(NetworkError::Timeout(_))));
        assert!(outcome.elapsed < Duration::from_secs(3));
        assert!(transport.calls() < 10);
    }

    #[tokio::test]
    async fn test_cancellation_is_not_retried() {
        let transport = Scripted::new([Step::Slow(Duration::from_secs(30))]);
        let pipeline = pipeline(&transport, 3);
        let token = CancellationToken::new();

        let canceller = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            canceller.cancel();
        });

        let err = pipeline.send_cancellable(get(), &token).await.unwrap_err();
        assert!(matches!(err, NetworkError::Cancelled));
        assert_eq!(transport.calls(), 1);
    }

    #[tokio::test]
    async fn test_plain_http_rejected_without_dispatch() {
        let transport = Scripted::new([Step::Status(200)]);
        let err = pipeline(&transport, 3)
            .send(Request::new(http::Method::GET, "http://api.test/items?token=s3cret"))
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            NetworkError::InvalidUrl {
                kind: InvalidUrlKind::InsecureScheme,
                ..
            }
        ));
        assert!(!err.to_string().contains("s3cret"));
        assert_eq!(transport.calls(), 0);
    }

    #[tokio::test]
    async fn test_body_on_get_fails_before_dispatch() {
        let transport = Scripted::new([Step::Status(200)]);
        let err = pipeline(&transport, 3)
            .send(get().with_body("payload"))
            .await
            .unwrap_err();
        assert!(matches!(err, NetworkError::InvalidRequest(_)));
        assert_eq!(transport.calls(), 0);
    }

    #[tokio::test]
    async fn test_request_body_limit() {
        let transport = Scripted::new([Step::Status(200)]);
        let pipeline = HttpPipeline::builder()
            .transport(transport.clone())
            .max_request_body_size(4)
            .build()
            .unwrap();

        let err = pipeline
            .send(Request::new(http::Method::POST, "https://api.test/items").with_body("too long"))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            NetworkError::RequestTooLarge { limit: 4, actual: 8 }
        ));
        assert_eq!(transport.calls(), 0);
    }

    #[tokio::test]
    async fn test_response_body_limit() {
        let transport = Scripted::new([Step::Status(200)]);
        let pipeline = HttpPipeline::builder()
            .transport(transport.clone())
            .max_body_size(3)
            .build()
            .unwrap();

        let err = pipeline.send(get()).await.unwrap_err();
        assert!(matches!(err, NetworkError::ResponseTooLarge { limit: 3, .. }));
    }

    #[tokio::test]
    async fn test_custom_predicate_cannot_retry_final_errors() {
        let transport = Scripted::new([Step::Status(200)]);
        let pipeline = HttpPipeline::builder()
            .transport(transport.clone())
            .retry(Some(
                RetryPolicy::new(3, ExponentialBackoff::fast()).retry_if(|_, _| true),
            ))
            .build()
            .unwrap();

        let err = pipeline.send(get().with_body("x")).await.unwrap_err();
        assert!(matches!(err, NetworkError::InvalidRequest(_)));
    }

    struct Unreachable;

    #[async_trait]
    impl RequestInterceptor for Unreachable {
        async fn intercept(&self, _request: Request) -> Result<Request, NetworkError> {
            Err(NetworkError::ConnectivityLost("vpn down".into()))
        }
    }

    struct Counting(Arc<AtomicUsize>);

    #[async_trait]
    impl RequestInterceptor for Counting {
        async fn intercept(&self, request: Request) -> Result<Request, NetworkError> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(request)
        }
    }

    struct Stalling(Duration);

    #[async_trait]
    impl RequestInterceptor for Stalling {
        async fn intercept(&self, request: Request) -> Result<Request, NetworkError> {
            tokio::time::sleep(self.0).await;
            Ok(request)
        }
    }

    fn cancel_after(token: &CancellationToken, after: Duration) {
        let token = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(after).await;
            token.cancel();
        });
    }

    #[tokio::test]
    async fn test_interceptor_failure_ends_call_without_retry() {
        let transport = Scripted::new([Step::Status(200)]);
        let later = Arc::new(AtomicUsize::new(0));
        let metrics = Arc::new(MetricsObserver::new());
        let pipeline = HttpPipeline::builder()
            .transport(transport.clone())
            .retry(Some(RetryPolicy::new(3, ExponentialBackoff::fast())))
            .request_interceptor(Unreachable)
            .request_interceptor(Counting(later.clone()))
            .observer(metrics.clone())
            .build()
            .unwrap();

        let outcome = pipeline.send_for_result(get()).await;

        assert!(matches!(
            outcome.result,
            Err(NetworkError::ConnectivityLost(_))
        ));
        assert_eq!(outcome.attempts, 1);
        assert_eq!(transport.calls(), 0);
        assert_eq!(later.load(Ordering::SeqCst), 0);

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.retries, 0);
        assert_eq!(snapshot.requests_failed, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancellation_during_backoff() {
        let transport = Scripted::new([Step::Status(503)]);
        let slow_backoff = ExponentialBackoff {
            initial: Duration::from_secs(10),
            max: Duration::from_secs(10),
            multiplier: 2.0,
            jitter: false,
        };
        let metrics = Arc::new(MetricsObserver::new());
        let pipeline = HttpPipeline::builder()
            .transport(transport.clone())
            .retry(Some(RetryPolicy::new(3, slow_backoff)))
            .observer(metrics.clone())
            .build()
            .unwrap();

        let token = CancellationToken::new();
        cancel_after(&token, Duration::from_millis(50));

        let started = Instant::now();
        let err = pipeline.send_cancellable(get(), &token).await.unwrap_err();

        assert!(matches!(err, NetworkError::Cancelled));
        assert!(started.elapsed() < Duration::from_secs(1));
        assert_eq!(transport.calls(), 1);
        assert_eq!(metrics.snapshot().retries, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancellation_during_request_interceptor() {
        let transport = Scripted::new([Step::Status(200)]);
        let pipeline = HttpPipeline::builder()
            .transport(transport.clone())
            .retry(Some(RetryPolicy::new(3, ExponentialBackoff::fast())))
            .request_interceptor(Stalling(Duration::from_secs(10)))
            .build()
            .unwrap();

        let token = CancellationToken::new();
        cancel_after(&token, Duration::from_millis(50));

        let started = Instant::now();
        let err = pipeline.send_cancellable(get(), &token).await.unwrap_err();

        assert!(matches!(err, NetworkError::Cancelled));
        assert!(started.elapsed() < Duration::from_secs(1));
        assert_eq!(transport.calls(), 0);
    }

    #[tokio::test]
    async fn test_already_cancelled_token_never_dispatches() {
        let transport = Scripted::new([Step::Status(200)]);
        let token = CancellationToken::new();
        token.cancel();

        let err = pipeline(&transport, 3)
            .send_cancellable(get(), &token)
            .await
            .unwrap_err();

        assert!(matches!(err, NetworkError::Cancelled));
        assert_eq!(transport.calls(), 0);
    }

    /// (response status, error status) of every completion event
    #[derive(Default)]
    struct Completions(Mutex<Vec<(Option<u16>, Option<u16>)>>);

    impl PipelineObserver for Completions {
        fn on_request_complete(&self, event: &PipelineEvent<'_>) {
            self.0.lock().push((
                event.response.map(Response::status),
                event.error.and_then(NetworkError::status_code),
            ));
        }
    }

    #[tokio::test]
    async fn test_completion_event_carries_response_only_on_success() {
        let transport = Scripted::new([Step::Status(200)]);
        let completions = Arc::new(Completions::default());

        let strict = HttpPipeline::builder()
            .transport(transport.clone())
            .validators(ValidatorChain::new().with(StatusValidator::codes([204])))
            .observer(completions.clone())
            .build()
            .unwrap();
        let lenient = HttpPipeline::builder()
            .transport(transport.clone())
            .observer(completions.clone())
            .build()
            .unwrap();

        assert!(strict.send(get()).await.is_err());
        assert!(lenient.send(get()).await.is_ok());

        assert_eq!(
            *completions.0.lock(),
            vec![(None, Some(200)), (Some(200), None)]
        );
    }

    #[tokio::test]
    async fn test_decode_helpers() {
        #[derive(serde::Deserialize, Debug, PartialEq)]
        struct Item {
            id: u32,
        }

        struct JsonStub;

        #[async_trait]
        impl Transport for JsonStub {
            async fn perform(
                &self,
                _request: http::Request<Bytes>,
            ) -> Result<http::Response<Bytes>, TransportError> {
                Ok(http::Response::new(Bytes::from_static(br#"{"id":7}"#)))
            }
        }

        let pipeline = HttpPipeline::builder()
            .transport(Arc::new(JsonStub))
            .build()
            .unwrap();

        let typed = pipeline.send_as::<Item>(get()).await.unwrap();
        assert_eq!(typed.value(), Some(&Item { id: 7 }));

        let typed = pipeline
            .send_with_codec::<Item, _>(get(), &crate::codec::JsonCodec)
            .await
            .unwrap();
        assert_eq!(typed.into_value(), Some(Item { id: 7 }));
    }
}
