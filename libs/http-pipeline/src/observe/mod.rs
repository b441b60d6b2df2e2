//! Call lifecycle observers.
//!
//! Observers receive one-way notifications at the start of a call, before
//! every retry, and when the call completes. They cannot influence the call.

mod metrics;
mod recorder;

pub use metrics::{MetricsObserver, MetricsSnapshot};
pub use recorder::{TrafficRecord, TrafficRecorder};

use crate::error::NetworkError;
use crate::request::Request;
use crate::response::Response;
use std::time::Duration;

/// What an observer is told about a call.
#[derive(Debug, Clone, Copy)]
pub struct PipelineEvent<'a> {
    /// The request as submitted by the caller (before interceptors)
    pub request: &'a Request,
    /// The validated response; set only on completion of a successful call.
    /// Failed attempts report the status through [`NetworkError::status_code`].
    pub response: Option<&'a Response>,
    /// Error of the latest attempt, if it failed
    pub error: Option<&'a NetworkError>,
    /// Attempts made so far
    pub attempts: usize,
    /// Time since the call started
    pub elapsed: Duration,
    /// Backoff applied before the next attempt (retry events only)
    pub delay: Option<Duration>,
}

impl<'a> PipelineEvent<'a> {
    pub(crate) fn started(request: &'a Request) -> Self {
        Self {
            request,
            response: None,
            error: None,
            attempts: 0,
            elapsed: Duration::ZERO,
            delay: None,
        }
    }

    #[must_use]
    pub fn is_success(&self) -> bool {
        self.error.is_none() && self.response.is_some()
    }
}

/// Receives call lifecycle notifications. All hooks default to no-ops.
pub trait PipelineObserver: Send + Sync {
    fn on_request_start(&self, _event: &PipelineEvent<'_>) {}

    /// Called after the backoff of a retry elapsed, right before the next attempt.
    fn on_retry(&self, _event: &PipelineEvent<'_>) {}

    fn on_request_complete(&self, _event: &PipelineEvent<'_>) {}
}

/// Logs call lifecycle through `tracing`.
///
/// Always installed by [`crate::HttpPipelineBuilder`].
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingObserver;

impl PipelineObserver for TracingObserver {
    fn on_request_start(&self, event: &PipelineEvent<'_>) {
        tracing::debug!(
            method = %event.request.method(),
            url = %event.request.sanitized_url(),
            "sending HTTP request"
        );
    }

    fn on_retry(&self, event: &PipelineEvent<'_>) {
        tracing::debug!(
            method = %event.request.method(),
            url = %event.request.sanitized_url(),
            attempt = event.attempts + 1,
            backoff_ms = event.delay.unwrap_or_default().as_millis(),
            status = event.error.and_then(NetworkError::status_code),
            error = event.error.map(tracing::field::display),
            "retrying HTTP request"
        );
    }

    fn on_request_complete(&self, event: &PipelineEvent<'_>) {
        let elapsed_ms = event.elapsed.as_millis();
        match (event.response, event.error) {
            (Some(response), None) => tracing::debug!(
                method = %event.request.method(),
                url = %event.request.sanitized_url(),
                status = response.status(),
                attempts = event.attempts,
                elapsed_ms,
                "HTTP request completed"
            ),
            (_, error) => tracing::info!(
                method = %event.request.method(),
                url = %event.request.sanitized_url(),
                attempts = event.attempts,
                elapsed_ms,
                error_kind = error.map(NetworkError::kind_name),
                error = error.map(tracing::field::display),
                "HTTP request failed"
            ),
        }
    }
}
