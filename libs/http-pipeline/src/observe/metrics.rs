use super::{PipelineEvent, PipelineObserver};
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Point-in-time copy of [`MetricsObserver`] counters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub requests_started: u64,
    pub requests_succeeded: u64,
    pub requests_failed: u64,
    pub retries: u64,
    pub in_flight: u64,
    pub latency_total: Duration,
    pub latency_max: Duration,
    /// Final status of completed calls that received a response
    pub status_counts: BTreeMap<u16, u64>,
    /// Failed calls by [`crate::NetworkError::kind_name`]
    pub error_counts: BTreeMap<&'static str, u64>,
}

impl MetricsSnapshot {
    /// Mean latency of completed calls.
    #[must_use]
    pub fn latency_avg(&self) -> Duration {
        let completed = self.requests_succeeded + self.requests_failed;
        u32::try_from(completed)
            .ok()
            .filter(|n| *n > 0)
            .map_or(Duration::ZERO, |n| self.latency_total / n)
    }
}

#[derive(Debug, Default)]
struct Latency {
    total: Duration,
    max: Duration,
}

/// In-memory call metrics accumulator.
///
/// Share it with `Arc` to read [`snapshot`](MetricsObserver::snapshot)s while
/// the pipeline keeps recording.
#[derive(Debug, Default)]
pub struct MetricsObserver {
    requests_started: AtomicU64,
    requests_succeeded: AtomicU64,
    requests_failed: AtomicU64,
    retries: AtomicU64,
    in_flight: AtomicU64,
    latency: Mutex<Latency>,
    status_counts: Mutex<BTreeMap<u16, u64>>,
    error_counts: Mutex<BTreeMap<&'static str, u64>>,
}

impl MetricsObserver {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn snapshot(&self) -> MetricsSnapshot {
        let latency = self.latency.lock();
        MetricsSnapshot {
            requests_started: self.requests_started.load(Ordering::Relaxed),
            requests_succeeded: self.requests_succeeded.load(Ordering::Relaxed),
            requests_failed: self.requests_failed.load(Ordering::Relaxed),
            retries: self.retries.load(Ordering::Relaxed),
            in_flight: self.in_flight.load(Ordering::Relaxed),
            latency_total: latency.total,
            latency_max: latency.max,
            status_counts: self.status_counts.lock().clone(),
            error_counts: self.error_counts.lock().clone(),
        }
    }

    pub fn reset(&self) {
        for counter in [
            &self.requests_started,
            &self.requests_succeeded,
            &self.requests_failed,
            &self.retries,
            &self.in_flight,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
        *self.latency.lock() = Latency::default();
        self.status_counts.lock().clear();
        self.error_counts.lock().clear();
    }
}

impl PipelineObserver for MetricsObserver {
    fn on_request_start(&self, _event: &PipelineEvent<'_>) {
        self.requests_started.fetch_add(1, Ordering::Relaxed);
        self.in_flight.fetch_add(1, Ordering::Relaxed);
    }

    fn on_retry(&self, _event: &PipelineEvent<'_>) {
        self.retries.fetch_add(1, Ordering::Relaxed);
    }

    fn on_request_complete(&self, event: &PipelineEvent<'_>) {
        // Saturating: reset() may run between start and completion
        let _ = self
            .in_flight
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |n| n.checked_sub(1));

        match event.error {
            None => self.requests_succeeded.fetch_add(1, Ordering::Relaxed),
            Some(_) => self.requests_failed.fetch_add(1, Ordering::Relaxed),
        };

        if let Some(response) = event.response {
            *self.status_counts.lock().entry(response.status()).or_default() += 1;
        } else if let Some(status) = event.error.and_then(crate::NetworkError::status_code) {
            *self.status_counts.lock().entry(status).or_default() += 1;
        }
        if let Some(error) = event.error {
            *self.error_counts.lock().entry(error.kind_name()).or_default() += 1;
        }

        let mut latency = self.latency.lock();
        latency.total += event.elapsed;
        latency.max = latency.max.max(event.elapsed);
    }
}
