use super::{PipelineEvent, PipelineObserver};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::time::{Duration, SystemTime};

/// One completed call as seen by [`TrafficRecorder`].
#[derive(Debug, Clone)]
pub struct TrafficRecord {
    pub method: http::Method,
    /// URL without query string or credentials
    pub url: String,
    pub status: Option<u16>,
    pub error: Option<String>,
    pub attempts: usize,
    pub elapsed: Duration,
    pub recorded_at: SystemTime,
}

/// Keeps the most recent completed calls in a bounded ring buffer.
///
/// Handy for debugging endpoints and tests; bodies and headers are not kept.
#[derive(Debug)]
pub struct TrafficRecorder {
    capacity: usize,
    records: Mutex<VecDeque<TrafficRecord>>,
}

impl TrafficRecorder {
    pub const DEFAULT_CAPACITY: usize = 256;

    /// A capacity of zero is raised to one.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            records: Mutex::new(VecDeque::with_capacity(capacity)),
        }
    }

    /// Recorded calls, oldest first.
    #[must_use]
    pub fn records(&self) -> Vec<TrafficRecord> {
        self.records.lock().iter().cloned().collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.lock().is_empty()
    }

    pub fn clear(&self) {
        self.records.lock().clear();
    }
}

impl Default for TrafficRecorder {
    fn default() -> Self {
        Self::new(Self::DEFAULT_CAPACITY)
    }
}

impl PipelineObserver for TrafficRecorder {
    fn on_request_complete(&self, event: &PipelineEvent<'_>) {
        let record = TrafficRecord {
            method: event.request.method().clone(),
            url: event.request.sanitized_url(),
            status: event
                .response
                .map(crate::Response::status)
                .or_else(|| event.error.and_then(crate::NetworkError::status_code)),
            error: event.error.map(ToString::to_string),
            attempts: event.attempts,
            elapsed: event.elapsed,
            recorded_at: SystemTime::now(),
        };

        let mut records = self.records.lock();
        if records.len() == self.capacity {
            records.pop_front();
        }
        records.push_back(record);
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use crate::{NetworkError, Request};
    use bytes::Bytes;
    use http::Method;

    fn complete(recorder: &TrafficRecorder, path: &str, error: Option<&NetworkError>) {
        let request = Request::new(Method::GET, format!("https://example.com/{path}?k=v"));
        recorder.on_request_complete(&PipelineEvent {
            error,
            attempts: 1,
            ..PipelineEvent::started(&request)
        });
    }

    #[test]
    fn test_ring_buffer_keeps_latest() {
        let recorder = TrafficRecorder::new(2);
        complete(&recorder, "a", None);
        complete(&recorder, "b", None);
        complete(&recorder, "c", None);

        let urls: Vec<String> = recorder.records().into_iter().map(|r| r.url).collect();
        assert_eq!(urls, ["https://example.com/b", "https://example.com/c"]);
    }

    #[test]
    fn test_records_status_from_error() {
        let recorder = TrafficRecorder::default();
        let err = NetworkError::from_status(404, Bytes::from_static(b"gone"));
        complete(&recorder, "missing", Some(&err));

        let record = &recorder.records()[0];
        assert_eq!(record.status, Some(404));
        assert!(record.error.as_deref().is_some_and(|e| e.contains("gone")));

        recorder.clear();
        assert!(recorder.is_empty());
    }

    #[test]
    fn test_zero_capacity_is_raised() {
        let recorder = TrafficRecorder::new(0);
        complete(&recorder, "a", None);
        complete(&recorder, "b", None);
        assert_eq!(recorder.len(), 1);
    }
}
