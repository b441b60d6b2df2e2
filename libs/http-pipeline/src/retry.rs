//! Retry policy with exponential backoff.
//!
//! A [`RetryPolicy`] is stateless: it answers "retry this error at this
//! attempt?" and "how long to wait?". Attempt counters live in the pipeline's
//! per-call state, so one policy is shared by every concurrent call.

use crate::error::NetworkError;
use rand::Rng;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Decides whether `(error, attempt)` deserves another attempt.
///
/// `attempt` is zero-based: `0` is the first failed attempt.
pub type RetryPredicate = Arc<dyn Fn(&NetworkError, usize) -> bool + Send + Sync>;

/// Maximum computed backoff (1 day); beyond this retry logic is meaningless.
const MAX_BACKOFF_SECS: f64 = 86400.0;

/// Exponential backoff configuration for retries
///
/// Computes delay as: `min(initial * multiplier^attempt, max)`, then, with
/// jitter enabled, scales it by a uniform factor in `[0.5, 1.5]`.
#[derive(Debug, Clone)]
pub struct ExponentialBackoff {
    /// Initial backoff duration (default: 100ms)
    pub initial: Duration,

    /// Maximum backoff duration before jitter (default: 10s)
    pub max: Duration,

    /// Backoff multiplier (default: 2.0). Values below 1.0 shrink the delay
    /// on every attempt.
    pub multiplier: f64,

    /// Enable jitter to prevent thundering herd (default: true)
    pub jitter: bool,
}

impl Default for ExponentialBackoff {
    fn default() -> Self {
        Self {
            initial: Duration::from_millis(100),
            max: Duration::from_secs(10),
            multiplier: 2.0,
            jitter: true,
        }
    }
}

impl ExponentialBackoff {
    /// Create backoff with custom initial and max durations
    #[must_use]
    pub fn new(initial: Duration, max: Duration) -> Self {
        Self {
            initial,
            max,
            ..Self::default()
        }
    }

    /// Create fast backoff for testing (1ms initial, 100ms max, no jitter)
    #[must_use]
    pub fn fast() -> Self {
        Self {
            initial: Duration::from_millis(1),
            max: Duration::from_millis(100),
            multiplier: 2.0,
            jitter: false,
        }
    }

    /// Create aggressive backoff (50ms initial, 30s max)
    #[must_use]
    pub fn aggressive() -> Self {
        Self {
            initial: Duration::from_millis(50),
            max: Duration::from_secs(30),
            multiplier: 2.0,
            jitter: true,
        }
    }

    /// Delay before retry number `attempt + 1`.
    ///
    /// Non-finite or negative inputs are sanitized, so this never panics.
    #[must_use]
    pub fn delay(&self, attempt: usize) -> Duration {
        let duration = self.base_delay(attempt);
        if self.jitter {
            let factor = rand::rng().random_range(0.5..=1.5);
            duration.mul_f64(factor)
        } else {
            duration
        }
    }

    fn base_delay(&self, attempt: usize) -> Duration {
        let attempt_i32 = i32::try_from(attempt).unwrap_or(i32::MAX);

        // Must be finite and >= 0, default to 1.0
        let multiplier = if self.multiplier.is_finite() && self.multiplier >= 0.0 {
            self.multiplier
        } else {
            1.0
        };

        let initial_secs = self.initial.as_secs_f64();
        let max_secs = self.max.as_secs_f64().min(MAX_BACKOFF_SECS);

        let base = initial_secs * multiplier.powi(attempt_i32);

        // Clamp to valid range for Duration::from_secs_f64 (finite, non-negative)
        let clamped = if base.is_finite() {
            base.min(max_secs).max(0.0)
        } else {
            max_secs
        };
        Duration::from_secs_f64(clamped)
    }
}

/// Retry policy: attempt ceiling, backoff, and the retry predicate.
///
/// The default predicate is [`NetworkError::is_retryable`].
#[derive(Clone)]
pub struct RetryPolicy {
    /// Maximum number of retries after the initial attempt (0 = no retries, default: 3)
    /// Total attempts = 1 (initial) + `max_retries`
    pub max_retries: usize,

    /// Backoff strategy configuration
    pub backoff: ExponentialBackoff,

    /// Use the server's `Retry-After` delay (capped at `backoff.max`) instead
    /// of the computed backoff when the error carries one (default: true)
    pub honor_retry_after: bool,

    predicate: Option<RetryPredicate>,
}

impl fmt::Debug for RetryPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryPolicy")
            .field("max_retries", &self.max_retries)
            .field("backoff", &self.backoff)
            .field("honor_retry_after", &self.honor_retry_after)
            .field("custom_predicate", &self.predicate.is_some())
            .finish()
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            backoff: ExponentialBackoff::default(),
            honor_retry_after: true,
            predicate: None,
        }
    }
}

impl RetryPolicy {
    #[must_use]
    pub fn new(max_retries: usize, backoff: ExponentialBackoff) -> Self {
        Self {
            max_retries,
            backoff,
            ..Self::default()
        }
    }

    /// Policy that never retries
    #[must_use]
    pub fn disabled() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }

    /// 5 retries with [`ExponentialBackoff::aggressive`]
    #[must_use]
    pub fn aggressive() -> Self {
        Self {
            max_retries: 5,
            backoff: ExponentialBackoff::aggressive(),
            ..Self::default()
        }
    }

    /// Replace the retry predicate.
    ///
    /// # Example
    ///
    /// ```ignore
    /// // Also retry 409 Conflict, but never past the second attempt
    /// let policy = RetryPolicy::default().retry_if(|err, attempt| {
    ///     attempt < 2 && (err.is_retryable() || err.status_code() == Some(409))
    /// });
    /// ```
    #[must_use]
    pub fn retry_if<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&NetworkError, usize) -> bool + Send + Sync + 'static,
    {
        self.predicate = Some(Arc::new(predicate));
        self
    }

    #[must_use]
    pub fn with_honor_retry_after(mut self, honor: bool) -> Self {
        self.honor_retry_after = honor;
        self
    }

    /// Ask the predicate whether `error` at `attempt` should be retried.
    ///
    /// The attempt ceiling is enforced by the pipeline, not here.
    #[must_use]
    pub fn should_retry(&self, error: &NetworkError, attempt: usize) -> bool {
        match &self.predicate {
            Some(predicate) => predicate(error, attempt),
            None => error.is_retryable(),
        }
    }

    /// Computed backoff for `attempt` (zero-based).
    #[must_use]
    pub fn delay(&self, attempt: usize) -> Duration {
        self.backoff.delay(attempt)
    }

    /// Delay to wait after `error` at `attempt`, honoring `Retry-After`.
    #[must_use]
    pub fn delay_for(&self, error: &NetworkError, attempt: usize) -> Duration {
        match error.retry_after() {
            Some(requested) if self.honor_retry_after => requested.min(self.backoff.max),
            _ => self.delay(attempt),
        }
    }
}
