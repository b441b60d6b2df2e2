use crate::codec::CodecError;
use bytes::Bytes;
use std::borrow::Cow;
use std::time::Duration;
use thiserror::Error;

/// Maximum body preview size kept inside status errors (8KB).
///
/// When a call fails with a non-2xx status, the response body travels with the
/// error for debugging. This constant bounds how much of it is retained.
pub const ERROR_BODY_PREVIEW_LIMIT: usize = 8 * 1024;

/// Boxed error used for wrapped causes.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Classification of URL validation failures.
///
/// Provides programmatic matching for different failure modes without
/// relying on unstable error message strings.
///
/// # Example
///
/// ```ignore
/// match &err {
///     NetworkError::InvalidUrl { kind, .. } => match kind {
///         InvalidUrlKind::Parse => println!("Malformed URL syntax"),
///         InvalidUrlKind::InsecureScheme => println!("Use https://"),
///         _ => println!("Other URL error"),
///     },
///     _ => {}
/// }
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum InvalidUrlKind {
    /// URL could not be parsed (malformed syntax)
    Parse,
    /// URL has no host component
    MissingHost,
    /// Scheme is neither `http` nor `https`
    UnsupportedScheme,
    /// `http://` target while the pipeline only allows TLS
    InsecureScheme,
}

/// Classified failure of a pipeline call.
///
/// Every failed call ends in exactly one variant. Predicates such as
/// [`NetworkError::is_retryable`] are derived from the variant, never stored.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum NetworkError {
    /// No network path, or an established connection was dropped
    #[error("Connectivity lost: {0}")]
    ConnectivityLost(#[source] BoxError),

    /// The attempt or the whole call exceeded its deadline
    #[error("Request timed out{}", timeout_suffix(.0))]
    Timeout(Option<Duration>),

    /// Target URL is malformed or not allowed
    ///
    /// Use the `kind` field for programmatic matching. The `reason` field contains
    /// a diagnostic message intended for logging only.
    #[error("Invalid URL '{url}': {reason}")]
    InvalidUrl {
        url: String,
        kind: InvalidUrlKind,
        reason: String,
    },

    /// Request is structurally invalid (bad header, body on GET, zero timeout...)
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Non-success status outside the 4xx/5xx classes
    #[error("HTTP {status}: {}", body_preview(.body))]
    HttpStatus {
        status: u16,
        body: Bytes,
        retry_after: Option<Duration>,
    },

    /// 4xx status
    #[error("Client error {status}: {}", body_preview(.body))]
    ClientError {
        status: u16,
        body: Bytes,
        retry_after: Option<Duration>,
    },

    /// 5xx status
    #[error("Server error {status}: {}", body_preview(.body))]
    ServerError {
        status: u16,
        body: Bytes,
        retry_after: Option<Duration>,
    },

    /// Response body could not be decoded
    #[error("Failed to decode response body: {0}")]
    Decode(#[source] CodecError),

    /// Request body could not be encoded
    #[error("Failed to encode request body: {0}")]
    Encode(#[source] CodecError),

    /// TLS or certificate failure
    #[error("Security error: {0}")]
    Security(#[source] BoxError),

    /// The caller cancelled the call
    #[error("Request cancelled")]
    Cancelled,

    /// Response failed an acceptance check
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// Request body exceeds the configured limit
    #[error("Request body too large: limit {limit} bytes, got {actual} bytes")]
    RequestTooLarge { limit: usize, actual: usize },

    /// Response body exceeds the configured limit
    #[error("Response body too large: limit {limit} bytes, got {actual} bytes")]
    ResponseTooLarge { limit: usize, actual: usize },

    /// Anything the pipeline could not classify
    #[error("Unknown error: {0}")]
    Unknown(#[source] BoxError),
}

#[allow(clippy::ref_option)]
fn timeout_suffix(after: &Option<Duration>) -> String {
    after.map_or_else(String::new, |d| format!(" after {d:?}"))
}

fn body_preview(body: &Bytes) -> Cow<'_, str> {
    String::from_utf8_lossy(&body[..body.len().min(ERROR_BODY_PREVIEW_LIMIT)])
}

impl NetworkError {
    /// Classify a non-success status.
    ///
    /// 400-499 become [`NetworkError::ClientError`], 500-599 become
    /// [`NetworkError::ServerError`], everything else [`NetworkError::HttpStatus`].
    /// The body is truncated to [`ERROR_BODY_PREVIEW_LIMIT`].
    #[must_use]
    pub fn from_status(status: u16, body: Bytes) -> Self {
        let body = if body.len() > ERROR_BODY_PREVIEW_LIMIT {
            body.slice(..ERROR_BODY_PREVIEW_LIMIT)
        } else {
            body
        };
        match status {
            400..=499 => Self::ClientError {
                status,
                body,
                retry_after: None,
            },
            500..=599 => Self::ServerError {
                status,
                body,
                retry_after: None,
            },
            _ => Self::HttpStatus {
                status,
                body,
                retry_after: None,
            },
        }
    }

    /// Attach a parsed `Retry-After` delay to a status-class error.
    ///
    /// Other variants are returned unchanged.
    #[must_use]
    pub fn with_retry_after(mut self, delay: Option<Duration>) -> Self {
        if let Self::HttpStatus { retry_after, .. }
        | Self::ClientError { retry_after, .. }
        | Self::ServerError { retry_after, .. } = &mut self
        {
            *retry_after = delay;
        }
        self
    }

    /// Whether the failure is transient and worth another attempt.
    ///
    /// True for connectivity loss, timeouts, 5xx, and 408/429 statuses.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::ConnectivityLost(_) | Self::Timeout(_) | Self::ServerError { .. } => true,
            Self::HttpStatus { status, .. } | Self::ClientError { status, .. } => {
                matches!(status, 408 | 429)
            }
            _ => false,
        }
    }

    #[must_use]
    pub fn is_client_error(&self) -> bool {
        self.status_code().is_some_and(|s| (400..500).contains(&s))
    }

    #[must_use]
    pub fn is_server_error(&self) -> bool {
        self.status_code().is_some_and(|s| (500..600).contains(&s))
    }

    /// HTTP status of status-class errors.
    #[must_use]
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::HttpStatus { status, .. }
            | Self::ClientError { status, .. }
            | Self::ServerError { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Body preview of status-class errors.
    #[must_use]
    pub fn response_body(&self) -> Option<&Bytes> {
        match self {
            Self::HttpStatus { body, .. }
            | Self::ClientError { body, .. }
            | Self::ServerError { body, .. } => Some(body),
            _ => None,
        }
    }

    /// Server-requested delay of status-class errors.
    #[must_use]
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::HttpStatus { retry_after, .. }
            | Self::ClientError { retry_after, .. }
            | Self::ServerError { retry_after, .. } => *retry_after,
            _ => None,
        }
    }

    /// Short stable name of the variant, used as a metrics and log label.
    #[must_use]
    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::ConnectivityLost(_) => "connectivity_lost",
            Self::Timeout(_) => "timeout",
            Self::InvalidUrl { .. } => "invalid_url",
            Self::InvalidRequest(_) => "invalid_request",
            Self::HttpStatus { .. } => "http_error",
            Self::ClientError { .. } => "client_error",
            Self::ServerError { .. } => "server_error",
            Self::Decode(_) => "decode_error",
            Self::Encode(_) => "encode_error",
            Self::Security(_) => "security_error",
            Self::Cancelled => "cancelled",
            Self::InvalidResponse(_) => "invalid_response",
            Self::RequestTooLarge { .. } => "request_too_large",
            Self::ResponseTooLarge { .. } => "response_too_large",
            Self::Unknown(_) => "unknown",
        }
    }

    pub(crate) fn invalid_url(
        url: impl Into<String>,
        kind: InvalidUrlKind,
        reason: impl Into<String>,
    ) -> Self {
        Self::InvalidUrl {
            url: url.into(),
            kind,
            reason: reason.into(),
        }
    }
}

/// What went wrong inside a [`crate::Transport`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum TransportErrorKind {
    /// No route to the peer (refused, DNS failure, unreachable)
    NotConnected,
    /// Connection dropped mid-exchange
    ConnectionLost,
    /// Transport-level deadline exceeded
    TimedOut,
    /// The exchange was cancelled
    Cancelled,
    /// TLS handshake or certificate failure
    Tls,
    /// Response body exceeded the transport's limit
    BodyTooLarge { limit: usize, actual: usize },
    /// Anything else
    Other,
}

/// Failure reported by a [`crate::Transport`] implementation.
#[derive(Error, Debug)]
#[error("transport failure ({kind:?}): {source}")]
pub struct TransportError {
    kind: TransportErrorKind,
    #[source]
    source: BoxError,
}

impl TransportError {
    #[must_use]
    pub fn new(kind: TransportErrorKind, source: impl Into<BoxError>) -> Self {
        Self {
            kind,
            source: source.into(),
        }
    }

    #[must_use]
    pub fn kind(&self) -> TransportErrorKind {
        self.kind
    }

    #[must_use]
    pub fn into_source(self) -> BoxError {
        self.source
    }
}

impl From<TransportError> for NetworkError {
    fn from(err: TransportError) -> Self {
        match err.kind {
            TransportErrorKind::NotConnected | TransportErrorKind::ConnectionLost => {
                Self::ConnectivityLost(err.source)
            }
            TransportErrorKind::TimedOut => Self::Timeout(None),
            TransportErrorKind::Cancelled => Self::Cancelled,
            TransportErrorKind::Tls => Self::Security(err.source),
            TransportErrorKind::BodyTooLarge { limit, actual } => {
                Self::ResponseTooLarge { limit, actual }
            }
            TransportErrorKind::Other => Self::Unknown(err.source),
        }
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use std::error::Error;
    use std::fmt;

    #[derive(Debug)]
    struct TestError(&'static str);

    impl fmt::Display for TestError {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "{}", self.0)
        }
    }

    impl Error for TestError {}

    #[test]
    fn test_from_status_classifies_ranges() {
        assert!(matches!(
            NetworkError::from_status(404, Bytes::new()),
            NetworkError::ClientError { status: 404, .. }
        ));
        assert!(matches!(
            NetworkError::from_status(503, Bytes::new()),
            NetworkError::ServerError { status: 503, .. }
        ));
        assert!(matches!(
            NetworkError::from_status(302, Bytes::new()),
            NetworkError::HttpStatus { status: 302, .. }
        ));
        assert!(matches!(
            NetworkError::from_status(600, Bytes::new()),
            NetworkError::HttpStatus { status: 600, .. }
        ));
    }

    #[test]
    fn test_from_status_truncates_body() {
        let body = Bytes::from(vec![b'x'; ERROR_BODY_PREVIEW_LIMIT * 2]);
        let err = NetworkError::from_status(500, body);
        assert_eq!(err.response_body().map(Bytes::len), Some(ERROR_BODY_PREVIEW_LIMIT));
    }

    #[test]
    fn test_retryable_classification() {
        let retryable = [
            NetworkError::ConnectivityLost(Box::new(TestError("reset"))),
            NetworkError::Timeout(Some(Duration::from_secs(1))),
            NetworkError::from_status(500, Bytes::new()),
            NetworkError::from_status(599, Bytes::new()),
            NetworkError::from_status(429, Bytes::new()),
            NetworkError::from_status(408, Bytes::new()),
        ];
        for err in &retryable {
            assert!(err.is_retryable(), "{err} should be retryable");
        }

        let terminal = [
            NetworkError::from_status(400, Bytes::new()),
            NetworkError::from_status(404, Bytes::new()),
            NetworkError::HttpStatus {
                status: 304,
                body: Bytes::new(),
                retry_after: None,
            },
            NetworkError::InvalidRequest("body on GET".to_owned()),
            NetworkError::Cancelled,
            NetworkError::Security(Box::new(TestError("bad cert"))),
            NetworkError::Unknown(Box::new(TestError("?"))),
            NetworkError::ResponseTooLarge {
                limit: 1,
                actual: 2,
            },
        ];
        for err in &terminal {
            assert!(!err.is_retryable(), "{err} should not be retryable");
        }
    }

    #[test]
    fn test_status_predicates() {
        let err = NetworkError::from_status(418, Bytes::from_static(b"teapot"));
        assert!(err.is_client_error());
        assert!(!err.is_server_error());
        assert_eq!(err.status_code(), Some(418));
        assert_eq!(err.response_body().map(|b| &b[..]), Some(&b"teapot"[..]));

        assert_eq!(NetworkError::Cancelled.status_code(), None);
        assert!(NetworkError::Cancelled.response_body().is_none());
    }

    #[test]
    fn test_with_retry_after_only_touches_status_errors() {
        let err = NetworkError::from_status(429, Bytes::new())
            .with_retry_after(Some(Duration::from_secs(7)));
        assert_eq!(err.retry_after(), Some(Duration::from_secs(7)));

        let err = NetworkError::Cancelled.with_retry_after(Some(Duration::from_secs(7)));
        assert_eq!(err.retry_after(), None);
    }

    #[test]
    fn test_display_includes_body_preview() {
        let err = NetworkError::from_status(502, Bytes::from_static(b"upstream down"));
        assert_eq!(err.to_string(), "Server error 502: upstream down");

        let err = NetworkError::Timeout(Some(Duration::from_secs(1)));
        assert_eq!(err.to_string(), "Request timed out after 1s");
        assert_eq!(NetworkError::Timeout(None).to_string(), "Request timed out");
    }

    #[test]
    fn test_transport_error_mapping_preserves_source() {
        let cases = [
            (TransportErrorKind::NotConnected, "connectivity_lost"),
            (TransportErrorKind::ConnectionLost, "connectivity_lost"),
            (TransportErrorKind::TimedOut, "timeout"),
            (TransportErrorKind::Cancelled, "cancelled"),
            (TransportErrorKind::Tls, "security_error"),
            (TransportErrorKind::Other, "unknown"),
        ];
        for (kind, expected) in cases {
            let err: NetworkError = TransportError::new(kind, TestError("cause")).into();
            assert_eq!(err.kind_name(), expected, "{kind:?}");
        }

        let err: NetworkError =
            TransportError::new(TransportErrorKind::ConnectionLost, TestError("reset")).into();
        let source = err.source().map(ToString::to_string);
        assert_eq!(source.as_deref(), Some("reset"));
    }

    #[test]
    fn test_transport_body_too_large_maps_to_response_too_large() {
        let err: NetworkError = TransportError::new(
            TransportErrorKind::BodyTooLarge {
                limit: 10,
                actual: 12,
            },
            TestError("limit"),
        )
        .into();
        assert!(matches!(
            err,
            NetworkError::ResponseTooLarge {
                limit: 10,
                actual: 12
            }
        ));
    }
}
