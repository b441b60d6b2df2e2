//! Post-receipt response acceptance checks.
//!
//! The pipeline runs the configured validator after the response interceptor
//! chain. A failure becomes the attempt's error and goes through the retry
//! decision like a transport failure would: a 503 rejected by
//! [`StatusValidator`] is retried, a content-type mismatch is not.

use crate::error::NetworkError;
use crate::response::Response;
use http::header::HeaderName;
use std::fmt;
use std::ops::RangeInclusive;
use std::sync::Arc;

/// Inspects a response and accepts or rejects it.
pub trait ResponseValidator: Send + Sync {
    /// # Errors
    /// Returns the [`NetworkError`] describing why the response is unacceptable.
    fn validate(&self, response: &Response) -> Result<(), NetworkError>;
}

/// Ordered composite; the first failing member wins.
#[derive(Clone, Default)]
pub struct ValidatorChain {
    validators: Vec<Arc<dyn ResponseValidator>>,
}

impl ValidatorChain {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, validator: Arc<dyn ResponseValidator>) {
        self.validators.push(validator);
    }

    #[must_use]
    pub fn with(mut self, validator: impl ResponseValidator + 'static) -> Self {
        self.push(Arc::new(validator));
        self
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.validators.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.validators.is_empty()
    }
}

impl ResponseValidator for ValidatorChain {
    fn validate(&self, response: &Response) -> Result<(), NetworkError> {
        self.validators
            .iter()
            .try_for_each(|validator| validator.validate(response))
    }
}

/// Accepts only listed status codes or ranges.
///
/// Rejections are status-class errors (`client-error`, `server-error` or
/// `http-error`) carrying the body preview and any `Retry-After`.
#[derive(Debug, Clone)]
pub struct StatusValidator {
    accepted: Vec<RangeInclusive<u16>>,
}

impl Default for StatusValidator {
    fn default() -> Self {
        Self::success()
    }
}

impl StatusValidator {
    /// 200-299
    #[must_use]
    pub fn success() -> Self {
        Self::range(200..=299)
    }

    #[must_use]
    pub fn range(range: RangeInclusive<u16>) -> Self {
        Self {
            accepted: vec![range],
        }
    }

    #[must_use]
    pub fn codes(codes: impl IntoIterator<Item = u16>) -> Self {
        Self {
            accepted: codes.into_iter().map(|c| c..=c).collect(),
        }
    }

    /// Accept an additional code.
    #[must_use]
    pub fn or_code(mut self, code: u16) -> Self {
        self.accepted.push(code..=code);
        self
    }

    #[must_use]
    pub fn accepts(&self, status: u16) -> bool {
        self.accepted.iter().any(|range| range.contains(&status))
    }
}

impl ResponseValidator for StatusValidator {
    fn validate(&self, response: &Response) -> Result<(), NetworkError> {
        if self.accepts(response.status()) {
            Ok(())
        } else {
            Err(response.status_error())
        }
    }
}

/// Requires the `Content-Type` to start with one of the given prefixes
/// (case-insensitive).
#[derive(Debug, Clone)]
pub struct ContentTypeValidator {
    prefixes: Vec<String>,
}

impl ContentTypeValidator {
    #[must_use]
    pub fn new<I, S>(prefixes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            prefixes: prefixes
                .into_iter()
                .map(|p| p.into().to_ascii_lowercase())
                .collect(),
        }
    }

    #[must_use]
    pub fn json() -> Self {
        Self::new(["application/json"])
    }
}

impl ResponseValidator for ContentTypeValidator {
    fn validate(&self, response: &Response) -> Result<(), NetworkError> {
        let Some(content_type) = response.content_type() else {
            return Err(NetworkError::InvalidResponse(
                "missing Content-Type header".to_owned(),
            ));
        };
        let normalized = content_type.trim().to_ascii_lowercase();
        if self.prefixes.iter().any(|p| normalized.starts_with(p)) {
            Ok(())
        } else {
            Err(NetworkError::InvalidResponse(format!(
                "unexpected Content-Type '{content_type}', expected one of {:?}",
                self.prefixes
            )))
        }
    }
}

/// Requires the body length to fall within `[min, max]` bytes.
#[derive(Debug, Clone, Copy)]
pub struct SizeValidator {
    min: usize,
    max: usize,
}

impl SizeValidator {
    #[must_use]
    pub fn new(min: usize, max: usize) -> Self {
        Self { min, max }
    }

    #[must_use]
    pub fn max(max: usize) -> Self {
        Self { min: 0, max }
    }
}

impl ResponseValidator for SizeValidator {
    fn validate(&self, response: &Response) -> Result<(), NetworkError> {
        let len = response.body().len();
        if len > self.max {
            return Err(NetworkError::ResponseTooLarge {
                limit: self.max,
                actual: len,
            });
        }
        if len < self.min {
            return Err(NetworkError::InvalidResponse(format!(
                "response body is {len} bytes, expected at least {}",
                self.min
            )));
        }
        Ok(())
    }
}

/// Requires every listed header to be present.
#[derive(Debug, Clone)]
pub struct RequiredHeadersValidator {
    names: Vec<HeaderName>,
}

impl RequiredHeadersValidator {
    #[must_use]
    pub fn new(names: impl IntoIterator<Item = HeaderName>) -> Self {
        Self {
            names: names.into_iter().collect(),
        }
    }
}

impl ResponseValidator for RequiredHeadersValidator {
    fn validate(&self, response: &Response) -> Result<(), NetworkError> {
        match self
            .names
            .iter()
            .find(|name| !response.headers().contains_key(*name))
        {
            Some(missing) => Err(NetworkError::InvalidResponse(format!(
                "missing required header '{missing}'"
            ))),
            None => Ok(()),
        }
    }
}

type BodyPredicate = Arc<dyn Fn(&[u8]) -> bool + Send + Sync>;

/// Checks the body with a predicate.
#[derive(Clone)]
pub struct BodyValidator {
    description: String,
    predicate: BodyPredicate,
}

impl BodyValidator {
    /// Custom predicate; `description` appears in the error message.
    #[must_use]
    pub fn new<F>(description: impl Into<String>, predicate: F) -> Self
    where
        F: Fn(&[u8]) -> bool + Send + Sync + 'static,
    {
        Self {
            description: description.into(),
            predicate: Arc::new(predicate),
        }
    }

    #[must_use]
    pub fn non_empty() -> Self {
        Self::new("body must not be empty", |body| !body.is_empty())
    }

    #[must_use]
    pub fn json() -> Self {
        Self::new("body must be valid JSON", |body| {
            serde_json::from_slice::<serde::de::IgnoredAny>(body).is_ok()
        })
    }

    #[must_use]
    pub fn utf8() -> Self {
        Self::new("body must be valid UTF-8", |body| {
            std::str::from_utf8(body).is_ok()
        })
    }
}

impl fmt::Debug for BodyValidator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BodyValidator")
            .field("description", &self.description)
            .finish_non_exhaustive()
    }
}

impl ResponseValidator for BodyValidator {
    fn validate(&self, response: &Response) -> Result<(), NetworkError> {
        if (self.predicate)(response.body()) {
            Ok(())
        } else {
            Err(NetworkError::InvalidResponse(self.description.clone()))
        }
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use bytes::Bytes;
    use http::HeaderMap;
    use http::header::{CONTENT_TYPE, HeaderValue};
    use std::time::Duration;

    fn response(status: u16, content_type: Option<&'static str>, body: &'static [u8]) -> Response {
        let mut headers = HeaderMap::new();
        if let Some(ct) = content_type {
            headers.insert(CONTENT_TYPE, HeaderValue::from_static(ct));
        }
        Response::new(status, headers, Bytes::from_static(body), Duration::ZERO)
    }

    #[test]
    fn test_status_validator_default_success_range() {
        let validator = StatusValidator::default();
        assert!(validator.validate(&response(200, None, b"")).is_ok());
        assert!(validator.validate(&response(299, None, b"")).is_ok());
        assert!(matches!(
            validator.validate(&response(404, None, b"nope")),
            Err(NetworkError::ClientError { status: 404, .. })
        ));
        assert!(matches!(
            validator.validate(&response(503, None, b"")),
            Err(NetworkError::ServerError { status: 503, .. })
        ));
    }

    #[test]
    fn test_status_validator_custom_codes() {
        let validator = StatusValidator::codes([200, 404]).or_code(410);
        assert!(validator.validate(&response(404, None, b"")).is_ok());
        assert!(validator.validate(&response(410, None, b"")).is_ok());
        assert!(validator.validate(&response(201, None, b"")).is_err());
    }

    #[test]
    fn test_content_type_validator() {
        let validator = ContentTypeValidator::json();
        assert!(
            validator
                .validate(&response(200, Some("Application/JSON; charset=utf-8"), b"{}"))
                .is_ok()
        );
        assert!(matches!(
            validator.validate(&response(200, Some("text/html"), b"")),
            Err(NetworkError::InvalidResponse(_))
        ));
        assert!(matches!(
            validator.validate(&response(200, None, b"")),
            Err(NetworkError::InvalidResponse(_))
        ));
    }

    #[test]
    fn test_size_validator() {
        let validator = SizeValidator::new(2, 4);
        assert!(validator.validate(&response(200, None, b"abc")).is_ok());
        assert!(matches!(
            validator.validate(&response(200, None, b"abcdef")),
            Err(NetworkError::ResponseTooLarge { limit: 4, actual: 6 })
        ));
        assert!(matches!(
            validator.validate(&response(200, None, b"a")),
            Err(NetworkError::InvalidResponse(_))
        ));
    }

    #[test]
    fn test_required_headers_validator() {
        let validator = RequiredHeadersValidator::new([CONTENT_TYPE]);
        assert!(validator.validate(&response(200, Some("text/plain"), b"")).is_ok());
        assert!(matches!(
            validator.validate(&response(200, None, b"")),
            Err(NetworkError::InvalidResponse(_))
        ));
    }

    #[test]
    fn test_body_validators() {
        assert!(BodyValidator::non_empty().validate(&response(200, None, b"")).is_err());
        assert!(BodyValidator::json().validate(&response(200, None, br#"{"a":[1]}"#)).is_ok());
        assert!(BodyValidator::json().validate(&response(200, None, b"{oops")).is_err());
        assert!(BodyValidator::utf8().validate(&response(200, None, b"\xff\xfe")).is_err());

        let custom = BodyValidator::new("must mention ok", |b| b.windows(2).any(|w| w == b"ok"));
        assert!(custom.validate(&response(200, None, b"all ok")).is_ok());
    }

    #[test]
    fn test_chain_first_failure_wins() {
        let chain = ValidatorChain::new()
            .with(StatusValidator::success())
            .with(ContentTypeValidator::json())
            .with(SizeValidator::max(1));
        assert_eq!(chain.len(), 3);

        let err = chain
            .validate(&response(500, Some("text/html"), b"long body"))
            .unwrap_err();
        assert!(matches!(err, NetworkError::ServerError { .. }));

        let err = chain
            .validate(&response(200, Some("text/html"), b"long body"))
            .unwrap_err();
        assert!(matches!(err, NetworkError::InvalidResponse(_)));

        assert!(ValidatorChain::new().validate(&response(500, None, b"")).is_ok());
    }
}
