use crate::codec::{Codec, JsonCodec};
use crate::error::NetworkError;
use bytes::Bytes;
use http::header::{CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue};
use serde::de::DeserializeOwned;
use std::borrow::Cow;
use std::time::{Duration, SystemTime};

/// Parse `Retry-After` header value into a `Duration`.
///
/// Supports two formats per RFC 7231:
/// - Seconds: "120" → 120 seconds
/// - HTTP-date (RFC 1123): "Wed, 21 Oct 2015 07:28:00 GMT" → duration until that time
///
/// Returns `None` if:
/// - Header is missing
/// - Value cannot be parsed as integer or HTTP-date
/// - Parsed duration is negative (time already passed or negative seconds)
#[must_use]
pub fn parse_retry_after(headers: &HeaderMap) -> Option<Duration> {
    let value = headers.get(http::header::RETRY_AFTER)?.to_str().ok()?;
    let trimmed = value.trim();

    if let Ok(seconds) = trimmed.parse::<i64>() {
        if seconds < 0 {
            return None;
        }
        return Some(Duration::from_secs(seconds.cast_unsigned()));
    }

    parse_http_date(trimmed)
}

/// Parse HTTP-date (RFC 1123) and return duration until that time.
/// Returns `None` if the date is in the past or cannot be parsed.
fn parse_http_date(value: &str) -> Option<Duration> {
    let parsed = httpdate::parse_http_date(value).ok()?;
    parsed.duration_since(SystemTime::now()).ok()
}

/// Immutable result of one transport round-trip.
///
/// `Response<Bytes>` is the raw form the pipeline works with; its `value` is
/// the body itself. [`decode`](Response::decode) produces a `Response<U>` that
/// keeps the same bytes, status, headers and duration.
#[derive(Debug, Clone)]
pub struct Response<T = Bytes> {
    status: u16,
    headers: HeaderMap,
    body: Bytes,
    value: Option<T>,
    duration: Duration,
}

impl Response<Bytes> {
    #[must_use]
    pub fn new(status: u16, headers: HeaderMap, body: Bytes, duration: Duration) -> Self {
        Self {
            status,
            headers,
            value: Some(body.clone()),
            body,
            duration,
        }
    }

    /// Build from raw header pairs, silently dropping pairs that are not
    /// valid HTTP header names or values.
    #[must_use]
    pub fn from_raw_parts<I, K, V>(status: u16, headers: I, body: Bytes, duration: Duration) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<[u8]>,
        V: AsRef<[u8]>,
    {
        let mut map = HeaderMap::new();
        for (name, value) in headers {
            if let (Ok(name), Ok(value)) = (
                HeaderName::from_bytes(name.as_ref()),
                HeaderValue::from_bytes(value.as_ref()),
            ) {
                map.append(name, value);
            }
        }
        Self::new(status, map, body, duration)
    }

    #[must_use]
    pub fn from_http(response: http::Response<Bytes>, duration: Duration) -> Self {
        let (parts, body) = response.into_parts();
        Self::new(parts.status.as_u16(), parts.headers, body, duration)
    }

    /// Replace the body (used by response interceptors).
    #[must_use]
    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self.value = Some(self.body.clone());
        self
    }

    #[must_use]
    pub fn with_status(mut self, status: u16) -> Self {
        self.status = status;
        self
    }
}

impl<T> Response<T> {
    #[must_use]
    pub fn status(&self) -> u16 {
        self.status
    }

    #[must_use]
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    #[must_use]
    pub fn body(&self) -> &Bytes {
        &self.body
    }

    /// Decoded value, if any.
    #[must_use]
    pub fn value(&self) -> Option<&T> {
        self.value.as_ref()
    }

    #[must_use]
    pub fn into_value(self) -> Option<T> {
        self.value
    }

    /// Wall-clock duration of the attempt that produced this response.
    #[must_use]
    pub fn duration(&self) -> Duration {
        self.duration
    }

    #[must_use]
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    #[must_use]
    pub fn is_client_error(&self) -> bool {
        (400..500).contains(&self.status)
    }

    #[must_use]
    pub fn is_server_error(&self) -> bool {
        (500..600).contains(&self.status)
    }

    /// First value of a header, if present and valid UTF-8.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    #[must_use]
    pub fn content_type(&self) -> Option<&str> {
        self.headers.get(CONTENT_TYPE).and_then(|v| v.to_str().ok())
    }

    #[must_use]
    pub fn retry_after(&self) -> Option<Duration> {
        parse_retry_after(&self.headers)
    }

    /// Body as text, replacing invalid UTF-8 sequences.
    #[must_use]
    pub fn text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.body)
    }

    /// Replace a header (used by response interceptors).
    #[must_use]
    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// Check the status is in the 2xx range.
    ///
    /// # Errors
    /// Returns the status-class [`NetworkError`] carrying the body preview and
    /// any `Retry-After` delay.
    pub fn validate(&self) -> Result<(), NetworkError> {
        if self.is_success() {
            Ok(())
        } else {
            Err(self.status_error())
        }
    }

    /// Consume the response, turning non-2xx statuses into errors.
    ///
    /// # Errors
    /// Same as [`validate`](Response::validate).
    pub fn error_for_status(self) -> Result<Self, NetworkError> {
        self.validate()?;
        Ok(self)
    }

    /// Decode the body into a new `Response<U>`.
    ///
    /// # Errors
    /// - [`NetworkError::InvalidResponse`] if the body is empty
    /// - [`NetworkError::Decode`] wrapping the codec failure
    pub fn decode<U, C>(&self, codec: &C) -> Result<Response<U>, NetworkError>
    where
        U: DeserializeOwned,
        C: Codec,
    {
        if self.body.is_empty() {
            return Err(NetworkError::InvalidResponse(
                "cannot decode an empty body".to_owned(),
            ));
        }
        let value = codec.decode(&self.body).map_err(NetworkError::Decode)?;
        Ok(Response {
            status: self.status,
            headers: self.headers.clone(),
            body: self.body.clone(),
            value: Some(value),
            duration: self.duration,
        })
    }

    /// Shorthand for [`decode`](Response::decode) with [`JsonCodec`].
    ///
    /// # Errors
    /// Same as [`decode`](Response::decode).
    pub fn json<U: DeserializeOwned>(&self) -> Result<Response<U>, NetworkError> {
        self.decode(&JsonCodec)
    }

    pub(crate) fn status_error(&self) -> NetworkError {
        NetworkError::from_status(self.status, self.body.clone()).with_retry_after(self.retry_after())
    }
}
