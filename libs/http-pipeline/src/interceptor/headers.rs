use super::RequestInterceptor;
use crate::error::NetworkError;
use crate::request::Request;
use async_trait::async_trait;
use http::header::{HeaderMap, HeaderName, HeaderValue, USER_AGENT};

/// Header carrying the per-call correlation id.
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Adds configured headers to every request that does not already set them.
#[derive(Debug, Clone, Default)]
pub struct DefaultHeadersInterceptor {
    headers: HeaderMap,
}

impl DefaultHeadersInterceptor {
    #[must_use]
    pub fn new(headers: HeaderMap) -> Self {
        Self { headers }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.headers.is_empty()
    }
}

#[async_trait]
impl RequestInterceptor for DefaultHeadersInterceptor {
    async fn intercept(&self, request: Request) -> Result<Request, NetworkError> {
        Ok(request.map_headers(|headers| {
            for name in self.headers.keys() {
                if !headers.contains_key(name) {
                    for value in self.headers.get_all(name) {
                        headers.append(name.clone(), value.clone());
                    }
                }
            }
        }))
    }
}

/// Sets `User-Agent` unless the request already carries one.
#[derive(Debug, Clone)]
pub struct UserAgentInterceptor {
    user_agent: HeaderValue,
}

impl UserAgentInterceptor {
    /// # Errors
    /// Returns [`NetworkError::InvalidRequest`] if the string is not a valid
    /// header value.
    pub fn try_new(user_agent: impl AsRef<str>) -> Result<Self, NetworkError> {
        let user_agent = HeaderValue::from_str(user_agent.as_ref()).map_err(|e| {
            NetworkError::InvalidRequest(format!("invalid user agent: {e}"))
        })?;
        Ok(Self { user_agent })
    }
}

#[async_trait]
impl RequestInterceptor for UserAgentInterceptor {
    async fn intercept(&self, request: Request) -> Result<Request, NetworkError> {
        if request.headers().contains_key(USER_AGENT) {
            return Ok(request);
        }
        Ok(request.with_header(USER_AGENT, self.user_agent.clone()))
    }
}

/// Tags each request with a random UUID v4 correlation id.
///
/// A caller-supplied id is kept. Otherwise every attempt, retries included,
/// gets a fresh id.
#[derive(Debug, Clone)]
pub struct RequestIdInterceptor {
    header: HeaderName,
}

impl Default for RequestIdInterceptor {
    fn default() -> Self {
        Self {
            header: HeaderName::from_static(REQUEST_ID_HEADER),
        }
    }
}

impl RequestIdInterceptor {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_header(header: HeaderName) -> Self {
        Self { header }
    }
}

#[async_trait]
impl RequestInterceptor for RequestIdInterceptor {
    async fn intercept(&self, request: Request) -> Result<Request, NetworkError> {
        if request.headers().contains_key(&self.header) {
            return Ok(request);
        }
        let id = uuid::Uuid::new_v4().to_string();
        let value = HeaderValue::from_str(&id)
            .map_err(|e| NetworkError::InvalidRequest(format!("invalid request id: {e}")))?;
        Ok(request.with_header(self.header.clone(), value))
    }
}
