use super::RequestInterceptor;
use crate::error::NetworkError;
use crate::request::Request;
use async_trait::async_trait;
use http::header::{AUTHORIZATION, HeaderName, HeaderValue};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use zeroize::Zeroizing;

/// Bearer token plus optional expiry.
///
/// The secret is wiped from memory on drop and redacted from `Debug`.
#[derive(Clone)]
pub struct AccessToken {
    secret: Zeroizing<String>,
    expires_at: Option<Instant>,
}

impl AccessToken {
    /// Token that never expires.
    #[must_use]
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: Zeroizing::new(secret.into()),
            expires_at: None,
        }
    }

    /// Token valid for `ttl` from now.
    #[must_use]
    pub fn with_ttl(secret: impl Into<String>, ttl: Duration) -> Self {
        Self {
            secret: Zeroizing::new(secret.into()),
            expires_at: Some(Instant::now() + ttl),
        }
    }

    /// Provide read-only access to the underlying secret.
    ///
    /// Callers must not log, store, or otherwise persist the returned slice.
    #[must_use]
    pub fn expose(&self) -> &str {
        &self.secret
    }

    fn is_fresh(&self, skew: Duration) -> bool {
        self.expires_at
            .is_none_or(|expires_at| Instant::now() + skew < expires_at)
    }
}

impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccessToken")
            .field("secret", &"[REDACTED]")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// Asynchronous provider of bearer tokens (OAuth client, vault, file...).
#[async_trait]
pub trait TokenSource: Send + Sync {
    /// # Errors
    /// The error aborts the call that needed the token.
    async fn fetch_token(&self) -> Result<AccessToken, NetworkError>;
}

/// Injects `Authorization: Bearer <token>` into every request.
///
/// Tokens are cached until shortly before expiry. Concurrent calls that find
/// the cache stale wait on one fetch instead of each hitting the source.
pub struct BearerAuthInterceptor {
    source: Arc<dyn TokenSource>,
    cached: Mutex<Option<AccessToken>>,
    header_name: HeaderName,
    refresh_skew: Duration,
}

impl BearerAuthInterceptor {
    /// Refresh tokens this long before they expire.
    pub const DEFAULT_REFRESH_SKEW: Duration = Duration::from_secs(30);

    #[must_use]
    pub fn new(source: impl TokenSource + 'static) -> Self {
        Self::from_arc(Arc::new(source))
    }

    #[must_use]
    pub fn from_arc(source: Arc<dyn TokenSource>) -> Self {
        Self {
            source,
            cached: Mutex::new(None),
            header_name: AUTHORIZATION,
            refresh_skew: Self::DEFAULT_REFRESH_SKEW,
        }
    }

    /// Inject `<header_name>: Bearer <token>` instead of `Authorization`.
    #[must_use]
    pub fn with_header_name(mut self, header_name: HeaderName) -> Self {
        self.header_name = header_name;
        self
    }

    #[must_use]
    pub fn with_refresh_skew(mut self, skew: Duration) -> Self {
        self.refresh_skew = skew;
        self
    }

    /// Drop the cached token; the next request fetches a new one.
    pub async fn invalidate(&self) {
        *self.cached.lock().await = None;
    }

    async fn current_token(&self) -> Result<AccessToken, NetworkError> {
        let mut cached = self.cached.lock().await;
        if let Some(token) = cached.as_ref().filter(|t| t.is_fresh(self.refresh_skew)) {
            return Ok(token.clone());
        }

        let token = self.source.fetch_token().await?;
        tracing::debug!(has_expiry = token.expires_at.is_some(), "fetched bearer token");
        *cached = Some(token.clone());
        Ok(token)
    }
}

impl fmt::Debug for BearerAuthInterceptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BearerAuthInterceptor")
            .field("header_name", &self.header_name)
            .field("refresh_skew", &self.refresh_skew)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl RequestInterceptor for BearerAuthInterceptor {
    async fn intercept(&self, request: Request) -> Result<Request, NetworkError> {
        let token = self.current_token().await?;

        let raw = Zeroizing::new(format!("Bearer {}", token.expose()));
        let mut value = HeaderValue::from_str(&raw).map_err(|_| {
            NetworkError::InvalidRequest("bearer token is not a valid header value".to_owned())
        })?;
        value.set_sensitive(true);

        Ok(request.with_header(self.header_name.clone(), value))
    }
}
