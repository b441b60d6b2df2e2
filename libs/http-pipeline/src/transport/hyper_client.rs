use super::Transport;
use super::redirect::RedirectPolicy;
use super::tls;
use crate::config::{TlsRootConfig, TransportConfig, TransportSecurity};
use crate::error::{BoxError, NetworkError, TransportError, TransportErrorKind};
use async_trait::async_trait;
use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper_rustls::HttpsConnector;
use hyper_util::client::legacy::Client;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::rt::{TokioExecutor, TokioTimer};
use std::error::Error as StdError;
use std::fmt;
use std::io;
use tower::{ServiceBuilder, ServiceExt};
use tower_http::decompression::{Decompression, DecompressionLayer};
use tower_http::follow_redirect::{FollowRedirect, FollowRedirectLayer};

type HyperClient = Client<HttpsConnector<HttpConnector>, Full<Bytes>>;
type ServiceStack = Decompression<FollowRedirect<HyperClient, RedirectPolicy>>;

/// Default [`Transport`]: pooled hyper client over rustls.
///
/// Stack (outer to inner): decompression, redirect following, hyper client.
/// Bodies are decompressed before the size limit is applied, so a small
/// compressed payload cannot expand past `max_body_size`.
///
/// Cloning is cheap and shares the connection pool.
#[derive(Clone)]
pub struct HyperTransport {
    service: ServiceStack,
    max_body_size: usize,
}

impl fmt::Debug for HyperTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HyperTransport")
            .field("max_body_size", &self.max_body_size)
            .finish_non_exhaustive()
    }
}

impl HyperTransport {
    /// # Errors
    /// Returns [`NetworkError::Security`] if the TLS connector cannot be built,
    /// e.g. `TlsRootConfig::Native` with an empty OS certificate store.
    pub fn new(config: &TransportConfig) -> Result<Self, NetworkError> {
        if config.security == TransportSecurity::AllowInsecureHttp {
            tracing::warn!(
                target: "http_pipeline::security",
                "transport allows plain HTTP; use only for testing with mock servers"
            );
        }

        let https = build_https_connector(config.tls_roots, config.security)?;

        let mut builder = Client::builder(TokioExecutor::new());
        // pool_idle_timeout needs a timer
        builder
            .pool_timer(TokioTimer::new())
            .pool_max_idle_per_host(config.pool_max_idle_per_host)
            .http2_only(false);
        if let Some(idle) = config.pool_idle_timeout {
            builder.pool_idle_timeout(idle);
        }
        let client: HyperClient = builder.build(https);

        let service = ServiceBuilder::new()
            .layer(DecompressionLayer::new())
            .layer(FollowRedirectLayer::with_policy(RedirectPolicy::new(
                config.max_redirects,
            )))
            .service(client);

        Ok(Self {
            service,
            max_body_size: config.max_body_size,
        })
    }
}

#[async_trait]
impl Transport for HyperTransport {
    async fn perform(
        &self,
        request: http::Request<Bytes>,
    ) -> Result<http::Response<Bytes>, TransportError> {
        let response = self
            .service
            .clone()
            .oneshot(request.map(Full::new))
            .await
            .map_err(classify)?;

        let (parts, body) = response.into_parts();
        let body = read_body_limited(body, self.max_body_size).await?;
        Ok(http::Response::from_parts(parts, body))
    }
}

/// Collect a (decompressed) body, failing as soon as it outgrows `limit`.
async fn read_body_limited<B>(body: B, limit: usize) -> Result<Bytes, TransportError>
where
    B: hyper::body::Body<Data = Bytes>,
    B::Error: Into<BoxError>,
{
    let mut collected = Vec::new();
    let mut body = std::pin::pin!(body);

    while let Some(frame) = body.frame().await {
        let frame = frame.map_err(classify)?;
        if let Some(chunk) = frame.data_ref() {
            let actual = collected.len() + chunk.len();
            if actual > limit {
                return Err(TransportError::new(
                    TransportErrorKind::BodyTooLarge { limit, actual },
                    format!("response body exceeds {limit} bytes"),
                ));
            }
            collected.extend_from_slice(chunk);
        }
    }

    Ok(Bytes::from(collected))
}

fn classify(err: impl Into<BoxError>) -> TransportError {
    let err = err.into();
    let kind = classify_kind(&*err);
    TransportError::new(kind, err)
}

/// Walk the source chain for the most specific cause.
fn classify_kind(err: &(dyn StdError + 'static)) -> TransportErrorKind {
    let mut connect_phase = false;
    let mut current = Some(err);

    while let Some(e) = current {
        if e.is::<rustls::Error>() {
            return TransportErrorKind::Tls;
        }
        if let Some(io_err) = e.downcast_ref::<io::Error>() {
            // io::Error::source() skips the wrapped error itself
            if io_err.get_ref().is_some_and(|inner| inner.is::<rustls::Error>()) {
                return TransportErrorKind::Tls;
            }
            if let Some(kind) = classify_io(io_err.kind()) {
                return kind;
            }
        }
        if let Some(hyper_err) = e.downcast_ref::<hyper::Error>() {
            if hyper_err.is_timeout() {
                return TransportErrorKind::TimedOut;
            }
            if hyper_err.is_canceled()
                || hyper_err.is_closed()
                || hyper_err.is_incomplete_message()
            {
                return TransportErrorKind::ConnectionLost;
            }
        }
        if e
            .downcast_ref::<hyper_util::client::legacy::Error>()
            .is_some_and(hyper_util::client::legacy::Error::is_connect)
        {
            connect_phase = true;
        }
        current = e.source();
    }

    // DNS failures surface as plain connect errors
    if connect_phase {
        TransportErrorKind::NotConnected
    } else {
        TransportErrorKind::Other
    }
}

fn classify_io(kind: io::ErrorKind) -> Option<TransportErrorKind> {
    match kind {
        io::ErrorKind::ConnectionRefused
        | io::ErrorKind::NotConnected
        | io::ErrorKind::AddrNotAvailable
        | io::ErrorKind::HostUnreachable
        | io::ErrorKind::NetworkUnreachable => Some(TransportErrorKind::NotConnected),
        io::ErrorKind::ConnectionReset
        | io::ErrorKind::ConnectionAborted
        | io::ErrorKind::BrokenPipe
        | io::ErrorKind::UnexpectedEof => Some(TransportErrorKind::ConnectionLost),
        io::ErrorKind::TimedOut => Some(TransportErrorKind::TimedOut),
        _ => None,
    }
}

/// HTTP/2 is negotiated through ALPN; plain `http://` is only reachable with
/// [`TransportSecurity::AllowInsecureHttp`].
fn build_https_connector(
    tls_roots: TlsRootConfig,
    security: TransportSecurity,
) -> Result<HttpsConnector<HttpConnector>, NetworkError> {
    let builder = match tls_roots {
        TlsRootConfig::WebPki => hyper_rustls::HttpsConnectorBuilder::new()
            .with_provider_and_webpki_roots(tls::crypto_provider())
            .map_err(|e| NetworkError::Security(Box::new(e)))?,
        TlsRootConfig::Native => {
            let client_config =
                tls::native_roots_client_config().map_err(|e| NetworkError::Security(e.into()))?;
            hyper_rustls::HttpsConnectorBuilder::new().with_tls_config(client_config)
        }
    };

    let connector = if security == TransportSecurity::AllowInsecureHttp {
        builder.https_or_http().enable_all_versions().build()
    } else {
        builder.https_only().enable_all_versions().build()
    };
    Ok(connector)
}
