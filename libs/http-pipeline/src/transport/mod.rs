//! Network I/O collaborator.
//!
//! The pipeline hands a finalized `http::Request<Bytes>` to a [`Transport`] and
//! gets back a fully buffered `http::Response<Bytes>`. Retries, timeouts,
//! interceptors and validation all live above this seam, so a transport only
//! moves bytes and classifies its own failures.

mod hyper_client;
mod redirect;
mod tls;

pub use hyper_client::HyperTransport;
pub use redirect::RedirectPolicy;

use crate::error::TransportError;
use async_trait::async_trait;
use bytes::Bytes;

/// Performs one HTTP exchange.
#[async_trait]
pub trait Transport: Send + Sync {
    /// # Errors
    /// Returns a [`TransportError`] whose kind tells the pipeline whether the
    /// failure was connectivity, timeout, TLS, body size or something else.
    async fn perform(
        &self,
        request: http::Request<Bytes>,
    ) -> Result<http::Response<Bytes>, TransportError>;
}
