//! Body codecs.
//!
//! A [`Codec`] turns typed values into request bytes and response bytes back
//! into typed values. The pipeline only depends on the trait; [`JsonCodec`] and
//! [`FormCodec`] cover the common content types.

use bytes::Bytes;
use serde::Serialize;
use serde::de::DeserializeOwned;
use thiserror::Error;

/// Failure inside a [`Codec`].
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum CodecError {
    #[error("JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("form encoding: {0}")]
    FormEncode(#[from] serde_urlencoded::ser::Error),

    #[error("form decoding: {0}")]
    FormDecode(#[from] serde_urlencoded::de::Error),

    /// Failure reported by a custom codec
    #[error("{0}")]
    Custom(String),
}

/// Encodes request bodies and decodes response bodies.
pub trait Codec: Send + Sync {
    /// `Content-Type` of encoded bodies.
    fn content_type(&self) -> &'static str;

    /// # Errors
    /// Returns [`CodecError`] if the value cannot be represented.
    fn encode<T: Serialize + ?Sized>(&self, value: &T) -> Result<Bytes, CodecError>;

    /// # Errors
    /// Returns [`CodecError`] if the bytes do not describe a `T`.
    fn decode<T: DeserializeOwned>(&self, bytes: &[u8]) -> Result<T, CodecError>;
}

/// `application/json` via `serde_json`.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl Codec for JsonCodec {
    fn content_type(&self) -> &'static str {
        "application/json"
    }

    fn encode<T: Serialize + ?Sized>(&self, value: &T) -> Result<Bytes, CodecError> {
        Ok(Bytes::from(serde_json::to_vec(value)?))
    }

    fn decode<T: DeserializeOwned>(&self, bytes: &[u8]) -> Result<T, CodecError> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

/// `application/x-www-form-urlencoded` via `serde_urlencoded`.
#[derive(Debug, Clone, Copy, Default)]
pub struct FormCodec;

impl Codec for FormCodec {
    fn content_type(&self) -> &'static str {
        "application/x-www-form-urlencoded"
    }

    fn encode<T: Serialize + ?Sized>(&self, value: &T) -> Result<Bytes, CodecError> {
        Ok(Bytes::from(serde_urlencoded::to_string(value)?))
    }

    fn decode<T: DeserializeOwned>(&self, bytes: &[u8]) -> Result<T, CodecError> {
        Ok(serde_urlencoded::from_bytes(bytes)?)
    }
}
