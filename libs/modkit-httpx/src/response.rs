use crate::body::{HttpBody, collect_body};
use crate::codec::{JsonCodec, SharedCodec, decode_value};
use crate::error::HttpError;
use bytes::Bytes;
use http::{HeaderMap, Response, StatusCode};
use serde::de::DeserializeOwned;
use std::fmt;

/// HTTP response wrapper with body-reading helpers
///
/// Status validation happens in the transport stack, so every body reader
/// here only reads and decodes:
/// - `resp.bytes().await?` - Read raw bytes
/// - `resp.text().await?` - Read a UTF-8 string
/// - `resp.decode::<T>().await?` - Decode with the request's codec
/// - `resp.json::<T>().await?` - Decode as plain JSON
pub struct HttpResponse {
    inner: Response<HttpBody>,
    codec: SharedCodec,
}

impl fmt::Debug for HttpResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpResponse")
            .field("status", &self.inner.status())
            .field("headers", self.inner.headers())
            .finish_non_exhaustive()
    }
}

impl HttpResponse {
    pub(crate) fn new(inner: Response<HttpBody>, codec: SharedCodec) -> Self {
        Self { inner, codec }
    }

    /// Get the response status code
    #[must_use]
    pub fn status(&self) -> StatusCode {
        self.inner.status()
    }

    /// Get the response headers
    #[must_use]
    pub fn headers(&self) -> &HeaderMap {
        self.inner.headers()
    }

    /// Consume the wrapper and return the inner response with boxed body
    #[must_use]
    pub fn into_inner(self) -> Response<HttpBody> {
        self.inner
    }

    /// Read the whole body
    ///
    /// # Errors
    ///
    /// Returns `HttpError::Transport` if the body stream fails.
    pub async fn bytes(self) -> Result<Bytes, HttpError> {
        collect_body(self.inner.into_body())
            .await
            .map_err(HttpError::Transport)
    }

    /// Read the whole body as text, replacing invalid UTF-8 sequences
    ///
    /// # Errors
    ///
    /// Returns `HttpError::Transport` if the body stream fails.
    pub async fn text(self) -> Result<String, HttpError> {
        let bytes = self.bytes().await?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    /// Decode the body with the codec the request was built with
    ///
    /// # Errors
    ///
    /// Returns `HttpError::Transport` if the body stream fails and
    /// `HttpError::Decode` if the codec rejects the bytes.
    pub async fn decode<T: DeserializeOwned>(self) -> Result<T, HttpError> {
        let codec = self.codec.clone();
        let bytes = self.bytes().await?;
        decode_value(codec.as_ref(), &bytes).map_err(HttpError::Decode)
    }

    /// Decode the body as plain JSON regardless of the request's codec
    ///
    /// # Errors
    ///
    /// Returns `HttpError::Transport` if the body stream fails and
    /// `HttpError::Decode` if the JSON does not match `T`.
    pub async fn json<T: DeserializeOwned>(self) -> Result<T, HttpError> {
        let bytes = self.bytes().await?;
        decode_value(&JsonCodec, &bytes).map_err(HttpError::Decode)
    }
}
