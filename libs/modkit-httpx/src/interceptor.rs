//! Request/response hooks for the one-shot [`crate::call`] helpers
//!
//! Interceptors see fully buffered messages, so reading the body never
//! consumes it. They are a lighter alternative to transport wrappers: they
//! inspect or stamp a message but never own the send itself.

use crate::config::CONTENT_TYPE_JSON;
use crate::error::{ConfigError, ExpectedStatus, HttpError};
use bytes::Bytes;
use http::header::CONTENT_TYPE;
use http::{HeaderValue, Request, Response};
use std::sync::Arc;

/// Inspects or mutates a request before it is sent.
pub trait RequestInterceptor: Send + Sync {
    /// # Errors
    /// An error aborts the call before anything is sent.
    fn intercept(&self, req: &mut Request<Bytes>) -> Result<(), HttpError>;
}

/// Inspects a response after its body has been buffered.
pub trait ResponseInterceptor: Send + Sync {
    /// # Errors
    /// An error aborts the call before the body is decoded.
    fn intercept(&self, resp: &Response<Bytes>) -> Result<(), HttpError>;
}

pub type SharedRequestInterceptor = Arc<dyn RequestInterceptor>;
pub type SharedResponseInterceptor = Arc<dyn ResponseInterceptor>;

impl<F> RequestInterceptor for F
where
    F: Fn(&mut Request<Bytes>) -> Result<(), HttpError> + Send + Sync,
{
    fn intercept(&self, req: &mut Request<Bytes>) -> Result<(), HttpError> {
        self(req)
    }
}

impl<F> ResponseInterceptor for F
where
    F: Fn(&Response<Bytes>) -> Result<(), HttpError> + Send + Sync,
{
    fn intercept(&self, resp: &Response<Bytes>) -> Result<(), HttpError> {
        self(resp)
    }
}

/// Sets `Content-Type`, replacing any existing value.
#[derive(Debug, Clone)]
pub struct ContentTypeInterceptor {
    value: HeaderValue,
}

impl ContentTypeInterceptor {
    /// # Errors
    /// Returns `ConfigError::InvalidHeaderValue` if `content_type` is not a
    /// valid header value.
    pub fn new(content_type: &str) -> Result<Self, ConfigError> {
        let value =
            HeaderValue::from_str(content_type).map_err(|_| ConfigError::InvalidHeaderValue {
                name: CONTENT_TYPE.as_str().to_owned(),
            })?;
        Ok(Self { value })
    }

    #[must_use]
    pub fn json() -> Self {
        Self {
            value: HeaderValue::from_static(CONTENT_TYPE_JSON),
        }
    }
}

impl RequestInterceptor for ContentTypeInterceptor {
    fn intercept(&self, req: &mut Request<Bytes>) -> Result<(), HttpError> {
        req.headers_mut().insert(CONTENT_TYPE, self.value.clone());
        Ok(())
    }
}

/// Logs "do http req" with the method, URL and body.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingRequestInterceptor;

impl RequestInterceptor for LoggingRequestInterceptor {
    fn intercept(&self, req: &mut Request<Bytes>) -> Result<(), HttpError> {
        tracing::info!(
            method = %req.method(),
            url = %req.uri(),
            req_data = %String::from_utf8_lossy(req.body()),
            "do http req"
        );
        Ok(())
    }
}

/// Logs "got http resp" with the status and body.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingResponseInterceptor;

impl ResponseInterceptor for LoggingResponseInterceptor {
    fn intercept(&self, resp: &Response<Bytes>) -> Result<(), HttpError> {
        tracing::info!(
            status_code = resp.status().as_u16(),
            resp_data = %String::from_utf8_lossy(resp.body()),
            "got http resp"
        );
        Ok(())
    }
}

/// Accepts exactly one status code.
#[derive(Debug, Clone, Copy)]
pub struct ExpectStatus(pub u16);

impl ResponseInterceptor for ExpectStatus {
    fn intercept(&self, resp: &Response<Bytes>) -> Result<(), HttpError> {
        check_status(&ExpectedStatus::Codes(vec![self.0]), resp)
    }
}

/// Accepts any status in `start..=end`.
#[derive(Debug, Clone, Copy)]
pub struct ExpectStatusRange {
    pub start: u16,
    pub end: u16,
}

impl ExpectStatusRange {
    #[must_use]
    pub fn new(start: u16, end: u16) -> Self {
        Self { start, end }
    }
}

impl ResponseInterceptor for ExpectStatusRange {
    fn intercept(&self, resp: &Response<Bytes>) -> Result<(), HttpError> {
        check_status(
            &ExpectedStatus::Range {
                start: self.start,
                end: self.end,
            },
            resp,
        )
    }
}

fn check_status(expected: &ExpectedStatus, resp: &Response<Bytes>) -> Result<(), HttpError> {
    if expected.matches(resp.status().as_u16()) {
        Ok(())
    } else {
        Err(HttpError::UnexpectedStatus {
            expected: expected.clone(),
            got: resp.status(),
        })
    }
}

/// Runs request interceptors in order, stopping at the first error.
#[derive(Clone, Default)]
pub struct ChainedRequestInterceptor {
    interceptors: Vec<SharedRequestInterceptor>,
}

impl ChainedRequestInterceptor {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with(mut self, interceptor: impl RequestInterceptor + 'static) -> Self {
        self.interceptors.push(Arc::new(interceptor));
        self
    }
}

impl RequestInterceptor for ChainedRequestInterceptor {
    fn intercept(&self, req: &mut Request<Bytes>) -> Result<(), HttpError> {
        self.interceptors.iter().try_for_each(|i| i.intercept(req))
    }
}

/// Runs response interceptors in order, stopping at the first error.
#[derive(Clone, Default)]
pub struct ChainedResponseInterceptor {
    interceptors: Vec<SharedResponseInterceptor>,
}

impl ChainedResponseInterceptor {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with(mut self, interceptor: impl ResponseInterceptor + 'static) -> Self {
        self.interceptors.push(Arc::new(interceptor));
        self
    }
}

impl ResponseInterceptor for ChainedResponseInterceptor {
    fn intercept(&self, resp: &Response<Bytes>) -> Result<(), HttpError> {
        self.interceptors.iter().try_for_each(|i| i.intercept(resp))
    }
}
