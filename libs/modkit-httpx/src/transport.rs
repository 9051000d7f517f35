//! Transports and transport wrappers.
//!
//! A [`Transport`] sends a fully formed request and returns the response.
//! A [`TransportWrapper`] decorates one transport into another; lists of
//! wrappers are folded in order, so the last one applied is the outermost and
//! runs first at call time.

use crate::body::HttpBody;
use crate::config::{
    DEFAULT_RETRY_ATTEMPTS, DEFAULT_TRANSPORT_TIMEOUT, TlsRootConfig, TransportConfig,
    effective_timeout,
};
use crate::error::{ConfigError, HttpError};
use crate::layers::{
    HeaderLayer, JsonContentTypeLayer, LoggingLayer, OtelLayer, RetryLayer, StatusCodeLayer,
};
use crate::tls;
use http::{HeaderMap, HeaderName, HeaderValue, Request, Response};
use http_body_util::BodyExt;
use hyper_util::client::legacy::Client;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::rt::{TokioExecutor, TokioTimer};
use std::fmt;
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tower::timeout::TimeoutLayer;
use tower::util::BoxCloneSyncService;
use tower::{Layer, Service, ServiceBuilder, ServiceExt};

/// Type-erased, cloneable client transport.
pub type Transport = BoxCloneSyncService<Request<HttpBody>, Response<HttpBody>, HttpError>;

type WrapFn = dyn Fn(Transport) -> Transport + Send + Sync;

/// Decorator turning one [`Transport`] into another.
#[derive(Clone)]
pub struct TransportWrapper(Arc<WrapFn>);

impl fmt::Debug for TransportWrapper {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("TransportWrapper").finish_non_exhaustive()
    }
}

impl TransportWrapper {
    pub fn new<F>(wrap: F) -> Self
    where
        F: Fn(Transport) -> Transport + Send + Sync + 'static,
    {
        Self(Arc::new(wrap))
    }

    /// Wrapper applying a tower layer.
    pub fn layer<L>(layer: L) -> Self
    where
        L: Layer<Transport> + Send + Sync + 'static,
        L::Service: Service<Request<HttpBody>, Response = Response<HttpBody>, Error = HttpError>
            + Clone
            + Send
            + Sync
            + 'static,
        <L::Service as Service<Request<HttpBody>>>::Future: Send + 'static,
    {
        Self::new(move |inner| Transport::new(layer.layer(inner)))
    }

    #[must_use]
    pub fn wrap(&self, inner: Transport) -> Transport {
        (self.0)(inner)
    }

    /// Bound the whole inner chain by `timeout`; zero means 10 seconds.
    #[must_use]
    pub fn timeout(timeout: Duration) -> Self {
        let timeout = effective_timeout(timeout);
        Self::new(move |inner| {
            let service = ServiceBuilder::new()
                .layer(TimeoutLayer::new(timeout))
                .service(inner)
                .map_err(move |e: tower::BoxError| map_tower_error(e, timeout));
            Transport::new(service)
        })
    }

    /// Append one header value to every request.
    ///
    /// # Errors
    /// Returns `HttpError::Config` if the name or value is not a valid header.
    pub fn header(name: &str, value: &str) -> Result<Self, HttpError> {
        let header_name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|_| ConfigError::InvalidHeaderName(name.to_owned()))?;
        let header_value = HeaderValue::from_str(value).map_err(|_| {
            ConfigError::InvalidHeaderValue {
                name: name.to_owned(),
            }
        })?;
        let mut headers = HeaderMap::new();
        headers.insert(header_name, header_value);
        Ok(Self::headers(headers))
    }

    /// Append every value in `headers` to every request.
    #[must_use]
    pub fn headers(headers: HeaderMap) -> Self {
        Self::layer(HeaderLayer::new(headers))
    }

    /// Default the request content type to `application/json`.
    #[must_use]
    pub fn json() -> Self {
        Self::layer(JsonContentTypeLayer)
    }

    #[must_use]
    pub fn logging(log_req: bool, log_resp: bool) -> Self {
        Self::layer(LoggingLayer::new(log_req, log_resp))
    }

    /// Open an `outgoing_http` span per call; empty `service_name` means the
    /// process name.
    #[must_use]
    pub fn tracing(service_name: &str) -> Self {
        Self::layer(OtelLayer::new(service_name))
    }

    #[must_use]
    pub fn status_code(code: u16) -> Self {
        Self::status_codes(&[code])
    }

    #[must_use]
    pub fn status_codes(codes: &[u16]) -> Self {
        Self::layer(StatusCodeLayer::new(codes))
    }

    /// Re-send requests answered with 5xx, at most `max_attempts` attempts in total.
    #[must_use]
    pub fn retry(max_attempts: usize) -> Self {
        Self::layer(RetryLayer::new(max_attempts))
    }
}

impl Layer<Transport> for TransportWrapper {
    type Service = Transport;

    fn layer(&self, inner: Transport) -> Self::Service {
        self.wrap(inner)
    }
}

/// Map tower errors to `HttpError` with actual timeout duration
///
/// Attempts to extract an existing `HttpError` from the boxed error before
/// wrapping as `Transport`.
pub(crate) fn map_tower_error(err: tower::BoxError, timeout: Duration) -> HttpError {
    if err.is::<tower::timeout::error::Elapsed>() {
        return HttpError::Timeout(timeout);
    }

    match err.downcast::<HttpError>() {
        Ok(http_err) => *http_err,
        Err(other) => HttpError::Transport(other),
    }
}

/// Apply `wrappers` to `base` in order; the last one ends up outermost.
#[must_use]
pub fn wrap_transport(base: Transport, wrappers: &[TransportWrapper]) -> Transport {
    wrappers
        .iter()
        .fold(base, |inner, wrapper| wrapper.wrap(inner))
}

/// `[status_code(200), json(), logging(true, true), tracing(""), timeout(10s)]`
#[must_use]
pub fn default_transport_wrappers() -> Vec<TransportWrapper> {
    vec![
        TransportWrapper::status_code(crate::config::DEFAULT_EXPECTED_STATUS),
        TransportWrapper::json(),
        TransportWrapper::logging(true, true),
        TransportWrapper::tracing(""),
        TransportWrapper::timeout(DEFAULT_TRANSPORT_TIMEOUT),
    ]
}

#[must_use]
pub fn wrap_default_transport(base: Transport) -> Transport {
    wrap_transport(base, &default_transport_wrappers())
}

fn build_https_connector(
    config: &TransportConfig,
) -> Result<hyper_rustls::HttpsConnector<HttpConnector>, HttpError> {
    let mut http = HttpConnector::new();
    http.enforce_http(false);
    http.set_connect_timeout(Some(config.connect_timeout));
    http.set_keepalive(config.tcp_keepalive);

    let builder = if config.insecure {
        tracing::warn!("TLS certificate verification disabled for this transport");
        let tls_config =
            tls::insecure_client_config().map_err(|e| HttpError::TransportBuild(Box::new(e)))?;
        hyper_rustls::HttpsConnectorBuilder::new().with_tls_config(tls_config)
    } else {
        match config.tls_roots {
            TlsRootConfig::WebPki => hyper_rustls::HttpsConnectorBuilder::new()
                .with_provider_and_webpki_roots(tls::get_crypto_provider())
                .map_err(|e| HttpError::TransportBuild(Box::new(e)))?,
            TlsRootConfig::Native => {
                let tls_config = tls::native_roots_client_config()
                    .map_err(|e| HttpError::TransportBuild(e.into()))?;
                hyper_rustls::HttpsConnectorBuilder::new().with_tls_config(tls_config)
            }
        }
    };

    Ok(builder
        .https_or_http()
        .enable_all_versions()
        .wrap_connector(http))
}

fn box_response<B>(response: Response<B>) -> Response<HttpBody>
where
    B: http_body::Body<Data = bytes::Bytes> + Send + Sync + 'static,
    B::Error: Into<crate::error::BoxError>,
{
    response.map(|body| body.map_err(Into::into).boxed())
}

/// Build a pooled hyper transport from `config` and apply `wrappers`.
///
/// Accepts both `http` and `https` URLs; HTTP/2 is negotiated via ALPN.
///
/// # Errors
/// Returns `HttpError::TransportBuild` if TLS cannot be set up.
pub fn build_transport_with_config(
    config: &TransportConfig,
    wrappers: &[TransportWrapper],
) -> Result<Transport, HttpError> {
    let https = build_https_connector(config)?;

    let mut builder = Client::builder(TokioExecutor::new());
    // pool_timer is required for pool_idle_timeout to take effect
    builder
        .pool_timer(TokioTimer::new())
        .pool_max_idle_per_host(config.pool_max_idle_per_host)
        .pool_idle_timeout(config.pool_idle_timeout);
    let client = builder.build::<_, HttpBody>(https);

    let base = client
        .map_response(box_response)
        .map_err(HttpError::from);

    Ok(wrap_transport(Transport::new(base), wrappers))
}

/// # Errors
/// Returns `HttpError::TransportBuild` if TLS cannot be set up.
pub fn build_transport(wrappers: &[TransportWrapper]) -> Result<Transport, HttpError> {
    build_transport_with_config(&TransportConfig::default(), wrappers)
}

/// Transport that skips server certificate verification.
///
/// # Errors
/// Returns `HttpError::TransportBuild` if TLS cannot be set up.
pub fn build_insecure_transport(wrappers: &[TransportWrapper]) -> Result<Transport, HttpError> {
    build_transport_with_config(&TransportConfig::insecure(), wrappers)
}

/// # Errors
/// Returns `HttpError::TransportBuild` if TLS cannot be set up.
pub fn build_wrapped_transport() -> Result<Transport, HttpError> {
    build_transport(&default_transport_wrappers())
}

/// # Errors
/// Returns `HttpError::TransportBuild` if TLS cannot be set up.
pub fn build_wrapped_insecure_transport() -> Result<Transport, HttpError> {
    build_insecure_transport(&default_transport_wrappers())
}

/// Base transport re-sending 5xx answers, [`DEFAULT_RETRY_ATTEMPTS`] attempts in total.
///
/// # Errors
/// Returns `HttpError::TransportBuild` if TLS cannot be set up.
pub fn build_retriable_transport() -> Result<Transport, HttpError> {
    build_transport(&[TransportWrapper::retry(DEFAULT_RETRY_ATTEMPTS)])
}

static TRANSPORT: OnceLock<Transport> = OnceLock::new();
static INSECURE_TRANSPORT: OnceLock<Transport> = OnceLock::new();
static WRAPPED_TRANSPORT: OnceLock<Transport> = OnceLock::new();
static WRAPPED_INSECURE_TRANSPORT: OnceLock<Transport> = OnceLock::new();
static RETRIABLE_TRANSPORT: OnceLock<Transport> = OnceLock::new();

/// Returns the cached value, building it on first use. A failed build is not
/// cached; concurrent first callers may build twice but all observe one value.
pub(crate) fn shared<T, F>(cell: &'static OnceLock<T>, build: F) -> Result<T, HttpError>
where
    T: Clone,
    F: FnOnce() -> Result<T, HttpError>,
{
    if let Some(value) = cell.get() {
        return Ok(value.clone());
    }
    let built = build()?;
    Ok(cell.get_or_init(|| built).clone())
}

/// Process-wide unwrapped transport, sharing one connection pool.
///
/// # Errors
/// Returns `HttpError::TransportBuild` if TLS cannot be set up.
pub fn transport() -> Result<Transport, HttpError> {
    shared(&TRANSPORT, || build_transport(&[]))
}

/// Process-wide transport without certificate verification.
///
/// # Errors
/// Returns `HttpError::TransportBuild` if TLS cannot be set up.
pub fn insecure_transport() -> Result<Transport, HttpError> {
    shared(&INSECURE_TRANSPORT, || build_insecure_transport(&[]))
}

/// Process-wide transport with the default wrappers.
///
/// # Errors
/// Returns `HttpError::TransportBuild` if TLS cannot be set up.
pub fn wrapped_transport() -> Result<Transport, HttpError> {
    shared(&WRAPPED_TRANSPORT, build_wrapped_transport)
}

/// # Errors
/// Returns `HttpError::TransportBuild` if TLS cannot be set up.
pub fn wrapped_insecure_transport() -> Result<Transport, HttpError> {
    shared(&WRAPPED_INSECURE_TRANSPORT, build_wrapped_insecure_transport)
}

/// Process-wide retrying transport, see [`build_retriable_transport`].
///
/// # Errors
/// Returns `HttpError::TransportBuild` if TLS cannot be set up.
pub fn retriable_transport() -> Result<Transport, HttpError> {
    shared(&RETRIABLE_TRANSPORT, build_retriable_transport)
}
