//! Server-side handlers and handler wrappers
//!
//! A [`Handler`] is a type-erased axum-compatible service; mount it with
//! `Router::route_service` or `Router::fallback_service`. A
//! [`HandlerWrapper`] decorates one handler into another and lists of
//! wrappers fold the same way transport wrappers do: the last one applied
//! is outermost.

mod logging;
mod typed;

pub use logging::{HandlerLoggingLayer, HandlerLoggingService};
pub use typed::{handler, handler_with_max_body_size, json_handler};

use crate::config::{DEFAULT_HANDLER_TIMEOUT, effective_timeout};
use crate::layers::process_name;
use axum::body::Body;
use bytes::Bytes;
use http::{Request, Response, StatusCode};
use std::convert::Infallible;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tower::util::BoxCloneSyncService;
use tower::{Layer, Service, ServiceBuilder, ServiceExt};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use tracing::field::Empty;

/// Type-erased, cloneable inbound handler.
pub type Handler = BoxCloneSyncService<Request<Body>, Response<Body>, Infallible>;

type WrapFn = dyn Fn(Handler) -> Handler + Send + Sync;

/// Decorator turning one [`Handler`] into another.
#[derive(Clone)]
pub struct HandlerWrapper(Arc<WrapFn>);

impl fmt::Debug for HandlerWrapper {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("HandlerWrapper").finish_non_exhaustive()
    }
}

impl HandlerWrapper {
    pub fn new<F>(wrap: F) -> Self
    where
        F: Fn(Handler) -> Handler + Send + Sync + 'static,
    {
        Self(Arc::new(wrap))
    }

    /// Wrapper applying a tower layer.
    pub fn layer<L>(layer: L) -> Self
    where
        L: Layer<Handler> + Send + Sync + 'static,
        L::Service: Service<Request<Body>, Response = Response<Body>, Error = Infallible>
            + Clone
            + Send
            + Sync
            + 'static,
        <L::Service as Service<Request<Body>>>::Future: Send + 'static,
    {
        Self::new(move |inner| Handler::new(layer.layer(inner)))
    }

    #[must_use]
    pub fn wrap(&self, inner: Handler) -> Handler {
        (self.0)(inner)
    }

    /// One "serve http req" event per request, optionally with bodies.
    #[must_use]
    pub fn logging(log_req: bool, log_resp: bool) -> Self {
        Self::layer(HandlerLoggingLayer::new(log_req, log_resp))
    }

    /// Serve every request inside a `serve_http_req` span whose parent comes
    /// from the incoming W3C headers; empty `service_name` means the process
    /// name.
    #[must_use]
    pub fn tracing(service_name: &str) -> Self {
        let service_name: Arc<str> = if service_name.is_empty() {
            process_name().into()
        } else {
            service_name.into()
        };

        Self::new(move |inner| {
            let service_name = Arc::clone(&service_name);
            let trace = TraceLayer::new_for_http()
                .make_span_with(move |req: &Request<Body>| {
                    let span = tracing::info_span!(
                        "serve_http_req",
                        service.name = %service_name,
                        http.method = %req.method(),
                        http.target = %req.uri().path(),
                        otel.kind = "server",
                        http.status_code = Empty,
                        latency_ms = Empty,
                    );
                    crate::otel::set_parent_from_headers(&span, req.headers());
                    span
                })
                .on_response(
                    |resp: &Response<Body>, latency: Duration, span: &tracing::Span| {
                        span.record("http.status_code", resp.status().as_u16());
                        span.record("latency_ms", latency.as_millis());
                    },
                );

            let service = ServiceBuilder::new()
                .layer(trace)
                .service(inner)
                .map_response(|resp| resp.map(Body::new));
            Handler::new(service)
        })
    }

    /// Answer `504 Gateway Timeout` once `timeout` elapses; zero means 10 seconds.
    #[must_use]
    pub fn timeout(timeout: Duration) -> Self {
        Self::layer(TimeoutLayer::with_status_code(
            StatusCode::GATEWAY_TIMEOUT,
            effective_timeout(timeout),
        ))
    }
}

impl Layer<Handler> for HandlerWrapper {
    type Service = Handler;

    fn layer(&self, inner: Handler) -> Self::Service {
        self.wrap(inner)
    }
}

/// Apply `wrappers` to `base` in order; the last one ends up outermost.
#[must_use]
pub fn wrap_handler(base: Handler, wrappers: &[HandlerWrapper]) -> Handler {
    wrappers
        .iter()
        .fold(base, |inner, wrapper| wrapper.wrap(inner))
}

/// `[logging(true, true), tracing(""), timeout(10s)]`
#[must_use]
pub fn default_handler_wrappers() -> Vec<HandlerWrapper> {
    vec![
        HandlerWrapper::logging(true, true),
        HandlerWrapper::tracing(""),
        HandlerWrapper::timeout(DEFAULT_HANDLER_TIMEOUT),
    ]
}

#[must_use]
pub fn wrap_default_handler(base: Handler) -> Handler {
    wrap_handler(base, &default_handler_wrappers())
}

/// Buffer an inbound body of at most `limit` bytes.
///
/// Fails with `413` when the body is over the limit and `400` when it cannot
/// be read.
pub(crate) async fn read_request_body(body: Body, limit: usize) -> Result<Bytes, StatusCode> {
    axum::body::to_bytes(body, limit).await.map_err(|e| {
        let too_large = std::error::Error::source(&e)
            .is_some_and(|source| source.is::<http_body_util::LengthLimitError>());
        tracing::debug!(error = %e, limit, "failed to read http req body");
        if too_large {
            StatusCode::PAYLOAD_TOO_LARGE
        } else {
            StatusCode::BAD_REQUEST
        }
    })
}
