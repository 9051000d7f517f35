use http::{Request, Response};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tower::{Layer, Service};

/// Client span per call, backing [`crate::TransportWrapper::tracing`]
///
/// Every call runs inside an `outgoing_http` span carrying `service.name`,
/// the method, the query-less URL and `otel.kind = "client"`. The response
/// status lands in `http.status_code`; failures and 4xx/5xx set `error`.
/// With the `otel` feature the span's W3C context is written into the
/// outgoing headers.
#[derive(Clone, Debug)]
pub struct OtelLayer {
    service_name: Arc<str>,
}

impl OtelLayer {
    /// Create a tracing layer for `service_name`.
    ///
    /// An empty name falls back to the executable's file name.
    #[must_use]
    pub fn new(service_name: &str) -> Self {
        let service_name = if service_name.is_empty() {
            process_name()
        } else {
            service_name.to_owned()
        };
        Self {
            service_name: service_name.into(),
        }
    }

    #[must_use]
    pub fn service_name(&self) -> &str {
        &self.service_name
    }
}

pub(crate) fn process_name() -> String {
    std::env::args_os()
        .next()
        .as_deref()
        .map(std::path::Path::new)
        .and_then(std::path::Path::file_name)
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default()
}

impl<S> Layer<S> for OtelLayer {
    type Service = OtelService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        OtelService {
            inner,
            service_name: Arc::clone(&self.service_name),
        }
    }
}

/// Service produced by [`OtelLayer`]
#[derive(Clone, Debug)]
pub struct OtelService<S> {
    inner: S,
    service_name: Arc<str>,
}

impl<S, ReqBody, ResBody> Service<Request<ReqBody>> for OtelService<S>
where
    S: Service<Request<ReqBody>, Response = Response<ResBody>> + Clone + Send + 'static,
    S::Future: Send,
    S::Error: Send + 'static,
    ReqBody: Send + 'static,
    ResBody: Send + 'static,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut req: Request<ReqBody>) -> Self::Future {
        use tracing::{Instrument, Level};

        let uri = req.uri();
        // Query strings may carry credentials; keep them out of spans
        let url_str = format!(
            "{}://{}{}",
            uri.scheme_str().unwrap_or("http"),
            uri.authority().map_or("", http::uri::Authority::as_str),
            uri.path()
        );

        let span = tracing::span!(
            Level::INFO, "outgoing_http",
            service.name = %self.service_name,
            http.method = %req.method(),
            http.url = %url_str,
            otel.kind = "client",
            http.status_code = tracing::field::Empty,
            error = tracing::field::Empty,
        );

        // The injected context must name the client span as parent
        span.in_scope(|| crate::otel::inject_current_span(req.headers_mut()));

        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);

        Box::pin(async move {
            let result = inner.call(req).instrument(span.clone()).await;

            match &result {
                Ok(response) => {
                    span.record("http.status_code", response.status().as_u16());
                    if response.status().is_client_error() || response.status().is_server_error() {
                        span.record("error", true);
                    }
                }
                Err(_) => {
                    span.record("error", true);
                }
            }

            result
        })
    }
}
