use super::read_request_body;
use crate::body::is_upgrade;
use crate::config::DEFAULT_MAX_BODY_SIZE;
use axum::body::Body;
use axum::response::IntoResponse;
use bytes::Bytes;
use http::{Request, Response, StatusCode};
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use tower::{Layer, Service};

/// Tower layer logging one "serve http req" event per inbound request
///
/// The event carries `http_method`, `http_url`, `traceID`, `spanID`,
/// `req_data`, `resp_data` and `statusCode`. Bodies are buffered and replayed,
/// so the inner handler and the client still see them in full. Upgrade
/// requests are logged with metadata only and their bodies are never touched.
/// A logged request body over the size limit is answered with `413`.
#[derive(Clone, Copy, Debug)]
pub struct HandlerLoggingLayer {
    log_req: bool,
    log_resp: bool,
    max_body_size: usize,
}

impl HandlerLoggingLayer {
    #[must_use]
    pub fn new(log_req: bool, log_resp: bool) -> Self {
        Self {
            log_req,
            log_resp,
            max_body_size: DEFAULT_MAX_BODY_SIZE,
        }
    }

    /// Largest request body buffered for logging (default: 10 MB)
    #[must_use]
    pub fn with_max_body_size(mut self, max_body_size: usize) -> Self {
        self.max_body_size = max_body_size;
        self
    }
}

impl<S> Layer<S> for HandlerLoggingLayer {
    type Service = HandlerLoggingService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        HandlerLoggingService {
            inner,
            log_req: self.log_req,
            log_resp: self.log_resp,
            max_body_size: self.max_body_size,
        }
    }
}

#[derive(Clone, Debug)]
pub struct HandlerLoggingService<S> {
    inner: S,
    log_req: bool,
    log_resp: bool,
    max_body_size: usize,
}

/// Responses come from our own handlers and are buffered without a limit.
async fn buffer(body: Body) -> Result<Bytes, axum::Error> {
    axum::body::to_bytes(body, usize::MAX).await
}

impl<S> Service<Request<Body>> for HandlerLoggingService<S>
where
    S: Service<Request<Body>, Response = Response<Body>> + Clone + Send + 'static,
    S::Future: Send,
    S::Error: Send + 'static,
{
    type Response = Response<Body>;
    type Error = S::Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Request<Body>) -> Self::Future {
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);
        let (log_req, log_resp) = (self.log_req, self.log_resp);
        let max_body_size = self.max_body_size;

        Box::pin(async move {
            let method = req.method().clone();
            let url = req.uri().to_string();
            let (trace_id, span_id) = crate::otel::trace_ids(req.headers());

            if is_upgrade(req.headers()) {
                let resp = inner.call(req).await?;
                tracing::info!(
                    http_method = %method,
                    http_url = %url,
                    traceID = %trace_id,
                    spanID = %span_id,
                    "serve http req"
                );
                return Ok(resp);
            }

            let (parts, body) = req.into_parts();
            let (req_data, body) = if log_req {
                match read_request_body(body, max_body_size).await {
                    Ok(data) => (data.clone(), Body::from(data)),
                    Err(status) => {
                        tracing::warn!(
                            http_method = %method,
                            http_url = %url,
                            statusCode = status.as_u16(),
                            "rejected http req body"
                        );
                        return Ok(status.into_response());
                    }
                }
            } else {
                (Bytes::new(), body)
            };

            let resp = inner.call(Request::from_parts(parts, body)).await?;
            let status = resp.status();

            let (resp_data, resp) = if log_resp && status != StatusCode::SWITCHING_PROTOCOLS {
                let (parts, body) = resp.into_parts();
                match buffer(body).await {
                    Ok(data) => (data.clone(), Response::from_parts(parts, Body::from(data))),
                    Err(e) => {
                        tracing::warn!(
                            http_method = %method,
                            http_url = %url,
                            error = %e,
                            "failed to read http resp body"
                        );
                        return Ok(StatusCode::INTERNAL_SERVER_ERROR.into_response());
                    }
                }
            } else {
                (Bytes::new(), resp)
            };

            tracing::info!(
                http_method = %method,
                http_url = %url,
                traceID = %trace_id,
                spanID = %span_id,
                req_data = %String::from_utf8_lossy(&req_data),
                resp_data = %String::from_utf8_lossy(&resp_data),
                statusCode = status.as_u16(),
                "serve http req"
            );
            Ok(resp)
        })
    }
}
