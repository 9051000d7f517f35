use crate::body::{HttpBody, drain_body, is_upgrade};
use crate::error::HttpError;
use crate::layers::ResponseFuture;
use bytes::Bytes;
use http::{Request, Response, StatusCode};
use std::task::{Context, Poll};
use tower::{Layer, Service};

/// Tower layer that logs outgoing requests and their responses
///
/// Emits `send http req` before the call and `got http resp` after it, both
/// carrying `http_method`, `http_url`, `traceID` and `spanID`. Bodies are
/// captured (and replayed downstream) only when enabled for that direction.
/// Protocol upgrades are logged without touching their bodies.
#[derive(Clone, Copy, Debug)]
pub struct LoggingLayer {
    log_req: bool,
    log_resp: bool,
}

impl LoggingLayer {
    #[must_use]
    pub fn new(log_req: bool, log_resp: bool) -> Self {
        Self { log_req, log_resp }
    }
}

impl<S> Layer<S> for LoggingLayer {
    type Service = LoggingService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        LoggingService {
            inner,
            log_req: self.log_req,
            log_resp: self.log_resp,
        }
    }
}

/// Service that logs requests and responses
#[derive(Clone, Debug)]
pub struct LoggingService<S> {
    inner: S,
    log_req: bool,
    log_resp: bool,
}

fn body_text(data: &Bytes) -> String {
    String::from_utf8_lossy(data).into_owned()
}

impl<S> Service<Request<HttpBody>> for LoggingService<S>
where
    S: Service<Request<HttpBody>, Response = Response<HttpBody>, Error = HttpError>
        + Clone
        + Send
        + 'static,
    S::Future: Send,
{
    type Response = S::Response;
    type Error = HttpError;
    type Future = ResponseFuture;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Request<HttpBody>) -> Self::Future {
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);
        let log_req = self.log_req;
        let log_resp = self.log_resp;

        Box::pin(async move {
            let method = req.method().clone();
            let url = req.uri().to_string();
            let (trace_id, span_id) = crate::otel::trace_ids(req.headers());

            let (req, req_data) = if log_req && !is_upgrade(req.headers()) {
                let (parts, body) = req.into_parts();
                let (data, replay) = drain_body(body).await?;
                (Request::from_parts(parts, replay), body_text(&data))
            } else {
                (req, String::new())
            };

            tracing::info!(
                http_method = %method,
                http_url = %url,
                traceID = %trace_id,
                spanID = %span_id,
                req_data = %req_data,
                "send http req"
            );

            let call: ResponseFuture = Box::pin(inner.call(req));
            let resp = match call.await {
                Ok(resp) => resp,
                Err(err) => {
                    tracing::warn!(
                        http_method = %method,
                        http_url = %url,
                        traceID = %trace_id,
                        spanID = %span_id,
                        error = %err,
                        "http req failed"
                    );
                    return Err(err);
                }
            };

            let upgraded =
                resp.status() == StatusCode::SWITCHING_PROTOCOLS || is_upgrade(resp.headers());
            let (resp, resp_data) = if log_resp && !upgraded {
                let (parts, body) = resp.into_parts();
                let (data, replay) = drain_body(body).await?;
                (Response::from_parts(parts, replay), body_text(&data))
            } else {
                (resp, String::new())
            };

            tracing::info!(
                http_method = %method,
                http_url = %url,
                traceID = %trace_id,
                spanID = %span_id,
                http_status_code = resp.status().as_u16(),
                resp_data = %resp_data,
                "got http resp"
            );

            Ok(resp)
        })
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use crate::body::{collect_body, full};
    use crate::otel::TRACEPARENT;
    use crate::test_support::{EventCapture, StubTransport};
    use tower::ServiceExt;

    #[tokio::test]
    async fn test_logs_bodies_and_replays_them() {
        let capture = EventCapture::default();
        let _guard = capture.install();

        let stub = StubTransport::status(StatusCode::OK, r#"{"Data":"pong"}"#);
        let svc = LoggingLayer::new(true, true).layer(stub.transport());

        let req = Request::post("http://localhost/echo?x=1")
            .header(
                TRACEPARENT,
                "00-4bf92f3577b34da6a3ce929d0e0e4736-00f067aa0ba902b7-01",
            )
            .body(full(r#"{"Data":"ping"}"#))
            .unwrap();
        let resp = svc.oneshot(req).await.unwrap();

        // both bodies still readable after logging
        assert_eq!(&stub.seen()[0].body[..], br#"{"Data":"ping"}"#);
        let body = collect_body(resp.into_body()).await.unwrap();
        assert_eq!(&body[..], br#"{"Data":"pong"}"#);

        let sent = capture.find("send http req").unwrap();
        assert_eq!(sent.field("http_method"), Some("POST"));
        assert_eq!(sent.field("http_url"), Some("http://localhost/echo?x=1"));
        assert_eq!(sent.field("req_data"), Some(r#"{"Data":"ping"}"#));
        assert_eq!(sent.field("traceID"), Some("4bf92f3577b34da6a3ce929d0e0e4736"));

        let got = capture.find("got http resp").unwrap();
        assert_eq!(got.field("http_status_code"), Some("200"));
        assert_eq!(got.field("resp_data"), Some(r#"{"Data":"pong"}"#));
    }

    #[tokio::test]
    async fn test_disabled_directions_skip_bodies() {
        let capture = EventCapture::default();
        let _guard = capture.install();

        let stub = StubTransport::status(StatusCode::OK, "pong");
        let svc = LoggingLayer::new(false, false).layer(stub.transport());

        let req = Request::post("http://localhost/").body(full("ping")).unwrap();
        svc.oneshot(req).await.unwrap();

        assert_eq!(capture.find("send http req").unwrap().field("req_data"), Some(""));
        assert_eq!(capture.find("got http resp").unwrap().field("resp_data"), Some(""));
    }

    #[tokio::test]
    async fn test_upgrade_request_body_untouched() {
        let capture = EventCapture::default();
        let _guard = capture.install();

        let stub = StubTransport::status(StatusCode::OK, "");
        let svc = LoggingLayer::new(true, true).layer(stub.transport());

        let req = Request::get("http://localhost/ws")
            .header(http::header::CONNECTION, "Upgrade")
            .header(http::header::UPGRADE, "websocket")
            .body(full("frame"))
            .unwrap();
        svc.oneshot(req).await.unwrap();

        assert_eq!(capture.find("send http req").unwrap().field("req_data"), Some(""));
    }

    #[tokio::test]
    async fn test_transport_failure_logged_as_warning() {
        let capture = EventCapture::default();
        let _guard = capture.install();

        let stub = StubTransport::new(|_| Err(HttpError::Transport("connection refused".into())));
        let svc = LoggingLayer::new(true, true).layer(stub.transport());

        let req = Request::get("http://localhost/").body(full("")).unwrap();
        let err = svc.oneshot(req).await.unwrap_err();
        assert!(matches!(err, HttpError::Transport(_)));

        let failed = capture.find("http req failed").unwrap();
        assert_eq!(failed.level, "WARN");
        assert!(capture.find("got http resp").is_none());
    }
}
