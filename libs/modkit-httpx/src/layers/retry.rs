use crate::body::{HttpBody, collect_body, full};
use crate::config::DEFAULT_RETRY_DELAY;
use crate::error::HttpError;
use crate::layers::ResponseFuture;
use http::{Request, Response};
use std::task::{Context, Poll};
use std::time::Duration;
use tower::{Layer, Service};

/// Tower layer that re-sends requests answered with a 5xx status
///
/// The request body is buffered once and replayed for each attempt. Transport
/// errors are returned immediately. When every attempt answers 5xx, the last
/// response is returned as `Ok` so callers (or an outer status check) decide
/// what to do with it.
#[derive(Clone, Copy, Debug)]
pub struct RetryLayer {
    max_attempts: usize,
    delay: Duration,
}

impl RetryLayer {
    /// Make at most `max_attempts` attempts in total; zero is treated as one.
    #[must_use]
    pub fn new(max_attempts: usize) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            delay: DEFAULT_RETRY_DELAY,
        }
    }

    /// Pause between attempts (default: 100ms)
    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

impl<S> Layer<S> for RetryLayer {
    type Service = RetryService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        RetryService {
            inner,
            max_attempts: self.max_attempts,
            delay: self.delay,
        }
    }
}

/// Service that retries server errors with a fixed delay
#[derive(Clone, Debug)]
pub struct RetryService<S> {
    inner: S,
    max_attempts: usize,
    delay: Duration,
}

impl<S> Service<Request<HttpBody>> for RetryService<S>
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
        // Swap so we consume the instance that was poll_ready'd,
        // leaving a fresh clone for the next poll_ready cycle.
        let clone = self.inner.clone();
        let inner = std::mem::replace(&mut self.inner, clone);
        let max_attempts = self.max_attempts;
        let delay = self.delay;

        Box::pin(async move {
            let (parts, body) = req.into_parts();
            let body = collect_body(body).await.map_err(HttpError::Transport)?;

            let mut attempt = 1usize;
            loop {
                let req = Request::from_parts(parts.clone(), full(body.clone()));

                let mut svc = inner.clone();
                std::future::poll_fn(|cx| svc.poll_ready(cx)).await?;
                let call: ResponseFuture = Box::pin(svc.call(req));
                let resp = call.await?;

                if !resp.status().is_server_error() || attempt >= max_attempts {
                    return Ok(resp);
                }

                tracing::debug!(
                    attempt,
                    max_attempts,
                    status = resp.status().as_u16(),
                    method = %parts.method,
                    url = %parts.uri,
                    delay_ms = delay.as_millis(),
                    "retrying http req after server error"
                );
                drop(resp);
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
        })
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use crate::test_support::{StubTransport, response};
    use http::StatusCode;
    use tower::ServiceExt;

    fn post(body: &'static str) -> Request<HttpBody> {
        Request::post("http://localhost/retry").body(full(body)).unwrap()
    }

    #[tokio::test]
    async fn test_retries_until_success_and_replays_body() {
        let stub = StubTransport::new(|index| {
            Ok(match index {
                0 | 1 => response(StatusCode::SERVICE_UNAVAILABLE, "busy"),
                _ => response(StatusCode::OK, "done"),
            })
        });
        let svc = RetryLayer::new(3)
            .with_delay(Duration::from_millis(1))
            .layer(stub.transport());

        let resp = svc.oneshot(post("payload")).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);

        let seen = stub.seen();
        assert_eq!(seen.len(), 3);
        for attempt in &seen {
            assert_eq!(&attempt.body[..], b"payload");
            assert_eq!(attempt.method, http::Method::POST);
        }
    }

    #[tokio::test]
    async fn test_exhausted_retries_return_last_response() {
        let stub = StubTransport::status(StatusCode::INTERNAL_SERVER_ERROR, "boom");
        let svc = RetryLayer::new(2)
            .with_delay(Duration::from_millis(1))
            .layer(stub.transport());

        let resp = svc.oneshot(post("")).await.unwrap();
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(stub.calls(), 2);
    }

    #[tokio::test]
    async fn test_client_errors_not_retried() {
        let stub = StubTransport::status(StatusCode::NOT_FOUND, "");
        let svc = RetryLayer::new(5).layer(stub.transport());

        let resp = svc.oneshot(post("")).await.unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
        assert_eq!(stub.calls(), 1);
    }

    #[tokio::test]
    async fn test_transport_errors_returned_immediately() {
        let stub = StubTransport::new(|_| Err(HttpError::Transport("reset".into())));
        let svc = RetryLayer::new(5).layer(stub.transport());

        let err = svc.oneshot(post("")).await.unwrap_err();
        assert!(matches!(err, HttpError::Transport(_)));
        assert_eq!(stub.calls(), 1);
    }

    #[tokio::test]
    async fn test_zero_attempts_means_one() {
        let stub = StubTransport::status(StatusCode::BAD_GATEWAY, "");
        let svc = RetryLayer::new(0).layer(stub.transport());

        let resp = svc.oneshot(post("")).await.unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_GATEWAY);
        assert_eq!(stub.calls(), 1);
    }
}
