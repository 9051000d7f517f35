use crate::error::{ExpectedStatus, HttpError};
use http::{Request, Response};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tower::{Layer, Service};

/// Tower layer that turns responses outside an accepted status set into
/// [`HttpError::UnexpectedStatus`].
#[derive(Clone, Debug)]
pub struct StatusCodeLayer {
    expected: Arc<ExpectedStatus>,
}

impl StatusCodeLayer {
    /// Accept any of `codes`. An empty list accepts only 200.
    #[must_use]
    pub fn new(codes: &[u16]) -> Self {
        let codes = if codes.is_empty() {
            vec![crate::config::DEFAULT_EXPECTED_STATUS]
        } else {
            codes.to_vec()
        };
        Self {
            expected: Arc::new(ExpectedStatus::Codes(codes)),
        }
    }
}

impl<S> Layer<S> for StatusCodeLayer {
    type Service = StatusCodeService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        StatusCodeService {
            inner,
            expected: Arc::clone(&self.expected),
        }
    }
}

/// Service that validates response status codes
#[derive(Clone, Debug)]
pub struct StatusCodeService<S> {
    inner: S,
    expected: Arc<ExpectedStatus>,
}

impl<S, ReqBody, ResBody> Service<Request<ReqBody>> for StatusCodeService<S>
where
    S: Service<Request<ReqBody>, Response = Response<ResBody>, Error = HttpError>,
    S::Future: Send + 'static,
    ResBody: Send + 'static,
{
    type Response = S::Response;
    type Error = HttpError;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Request<ReqBody>) -> Self::Future {
        let expected = Arc::clone(&self.expected);
        let fut = self.inner.call(req);
        Box::pin(async move {
            let resp = fut.await?;
            if expected.matches(resp.status().as_u16()) {
                Ok(resp)
            } else {
                Err(HttpError::UnexpectedStatus {
                    expected: (*expected).clone(),
                    got: resp.status(),
                })
            }
        })
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use crate::body::empty;
    use crate::test_support::StubTransport;
    use http::StatusCode;
    use tower::ServiceExt;

    fn request() -> Request<crate::HttpBody> {
        Request::get("http://localhost/").body(empty()).unwrap()
    }

    #[tokio::test]
    async fn test_accepted_status_passes_through() {
        let stub = StubTransport::status(StatusCode::NOT_FOUND, "missing");
        let svc = StatusCodeLayer::new(&[200, 404]).layer(stub.transport());

        let resp = svc.oneshot(request()).await.unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_unexpected_status_is_error() {
        let stub = StubTransport::status(StatusCode::NOT_FOUND, "missing");
        let svc = StatusCodeLayer::new(&[200]).layer(stub.transport());

        let err = svc.oneshot(request()).await.unwrap_err();
        assert_eq!(err.to_string(), "expected statuscode:[200],got:404");
    }

    #[tokio::test]
    async fn test_empty_list_means_200() {
        let stub = StubTransport::status(StatusCode::CREATED, "");
        let svc = StatusCodeLayer::new(&[]).layer(stub.transport());

        let err = svc.oneshot(request()).await.unwrap_err();
        assert_eq!(err.status(), Some(StatusCode::CREATED));
    }
}
