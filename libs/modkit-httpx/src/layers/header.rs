use http::header::CONTENT_TYPE;
use http::{HeaderMap, HeaderValue, Request};
use std::sync::Arc;
use std::task::{Context, Poll};
use tower::{Layer, Service};

/// Tower layer that appends a fixed set of headers to every request
#[derive(Clone, Debug)]
pub struct HeaderLayer {
    headers: Arc<HeaderMap>,
}

impl HeaderLayer {
    #[must_use]
    pub fn new(headers: HeaderMap) -> Self {
        Self {
            headers: Arc::new(headers),
        }
    }
}

impl<S> Layer<S> for HeaderLayer {
    type Service = HeaderService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        HeaderService {
            inner,
            headers: Arc::clone(&self.headers),
        }
    }
}

/// Service that appends headers to requests
#[derive(Clone, Debug)]
pub struct HeaderService<S> {
    inner: S,
    headers: Arc<HeaderMap>,
}

impl<S, ReqBody> Service<Request<ReqBody>> for HeaderService<S>
where
    S: Service<Request<ReqBody>>,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = S::Future;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut req: Request<ReqBody>) -> Self::Future {
        for (name, value) in self.headers.iter() {
            req.headers_mut().append(name.clone(), value.clone());
        }
        self.inner.call(req)
    }
}

/// Tower layer that sets `Content-Type: application/json` unless the request
/// already carries a content type
#[derive(Clone, Copy, Debug, Default)]
pub struct JsonContentTypeLayer;

impl<S> Layer<S> for JsonContentTypeLayer {
    type Service = JsonContentTypeService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        JsonContentTypeService { inner }
    }
}

/// Service that defaults the request content type to JSON
#[derive(Clone, Debug)]
pub struct JsonContentTypeService<S> {
    inner: S,
}

impl<S, ReqBody> Service<Request<ReqBody>> for JsonContentTypeService<S>
where
    S: Service<Request<ReqBody>>,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = S::Future;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut req: Request<ReqBody>) -> Self::Future {
        if !req.headers().contains_key(CONTENT_TYPE) {
            req.headers_mut().insert(
                CONTENT_TYPE,
                HeaderValue::from_static(crate::config::CONTENT_TYPE_JSON),
            );
        }
        self.inner.call(req)
    }
}
