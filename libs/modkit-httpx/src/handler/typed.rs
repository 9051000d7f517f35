use super::{Handler, read_request_body};
use crate::config::DEFAULT_MAX_BODY_SIZE;
use crate::codec::{Codec, SharedCodec, decode_value, default_codec, encode_value};
use axum::body::Body;
use axum::response::IntoResponse;
use http::header::CONTENT_TYPE;
use http::{HeaderValue, Request, Response, StatusCode};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::convert::Infallible;
use std::fmt::Display;
use std::future::Future;
use std::sync::Arc;

/// [`handler`] with the plain JSON codec.
pub fn json_handler<Req, Resp, E, F, Fut>(f: F) -> Handler
where
    F: Fn(Req) -> Fut + Clone + Send + Sync + 'static,
    Fut: Future<Output = Result<Resp, E>> + Send + 'static,
    Req: DeserializeOwned + Send + 'static,
    Resp: Serialize + Send + 'static,
    E: Display + Send + 'static,
{
    handler(default_codec(), f)
}

/// Turn a typed async function into a [`Handler`].
///
/// The request body is decoded with `codec` into `Req` and the returned
/// `Resp` is encoded with the same codec. Failures never write a body:
/// undecodable input answers 400, and a handler error or unencodable output
/// answers 500. Success answers 200 with the codec's content type.
/// Request bodies over 10 MB answer 413.
pub fn handler<Req, Resp, E, F, Fut>(codec: SharedCodec, f: F) -> Handler
where
    F: Fn(Req) -> Fut + Clone + Send + Sync + 'static,
    Fut: Future<Output = Result<Resp, E>> + Send + 'static,
    Req: DeserializeOwned + Send + 'static,
    Resp: Serialize + Send + 'static,
    E: Display + Send + 'static,
{
    handler_with_max_body_size(codec, DEFAULT_MAX_BODY_SIZE, f)
}

/// [`handler`] with a custom request body limit.
pub fn handler_with_max_body_size<Req, Resp, E, F, Fut>(
    codec: SharedCodec,
    max_body_size: usize,
    f: F,
) -> Handler
where
    F: Fn(Req) -> Fut + Clone + Send + Sync + 'static,
    Fut: Future<Output = Result<Resp, E>> + Send + 'static,
    Req: DeserializeOwned + Send + 'static,
    Resp: Serialize + Send + 'static,
    E: Display + Send + 'static,
{
    Handler::new(tower::service_fn(move |req: Request<Body>| {
        let codec = Arc::clone(&codec);
        let f = f.clone();
        async move {
            let resp = serve(codec.as_ref(), max_body_size, f, req).await;
            Ok::<_, Infallible>(resp)
        }
    }))
}

async fn serve<Req, Resp, E, F, Fut>(
    codec: &dyn Codec,
    max_body_size: usize,
    f: F,
    req: Request<Body>,
) -> Response<Body>
where
    F: Fn(Req) -> Fut,
    Fut: Future<Output = Result<Resp, E>>,
    Req: DeserializeOwned,
    Resp: Serialize,
    E: Display,
{
    let data = match read_request_body(req.into_body(), max_body_size).await {
        Ok(data) => data,
        Err(status) => return status.into_response(),
    };

    let input: Req = match decode_value(codec, &data) {
        Ok(input) => input,
        Err(e) => {
            tracing::debug!(error = %e, "failed to decode request body");
            return StatusCode::BAD_REQUEST.into_response();
        }
    };

    let output = match f(input).await {
        Ok(output) => output,
        Err(e) => {
            tracing::warn!(error = %e, "handler failed");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    let encoded = match encode_value(codec, &output) {
        Ok(encoded) => encoded,
        Err(e) => {
            tracing::warn!(error = %e, "failed to encode response body");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    let mut resp = Response::new(Body::from(encoded));
    if let Ok(content_type) = HeaderValue::from_str(codec.content_type()) {
        resp.headers_mut().insert(CONTENT_TYPE, content_type);
    }
    resp
}
