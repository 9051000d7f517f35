//! One-shot calls with interceptors
//!
//! A lighter path than [`crate::RequestBuilder`]: encode the payload, run
//! the request interceptor, execute, buffer the response, run the response
//! interceptor, decode.
//!
//! ```ignore
//! use modkit_httpx::{CallOptions, ChainedResponseInterceptor, ExpectStatus, call};
//!
//! let opts = CallOptions::default()
//!     .with_response_interceptor(ChainedResponseInterceptor::new().with(ExpectStatus(200)));
//! let user: User = call::get("https://api.example.com/users/1", &opts).await?;
//! ```

use crate::body::{collect_body, full};
use crate::client::{HttpClient, client};
use crate::codec::{Codec, SharedCodec, decode_value, default_codec, encode_value};
use crate::error::HttpError;
use crate::interceptor::{
    RequestInterceptor, ResponseInterceptor, SharedRequestInterceptor, SharedResponseInterceptor,
};
use bytes::Bytes;
use http::{Method, Request, Response};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::fmt;
use std::sync::Arc;

/// Codec, client and hooks for a one-shot call.
#[derive(Clone)]
pub struct CallOptions {
    codec: SharedCodec,
    client: Option<HttpClient>,
    request_interceptor: Option<SharedRequestInterceptor>,
    response_interceptor: Option<SharedResponseInterceptor>,
}

impl Default for CallOptions {
    fn default() -> Self {
        Self {
            codec: default_codec(),
            client: None,
            request_interceptor: None,
            response_interceptor: None,
        }
    }
}

impl fmt::Debug for CallOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallOptions")
            .field("content_type", &self.codec.content_type())
            .field("client", &self.client)
            .field("request_interceptor", &self.request_interceptor.is_some())
            .field("response_interceptor", &self.response_interceptor.is_some())
            .finish()
    }
}

impl CallOptions {
    #[must_use]
    pub fn with_codec<C: Codec + 'static>(mut self, codec: C) -> Self {
        self.codec = Arc::new(codec);
        self
    }

    /// Client to execute with; the shared [`client()`] when unset.
    #[must_use]
    pub fn with_client(mut self, client: HttpClient) -> Self {
        self.client = Some(client);
        self
    }

    #[must_use]
    pub fn with_request_interceptor(
        mut self,
        interceptor: impl RequestInterceptor + 'static,
    ) -> Self {
        self.request_interceptor = Some(Arc::new(interceptor));
        self
    }

    #[must_use]
    pub fn with_response_interceptor(
        mut self,
        interceptor: impl ResponseInterceptor + 'static,
    ) -> Self {
        self.response_interceptor = Some(Arc::new(interceptor));
        self
    }
}

/// Execute a call and return the buffered response without decoding it.
///
/// # Errors
///
/// - `HttpError::Encode` if the codec rejects `payload`
/// - `HttpError::RequestBuild` if `url` is not a valid URI
/// - whatever an interceptor or the client reports
pub async fn send<Req>(
    method: Method,
    url: &str,
    payload: Option<&Req>,
    opts: &CallOptions,
) -> Result<Response<Bytes>, HttpError>
where
    Req: Serialize + ?Sized,
{
    let body = match payload {
        Some(payload) => encode_value(opts.codec.as_ref(), payload).map_err(HttpError::Encode)?,
        None => Bytes::new(),
    };

    let mut req = Request::builder().method(method).uri(url).body(body)?;
    if let Some(interceptor) = &opts.request_interceptor {
        interceptor.intercept(&mut req)?;
    }

    let client = match &opts.client {
        Some(custom) => custom.clone(),
        None => client()?,
    };
    let resp = client.execute(req.map(full)).await?;

    let (parts, body) = resp.into_parts();
    let data = collect_body(body).await.map_err(HttpError::Transport)?;
    let resp = Response::from_parts(parts, data);

    if let Some(interceptor) = &opts.response_interceptor {
        interceptor.intercept(&resp)?;
    }
    Ok(resp)
}

async fn send_and_decode<Req, Resp>(
    method: Method,
    url: &str,
    payload: Option<&Req>,
    opts: &CallOptions,
) -> Result<Resp, HttpError>
where
    Req: Serialize + ?Sized,
    Resp: DeserializeOwned,
{
    let resp = send(method, url, payload, opts).await?;
    decode_value(opts.codec.as_ref(), resp.body()).map_err(HttpError::Decode)
}

/// # Errors
/// See [`send`]; additionally `HttpError::Decode`.
pub async fn get<Resp: DeserializeOwned>(url: &str, opts: &CallOptions) -> Result<Resp, HttpError> {
    send_and_decode::<(), Resp>(Method::GET, url, None, opts).await
}

/// # Errors
/// See [`send`]; additionally `HttpError::Decode`.
pub async fn post<Req, Resp>(url: &str, payload: &Req, opts: &CallOptions) -> Result<Resp, HttpError>
where
    Req: Serialize + ?Sized,
    Resp: DeserializeOwned,
{
    send_and_decode(Method::POST, url, Some(payload), opts).await
}

/// # Errors
/// See [`send`]; additionally `HttpError::Decode`.
pub async fn put<Req, Resp>(url: &str, payload: &Req, opts: &CallOptions) -> Result<Resp, HttpError>
where
    Req: Serialize + ?Sized,
    Resp: DeserializeOwned,
{
    send_and_decode(Method::PUT, url, Some(payload), opts).await
}

/// # Errors
/// See [`send`]; additionally `HttpError::Decode`.
pub async fn delete<Req, Resp>(
    url: &str,
    payload: &Req,
    opts: &CallOptions,
) -> Result<Resp, HttpError>
where
    Req: Serialize + ?Sized,
    Resp: DeserializeOwned,
{
    send_and_decode(Method::DELETE, url, Some(payload), opts).await
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use crate::codec::StatusJsonCodec;
    use crate::error::CodecError;
    use crate::interceptor::{
        ChainedRequestInterceptor, ChainedResponseInterceptor, ContentTypeInterceptor,
        ExpectStatus, LoggingRequestInterceptor, LoggingResponseInterceptor,
    };
    use crate::test_support::{EventCapture, StubTransport};
    use http::StatusCode;
    use http::header::CONTENT_TYPE;
    use httpmock::prelude::*;
    use serde::Deserialize;

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct Message {
        #[serde(rename = "Data")]
        data: String,
    }

    fn hello() -> Message {
        Message {
            data: "hello world".to_owned(),
        }
    }

    #[tokio::test]
    async fn test_post_runs_interceptors_and_decodes() {
        let capture = EventCapture::default();
        let _guard = capture.install();

        let stub = StubTransport::status(StatusCode::OK, r#"{"Data":"hello world"}"#);
        let opts = CallOptions::default()
            .with_client(HttpClient::new(stub.transport()))
            .with_request_interceptor(
                ChainedRequestInterceptor::new()
                    .with(ContentTypeInterceptor::json())
                    .with(LoggingRequestInterceptor),
            )
            .with_response_interceptor(
                ChainedResponseInterceptor::new()
                    .with(ExpectStatus(200))
                    .with(LoggingResponseInterceptor),
            );

        let got: Message = post("http://localhost/echo", &hello(), &opts).await.unwrap();
        assert_eq!(got, hello());

        let seen = stub.seen();
        assert_eq!(seen[0].method, Method::POST);
        assert_eq!(seen[0].headers[CONTENT_TYPE], "application/json");
        assert_eq!(&seen[0].body[..], br#"{"Data":"hello world"}"#);

        assert_eq!(
            capture.find("do http req").unwrap().field("req_data"),
            Some(r#"{"Data":"hello world"}"#)
        );
        assert_eq!(
            capture.find("got http resp").unwrap().field("resp_data"),
            Some(r#"{"Data":"hello world"}"#)
        );
    }

    #[tokio::test]
    async fn test_request_interceptor_error_aborts_call() {
        let stub = StubTransport::status(StatusCode::OK, "");
        let opts = CallOptions::default()
            .with_client(HttpClient::new(stub.transport()))
            .with_request_interceptor(|_: &mut Request<Bytes>| -> Result<(), HttpError> {
                Err(HttpError::Cancelled)
            });

        let err = get::<Message>("http://localhost/", &opts).await.unwrap_err();
        assert!(matches!(err, HttpError::Cancelled));
        assert_eq!(stub.calls(), 0);
    }

    #[tokio::test]
    async fn test_response_interceptor_rejects_status() {
        let stub = StubTransport::status(StatusCode::SERVICE_UNAVAILABLE, "down");
        let opts = CallOptions::default()
            .with_client(HttpClient::new(stub.transport()))
            .with_response_interceptor(ExpectStatus(200));

        let err = delete::<_, Message>("http://localhost/items/1", &hello(), &opts)
            .await
            .unwrap_err();
        assert_eq!(err.status(), Some(StatusCode::SERVICE_UNAVAILABLE));
    }

    #[tokio::test]
    async fn test_send_without_interceptors_returns_any_status() {
        let stub = StubTransport::status(StatusCode::NOT_FOUND, "missing");
        let opts = CallOptions::default().with_client(HttpClient::new(stub.transport()));

        let resp = send::<()>(Method::GET, "http://localhost/", None, &opts)
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
        assert_eq!(resp.body().as_ref(), b"missing");
        assert!(stub.seen()[0].body.is_empty());
    }

    #[tokio::test]
    async fn test_status_codec_envelope() {
        let stub = StubTransport::status(StatusCode::OK, r#"{"code":5,"msg":"bad"}"#);
        let opts = CallOptions::default()
            .with_client(HttpClient::new(stub.transport()))
            .with_codec(StatusJsonCodec);

        let err = put::<_, Message>("http://localhost/", &hello(), &opts)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            HttpError::Decode(CodecError::Status { code: 5, ref msg }) if msg == "bad"
        ));
    }

    #[tokio::test]
    async fn test_invalid_url() {
        let opts = CallOptions::default();
        let err = get::<Message>("not a url", &opts).await.unwrap_err();
        assert!(matches!(err, HttpError::RequestBuild(_)));
    }

    #[tokio::test]
    async fn test_default_client_against_mock_server() {
        let server = MockServer::start();
        let m = server.mock(|when, then| {
            when.method(GET).path("/hello");
            then.status(200).body(r#"{"Data":"hi"}"#);
        });

        let got: Message = get(&server.url("/hello"), &CallOptions::default())
            .await
            .unwrap();
        assert_eq!(got.data, "hi");
        m.assert();
    }
}
