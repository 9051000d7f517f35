use crate::body::{HttpBody, empty, full};
use crate::client::HttpClient;
use crate::codec::{Codec, SharedCodec, default_codec};
use crate::config::CONTENT_TYPE_JSON;
use crate::error::{CodecError, ConfigError, HttpError, InvalidUriKind};
use crate::response::HttpResponse;
use crate::security::basic_auth;
use crate::transport::{
    Transport, TransportWrapper, insecure_transport, transport, wrap_transport,
};
use bytes::Bytes;
use http::header::{AUTHORIZATION, CONTENT_TYPE};
use http::{HeaderMap, HeaderName, HeaderValue, Method, Request};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use url::Url;

#[derive(Clone, Debug)]
enum Payload {
    None,
    /// Encoded with the builder's codec at build time
    Value(Value),
    /// Sent as-is
    Raw(Bytes),
}

/// Immutable HTTP request builder
///
/// Every chaining method borrows the receiver and returns a new builder, so
/// a partially configured builder can be reused as a template. The first
/// configuration error (bad header, unencodable query object or payload) is
/// kept and carried through every later call; it surfaces when the request
/// is built or sent.
///
/// Sending goes through a transport stack assembled per call, listed from the
/// innermost wrapper out: status check, JSON content type (for JSON or empty
/// content types), logging, tracing (when enabled), timeout.
///
/// # Example
///
/// ```ignore
/// use modkit_httpx::{StatusJsonCodec, post};
///
/// let user: User = post("/users")
///     .base_url("https://api.example.com")
///     .with_header("x-request-id", "abc123")
///     .with_req(&NewUser { name: "Alice" })
///     .with_codec(StatusJsonCodec)
///     .expected_status_codes(&[200, 201])
///     .timeout(Duration::from_secs(3))
///     .fetch()
///     .await?;
/// ```
#[derive(Clone)]
#[must_use = "RequestBuilder does nothing until it is sent"]
pub struct RequestBuilder {
    method: Option<Method>,
    base_url: String,
    path: String,
    query: Vec<(String, String)>,
    headers: HeaderMap,
    payload: Payload,
    codec: SharedCodec,
    expected_status: Vec<u16>,
    log_req: bool,
    log_resp: bool,
    timeout: Duration,
    tracing: bool,
    content_type: String,
    insecure: bool,
    transport: Option<Transport>,
    cancel: Option<CancellationToken>,
    error: Option<ConfigError>,
}

impl Default for RequestBuilder {
    fn default() -> Self {
        Self {
            method: None,
            base_url: String::new(),
            path: String::new(),
            query: Vec::new(),
            headers: HeaderMap::new(),
            payload: Payload::None,
            codec: default_codec(),
            expected_status: Vec::new(),
            log_req: false,
            log_resp: false,
            timeout: Duration::ZERO,
            tracing: false,
            content_type: CONTENT_TYPE_JSON.to_owned(),
            insecure: false,
            transport: None,
            cancel: None,
            error: None,
        }
    }
}

impl fmt::Debug for RequestBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestBuilder")
            .field("method", &self.http_method())
            .field("url", &self.url())
            .field("query", &self.query)
            .field("headers", &self.headers)
            .field("payload", &self.payload)
            .field("content_type", &self.content_type)
            .field("expected_status", &self.expected_status)
            .field("timeout", &self.timeout)
            .field("insecure", &self.insecure)
            .field("error", &self.error)
            .finish_non_exhaustive()
    }
}

/// Start a `GET` request for `path`.
pub fn get(path: &str) -> RequestBuilder {
    method(Method::GET, path)
}

pub fn post(path: &str) -> RequestBuilder {
    method(Method::POST, path)
}

pub fn put(path: &str) -> RequestBuilder {
    method(Method::PUT, path)
}

pub fn patch(path: &str) -> RequestBuilder {
    method(Method::PATCH, path)
}

pub fn delete(path: &str) -> RequestBuilder {
    method(Method::DELETE, path)
}

pub fn head(path: &str) -> RequestBuilder {
    method(Method::HEAD, path)
}

pub fn options(path: &str) -> RequestBuilder {
    method(Method::OPTIONS, path)
}

pub fn trace(path: &str) -> RequestBuilder {
    method(Method::TRACE, path)
}

/// Start a request with an arbitrary method.
pub fn method(method: Method, path: &str) -> RequestBuilder {
    RequestBuilder::new().method(method, path)
}

/// Start a request against `url`; set the path with a verb method later.
pub fn base_url(url: &str) -> RequestBuilder {
    RequestBuilder::new().base_url(url)
}

static DEFAULT_METHOD: Method = Method::GET;

fn is_json_content_type(content_type: &str) -> bool {
    let essence = content_type.split(';').next().unwrap_or_default().trim();
    essence.eq_ignore_ascii_case(CONTENT_TYPE_JSON)
        || essence.to_ascii_lowercase().ends_with("+json")
}

impl RequestBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Clone `self` and apply `update` unless an error is already recorded.
    fn with(&self, update: impl FnOnce(&mut Self)) -> Self {
        let mut next = self.clone();
        if next.error.is_none() {
            update(&mut next);
        }
        next
    }

    pub fn method(&self, method: Method, path: &str) -> Self {
        self.with(|b| {
            b.method = Some(method);
            path.clone_into(&mut b.path);
        })
    }

    pub fn get(&self, path: &str) -> Self {
        self.method(Method::GET, path)
    }

    pub fn post(&self, path: &str) -> Self {
        self.method(Method::POST, path)
    }

    pub fn put(&self, path: &str) -> Self {
        self.method(Method::PUT, path)
    }

    pub fn patch(&self, path: &str) -> Self {
        self.method(Method::PATCH, path)
    }

    pub fn delete(&self, path: &str) -> Self {
        self.method(Method::DELETE, path)
    }

    pub fn head(&self, path: &str) -> Self {
        self.method(Method::HEAD, path)
    }

    pub fn options(&self, path: &str) -> Self {
        self.method(Method::OPTIONS, path)
    }

    pub fn trace(&self, path: &str) -> Self {
        self.method(Method::TRACE, path)
    }

    /// Prefix prepended to the path.
    pub fn base_url(&self, url: &str) -> Self {
        self.with(|b| url.clone_into(&mut b.base_url))
    }

    /// Add a query parameter; existing parameters with the same key are kept.
    pub fn with_query(&self, key: &str, value: &str) -> Self {
        self.with(|b| b.query.push((key.to_owned(), value.to_owned())))
    }

    /// Add every field of a flat serializable value as query parameters.
    pub fn with_query_obj<T: Serialize + ?Sized>(&self, obj: &T) -> Self {
        self.with(|b| match serde_urlencoded::to_string(obj) {
            Ok(encoded) => b.query.extend(
                url::form_urlencoded::parse(encoded.as_bytes()).into_owned(),
            ),
            Err(e) => b.error = Some(ConfigError::QueryEncode(e.to_string())),
        })
    }

    /// Append a header value.
    pub fn with_header(&self, name: &str, value: &str) -> Self {
        self.with(|b| match parse_header(name, value) {
            Ok((name, value)) => {
                b.headers.append(name, value);
            }
            Err(e) => b.error = Some(e),
        })
    }

    /// Append every value in `headers`.
    pub fn with_headers(&self, headers: &HeaderMap) -> Self {
        self.with(|b| {
            for (name, value) in headers {
                b.headers.append(name.clone(), value.clone());
            }
        })
    }

    /// Set `Authorization: Basic base64(username:password)`.
    pub fn with_basic_auth(&self, username: &str, password: &str) -> Self {
        self.with(
            |b| match HeaderValue::from_str(&basic_auth(username, password)) {
                Ok(value) => {
                    b.headers.insert(AUTHORIZATION, value);
                }
                Err(_) => {
                    b.error = Some(ConfigError::InvalidHeaderValue {
                        name: AUTHORIZATION.as_str().to_owned(),
                    });
                }
            },
        )
    }

    pub fn with_codec<C: Codec + 'static>(&self, codec: C) -> Self {
        self.with_shared_codec(Arc::new(codec))
    }

    pub fn with_shared_codec(&self, codec: SharedCodec) -> Self {
        self.with(|b| b.codec = codec)
    }

    /// Request payload, encoded with the codec when the request is built.
    pub fn with_req<T: Serialize + ?Sized>(&self, payload: &T) -> Self {
        self.with(|b| match serde_json::to_value(payload) {
            Ok(value) => b.payload = Payload::Value(value),
            Err(e) => b.error = Some(ConfigError::PayloadEncode(e.to_string())),
        })
    }

    /// Raw request body, sent without going through the codec.
    pub fn with_body(&self, body: impl Into<Bytes>) -> Self {
        let body = body.into();
        self.with(|b| b.payload = Payload::Raw(body))
    }

    /// Accepted response status codes; none configured means only 200.
    pub fn expected_status_codes(&self, codes: &[u16]) -> Self {
        self.with(|b| b.expected_status = codes.to_vec())
    }

    /// Log request and/or response bodies along with the call metadata.
    pub fn logging(&self, log_req: bool, log_resp: bool) -> Self {
        self.with(|b| {
            b.log_req = log_req;
            b.log_resp = log_resp;
        })
    }

    /// Bound the whole call; zero means 10 seconds.
    pub fn timeout(&self, timeout: Duration) -> Self {
        self.with(|b| b.timeout = timeout)
    }

    pub fn tracing(&self, enabled: bool) -> Self {
        self.with(|b| b.tracing = enabled)
    }

    /// Default `Content-Type`, used only when no explicit header sets one.
    /// An empty string sends no default.
    pub fn content_type(&self, content_type: &str) -> Self {
        self.with(|b| {
            if content_type.is_empty() || HeaderValue::from_str(content_type).is_ok() {
                content_type.clone_into(&mut b.content_type);
            } else {
                b.error = Some(ConfigError::InvalidHeaderValue {
                    name: CONTENT_TYPE.as_str().to_owned(),
                });
            }
        })
    }

    /// Skip server certificate verification.
    pub fn insecure(&self, insecure: bool) -> Self {
        self.with(|b| b.insecure = insecure)
    }

    /// Use `transport` as the base under the builder's wrappers.
    pub fn with_transport(&self, transport: Transport) -> Self {
        self.with(|b| b.transport = Some(transport))
    }

    /// Abort with [`HttpError::Cancelled`] once `token` is cancelled.
    pub fn with_cancellation(&self, token: CancellationToken) -> Self {
        self.with(|b| b.cancel = Some(token))
    }

    #[must_use]
    pub fn http_method(&self) -> &Method {
        self.method.as_ref().unwrap_or(&DEFAULT_METHOD)
    }

    /// Base URL joined with the path, before query merging.
    #[must_use]
    pub fn url(&self) -> String {
        format!("{}{}", self.base_url, self.path)
    }

    #[must_use]
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    #[must_use]
    pub fn query(&self) -> &[(String, String)] {
        &self.query
    }

    /// The recorded configuration error, if any.
    #[must_use]
    pub fn error(&self) -> Option<&ConfigError> {
        self.error.as_ref()
    }

    fn check(&self) -> Result<(), HttpError> {
        match &self.error {
            Some(ConfigError::PayloadEncode(reason)) => {
                Err(HttpError::Encode(CodecError::Custom(reason.clone().into())))
            }
            Some(e) => Err(HttpError::Config(e.clone())),
            None => Ok(()),
        }
    }

    fn resolve_url(&self) -> Result<http::Uri, HttpError> {
        let raw = self.url();
        let invalid = |kind, reason: String| HttpError::InvalidUri {
            url: raw.clone(),
            kind,
            reason,
        };

        let mut url = Url::parse(&raw).map_err(|e| match e {
            url::ParseError::EmptyHost => invalid(InvalidUriKind::MissingAuthority, e.to_string()),
            _ => invalid(InvalidUriKind::ParseError, e.to_string()),
        })?;

        if !matches!(url.scheme(), "http" | "https") {
            return Err(invalid(
                InvalidUriKind::UnsupportedScheme,
                format!("unsupported scheme '{}'", url.scheme()),
            ));
        }
        if !url.has_host() {
            return Err(invalid(
                InvalidUriKind::MissingAuthority,
                "missing host/authority".to_owned(),
            ));
        }

        // The query already on the URL is kept byte for byte
        if !self.query.is_empty() {
            let added = url::form_urlencoded::Serializer::new(String::new())
                .extend_pairs(&self.query)
                .finish();
            let merged = match url.query() {
                Some(raw) if !raw.is_empty() => format!("{added}&{raw}"),
                _ => added,
            };
            url.set_query(Some(&merged));
        }

        url.as_str()
            .parse()
            .map_err(|e: http::uri::InvalidUri| invalid(InvalidUriKind::ParseError, e.to_string()))
    }

    /// Materialize the request.
    ///
    /// # Errors
    ///
    /// - `HttpError::Config` for a recorded configuration error
    /// - `HttpError::InvalidUri` if base URL plus path is not an absolute http(s) URL
    /// - `HttpError::Encode` if the codec rejects the payload
    pub fn build_http_req(&self) -> Result<Request<HttpBody>, HttpError> {
        self.check()?;
        let uri = self.resolve_url()?;

        let body = match &self.payload {
            Payload::None => empty(),
            Payload::Value(value) => full(self.codec.encode(value).map_err(HttpError::Encode)?),
            Payload::Raw(bytes) => full(bytes.clone()),
        };

        let mut req = Request::builder()
            .method(self.http_method().clone())
            .uri(uri)
            .body(body)?;
        *req.headers_mut() = self.headers.clone();

        if !self.content_type.is_empty() && !req.headers().contains_key(CONTENT_TYPE) {
            let value = HeaderValue::from_str(&self.content_type).map_err(|_| {
                ConfigError::InvalidHeaderValue {
                    name: CONTENT_TYPE.as_str().to_owned(),
                }
            })?;
            req.headers_mut().insert(CONTENT_TYPE, value);
        }

        Ok(req)
    }

    fn wrappers(&self) -> Vec<TransportWrapper> {
        let mut wrappers = vec![TransportWrapper::status_codes(&self.expected_status)];
        if self.content_type.is_empty() || is_json_content_type(&self.content_type) {
            wrappers.push(TransportWrapper::json());
        }
        wrappers.push(TransportWrapper::logging(self.log_req, self.log_resp));
        if self.tracing {
            wrappers.push(TransportWrapper::tracing(""));
        }
        wrappers.push(TransportWrapper::timeout(self.timeout));
        wrappers
    }

    /// Assemble the transport stack over the base transport: the custom
    /// transport if set, else the shared insecure or secure transport.
    ///
    /// # Errors
    ///
    /// - `HttpError::Config` for a recorded configuration error
    /// - `HttpError::TransportBuild` if the shared transport cannot be built
    pub fn build_transport(&self) -> Result<Transport, HttpError> {
        self.check()?;
        let base = match (&self.transport, self.insecure) {
            (Some(custom), _) => custom.clone(),
            (None, true) => insecure_transport()?,
            (None, false) => transport()?,
        };
        Ok(wrap_transport(base, &self.wrappers()))
    }

    async fn cancellable<T>(
        &self,
        fut: impl Future<Output = Result<T, HttpError>>,
    ) -> Result<T, HttpError> {
        match &self.cancel {
            Some(token) => {
                tokio::select! {
                    biased;
                    () = token.cancelled() => Err(HttpError::Cancelled),
                    result = fut => result,
                }
            }
            None => fut.await,
        }
    }

    async fn execute(&self, client: &HttpClient) -> Result<HttpResponse, HttpError> {
        let req = self.build_http_req()?;
        let resp = self.cancellable(client.execute(req)).await?;
        Ok(HttpResponse::new(resp, Arc::clone(&self.codec)))
    }

    /// Send through the builder's transport stack.
    ///
    /// # Errors
    ///
    /// Configuration, URL, encode, transport build, network, status and
    /// timeout failures, each as its own `HttpError` variant.
    pub async fn send(&self) -> Result<HttpResponse, HttpError> {
        let client = HttpClient::new(self.build_transport()?);
        self.execute(&client).await
    }

    /// Send through `transport` as-is; the builder's wrappers are not applied.
    ///
    /// # Errors
    ///
    /// Configuration, URL and encode failures, plus whatever `transport` reports.
    pub async fn send_with_transport(&self, transport: Transport) -> Result<HttpResponse, HttpError> {
        self.check()?;
        self.execute(&HttpClient::new(transport)).await
    }

    /// Send through `client` as-is; the builder's wrappers are not applied.
    ///
    /// # Errors
    ///
    /// Configuration, URL and encode failures, plus whatever `client` reports.
    pub async fn send_with_client(&self, client: &HttpClient) -> Result<HttpResponse, HttpError> {
        self.check()?;
        self.execute(client).await
    }

    /// Send and decode the response body with the builder's codec.
    ///
    /// # Errors
    ///
    /// Everything [`send`](Self::send) reports, plus `HttpError::Decode`.
    pub async fn fetch<T: DeserializeOwned>(&self) -> Result<T, HttpError> {
        let resp = self.send().await?;
        self.cancellable(resp.decode()).await
    }

    /// # Errors
    ///
    /// Everything [`send_with_transport`](Self::send_with_transport) reports,
    /// plus `HttpError::Decode`.
    pub async fn fetch_with_transport<T: DeserializeOwned>(
        &self,
        transport: Transport,
    ) -> Result<T, HttpError> {
        let resp = self.send_with_transport(transport).await?;
        self.cancellable(resp.decode()).await
    }

    /// # Errors
    ///
    /// Everything [`send_with_client`](Self::send_with_client) reports, plus
    /// `HttpError::Decode`.
    pub async fn fetch_with_client<T: DeserializeOwned>(
        &self,
        client: &HttpClient,
    ) -> Result<T, HttpError> {
        let resp = self.send_with_client(client).await?;
        self.cancellable(resp.decode()).await
    }
}

fn parse_header(name: &str, value: &str) -> Result<(HeaderName, HeaderValue), ConfigError> {
    let header_name = HeaderName::from_bytes(name.as_bytes())
        .map_err(|_| ConfigError::InvalidHeaderName(name.to_owned()))?;
    let header_value = HeaderValue::from_str(value).map_err(|_| ConfigError::InvalidHeaderValue {
        name: name.to_owned(),
    })?;
    Ok((header_name, header_value))
}
