use crate::body::HttpBody;
use crate::error::HttpError;
use crate::transport::{
    Transport, TransportWrapper, build_insecure_transport, build_retriable_transport,
    build_transport, build_wrapped_insecure_transport, build_wrapped_transport, shared,
};
use http::{Request, Response};
use std::sync::OnceLock;
use tower::ServiceExt;

/// HTTP client bound to one [`Transport`]
///
/// # Thread Safety
///
/// `HttpClient` is `Clone + Send + Sync`. Cloning shares the transport and
/// its connection pool, so callers do NOT need to wrap it in a `Mutex`.
///
/// # Example
///
/// ```ignore
/// let client = modkit_httpx::build_client(&[TransportWrapper::status_code(200)])?;
/// let resp = modkit_httpx::get("https://example.com/api")
///     .send_with_client(&client)
///     .await?;
/// ```
#[derive(Clone)]
pub struct HttpClient {
    transport: Transport,
}

impl std::fmt::Debug for HttpClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpClient").finish_non_exhaustive()
    }
}

impl HttpClient {
    #[must_use]
    pub fn new(transport: Transport) -> Self {
        Self { transport }
    }

    /// The transport every request goes through
    #[must_use]
    pub fn transport(&self) -> &Transport {
        &self.transport
    }

    /// Send one request through the transport
    ///
    /// # Errors
    /// Returns whatever the transport stack reports.
    pub async fn execute(&self, req: Request<HttpBody>) -> Result<Response<HttpBody>, HttpError> {
        self.transport.clone().oneshot(req).await
    }
}

impl From<Transport> for HttpClient {
    fn from(transport: Transport) -> Self {
        Self::new(transport)
    }
}

/// # Errors
/// Returns `HttpError::TransportBuild` if TLS cannot be set up.
pub fn build_client(wrappers: &[TransportWrapper]) -> Result<HttpClient, HttpError> {
    build_transport(wrappers).map(HttpClient::new)
}

/// # Errors
/// Returns `HttpError::TransportBuild` if TLS cannot be set up.
pub fn build_insecure_client(wrappers: &[TransportWrapper]) -> Result<HttpClient, HttpError> {
    build_insecure_transport(wrappers).map(HttpClient::new)
}

/// # Errors
/// Returns `HttpError::TransportBuild` if TLS cannot be set up.
pub fn build_wrapped_client() -> Result<HttpClient, HttpError> {
    build_wrapped_transport().map(HttpClient::new)
}

/// # Errors
/// Returns `HttpError::TransportBuild` if TLS cannot be set up.
pub fn build_wrapped_insecure_client() -> Result<HttpClient, HttpError> {
    build_wrapped_insecure_transport().map(HttpClient::new)
}

/// Client over [`crate::build_retriable_transport`].
///
/// # Errors
/// Returns `HttpError::TransportBuild` if TLS cannot be set up.
pub fn build_retriable_client() -> Result<HttpClient, HttpError> {
    build_retriable_transport().map(HttpClient::new)
}

static CLIENT: OnceLock<HttpClient> = OnceLock::new();
static INSECURE_CLIENT: OnceLock<HttpClient> = OnceLock::new();
static WRAPPED_CLIENT: OnceLock<HttpClient> = OnceLock::new();
static WRAPPED_INSECURE_CLIENT: OnceLock<HttpClient> = OnceLock::new();
static RETRIABLE_CLIENT: OnceLock<HttpClient> = OnceLock::new();

/// Process-wide client without wrappers.
///
/// # Errors
/// Returns `HttpError::TransportBuild` if TLS cannot be set up.
pub fn client() -> Result<HttpClient, HttpError> {
    shared(&CLIENT, || build_client(&[]))
}

/// # Errors
/// Returns `HttpError::TransportBuild` if TLS cannot be set up.
pub fn insecure_client() -> Result<HttpClient, HttpError> {
    shared(&INSECURE_CLIENT, || build_insecure_client(&[]))
}

/// Process-wide client with the default transport wrappers.
///
/// # Errors
/// Returns `HttpError::TransportBuild` if TLS cannot be set up.
pub fn wrapped_client() -> Result<HttpClient, HttpError> {
    shared(&WRAPPED_CLIENT, build_wrapped_client)
}

/// # Errors
/// Returns `HttpError::TransportBuild` if TLS cannot be set up.
pub fn wrapped_insecure_client() -> Result<HttpClient, HttpError> {
    shared(&WRAPPED_INSECURE_CLIENT, build_wrapped_insecure_client)
}

/// Process-wide client that re-sends requests answered with 5xx.
///
/// # Errors
/// Returns `HttpError::TransportBuild` if TLS cannot be set up.
pub fn retriable_client() -> Result<HttpClient, HttpError> {
    shared(&RETRIABLE_CLIENT, build_retriable_client)
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use crate::body::empty;
    use crate::test_support::StubTransport;
    use http::StatusCode;
    use httpmock::prelude::*;

    #[tokio::test]
    async fn test_execute_uses_transport() {
        let stub = StubTransport::status(StatusCode::OK, "ok");
        let client = HttpClient::from(stub.transport());

        let req = Request::get("http://localhost/x").body(empty()).unwrap();
        let resp = client.execute(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(stub.seen()[0].uri.path(), "/x");
    }

    #[tokio::test]
    async fn test_wrapped_client_rejects_unexpected_status() {
        let server = MockServer::start();
        let _m = server.mock(|when, then| {
            when.method(GET).path("/missing");
            then.status(404);
        });

        let client = wrapped_client().unwrap();
        let req = Request::get(server.url("/missing")).body(empty()).unwrap();
        let err = client.execute(req).await.unwrap_err();
        assert_eq!(err.status(), Some(StatusCode::NOT_FOUND));
    }

    #[tokio::test]
    async fn test_retriable_client_exhausts_attempts_on_server_error() {
        let server = MockServer::start();
        let failing = server.mock(|when, then| {
            when.method(GET).path("/flaky");
            then.status(502);
        });
        let client = retriable_client().unwrap();

        let req = Request::get(server.url("/flaky")).body(empty()).unwrap();
        let resp = client.execute(req).await.unwrap();

        assert_eq!(resp.status(), StatusCode::BAD_GATEWAY);
        assert_eq!(failing.calls(), crate::config::DEFAULT_RETRY_ATTEMPTS);
    }

    #[tokio::test]
    async fn test_build_client_with_wrappers() {
        let server = MockServer::start();
        let m = server.mock(|when, then| {
            when.method(GET).path("/auth").header("x-api-key", "k1");
            then.status(200);
        });

        let client = build_client(&[TransportWrapper::header("x-api-key", "k1").unwrap()]).unwrap();
        let req = Request::get(server.url("/auth")).body(empty()).unwrap();
        assert_eq!(client.execute(req).await.unwrap().status(), StatusCode::OK);
        m.assert();
    }
}
