//! Client body type and body replay helpers.

use crate::error::{BoxError, HttpError};
use bytes::Bytes;
use http::HeaderMap;
use http_body_util::{BodyExt, Empty, Full};

/// Type-erased body used for outgoing requests and incoming responses.
pub type HttpBody = http_body_util::combinators::BoxBody<Bytes, BoxError>;

/// Body over an in-memory buffer.
#[must_use]
pub fn full(data: impl Into<Bytes>) -> HttpBody {
    Full::new(data.into())
        .map_err(|never| match never {})
        .boxed()
}

/// Zero-length body.
#[must_use]
pub fn empty() -> HttpBody {
    Empty::<Bytes>::new().map_err(|never| match never {}).boxed()
}

/// Read a body to the end.
///
/// # Errors
/// Returns the body's stream error.
pub async fn collect_body<B>(body: B) -> Result<Bytes, BoxError>
where
    B: http_body::Body<Data = Bytes>,
    B::Error: Into<BoxError>,
{
    match body.collect().await {
        Ok(collected) => Ok(collected.to_bytes()),
        Err(e) => Err(e.into()),
    }
}

/// Drain a single-read body into memory.
///
/// Returns the captured bytes together with a fresh body over the same bytes,
/// so the caller can inspect the payload and still hand a readable body
/// downstream. An empty body yields empty bytes and a valid empty body.
///
/// # Errors
/// Returns `HttpError::Transport` if reading the original body fails.
pub async fn drain_body(body: HttpBody) -> Result<(Bytes, HttpBody), HttpError> {
    let data = collect_body(body).await.map_err(HttpError::Transport)?;
    let replay = full(data.clone());
    Ok((data, replay))
}

/// Returns `true` for protocol upgrade requests (websocket and friends).
///
/// Bodies of such requests are streams owned by the upgraded connection and
/// must never be drained.
#[must_use]
pub fn is_upgrade(headers: &HeaderMap) -> bool {
    headers
        .get_all(http::header::CONNECTION)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .any(|token| token.trim().eq_ignore_ascii_case("upgrade"))
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_drain_body_replays_bytes() {
        let (data, replay) = drain_body(full("hello")).await.unwrap();
        assert_eq!(&data[..], b"hello");

        let replayed = collect_body(replay).await.unwrap();
        assert_eq!(&replayed[..], b"hello");
    }

    #[tokio::test]
    async fn test_drain_empty_body_is_not_an_error() {
        let (data, replay) = drain_body(empty()).await.unwrap();
        assert!(data.is_empty());

        let replayed = collect_body(replay).await.unwrap();
        assert!(replayed.is_empty());
    }

    struct BrokenBody;

    impl http_body::Body for BrokenBody {
        type Data = Bytes;
        type Error = std::io::Error;

        fn poll_frame(
            self: std::pin::Pin<&mut Self>,
            _cx: &mut std::task::Context<'_>,
        ) -> std::task::Poll<Option<Result<http_body::Frame<Bytes>, Self::Error>>> {
            std::task::Poll::Ready(Some(Err(std::io::Error::other("stream broke"))))
        }
    }

    #[tokio::test]
    async fn test_drain_body_surfaces_stream_error() {
        let broken: HttpBody = BrokenBody
            .map_err(|e| -> BoxError { Box::new(e) })
            .boxed();

        let result = drain_body(broken).await;
        assert!(matches!(result, Err(HttpError::Transport(_))));
    }

    #[test]
    fn test_is_upgrade() {
        let mut headers = HeaderMap::new();
        assert!(!is_upgrade(&headers));

        headers.insert(http::header::CONNECTION, "Upgrade".parse().unwrap());
        assert!(is_upgrade(&headers));

        headers.insert(http::header::CONNECTION, "keep-alive, upgrade".parse().unwrap());
        assert!(is_upgrade(&headers));

        headers.insert(http::header::CONNECTION, "keep-alive".parse().unwrap());
        assert!(!is_upgrade(&headers));
    }
}
