//! Shared helpers for unit tests.

use crate::body::{HttpBody, full};
use crate::error::HttpError;
use bytes::Bytes;
use http::{Request, Response, StatusCode};
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};
use tower::Service;
use tracing::field::{Field, Visit};
use tracing_subscriber::layer::SubscriberExt;

/// One recorded tracing event.
#[derive(Debug, Clone, Default)]
pub struct CapturedEvent {
    pub level: String,
    pub message: String,
    pub fields: HashMap<String, String>,
}

impl CapturedEvent {
    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields.get(name).map(String::as_str)
    }
}

struct FieldVisitor<'a>(&'a mut CapturedEvent);

impl Visit for FieldVisitor<'_> {
    fn record_str(&mut self, field: &Field, value: &str) {
        self.store(field, value.to_owned());
    }

    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        self.store(field, format!("{value:?}"));
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        self.store(field, value.to_string());
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        self.store(field, value.to_string());
    }
}

impl FieldVisitor<'_> {
    fn store(&mut self, field: &Field, value: String) {
        if field.name() == "message" {
            self.0.message = value;
        } else {
            self.0.fields.insert(field.name().to_owned(), value);
        }
    }
}

/// Tracing layer that records every event it sees.
#[derive(Clone, Default)]
pub struct EventCapture {
    events: Arc<Mutex<Vec<CapturedEvent>>>,
}

impl EventCapture {
    pub fn events(&self) -> Vec<CapturedEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn find(&self, message: &str) -> Option<CapturedEvent> {
        self.events().into_iter().find(|e| e.message == message)
    }

    /// Installs the capture as the thread-local default subscriber.
    pub fn install(&self) -> tracing::subscriber::DefaultGuard {
        let subscriber = tracing_subscriber::registry().with(self.clone());
        tracing::subscriber::set_default(subscriber)
    }
}

impl<S: tracing::Subscriber> tracing_subscriber::Layer<S> for EventCapture {
    fn on_event(
        &self,
        event: &tracing::Event<'_>,
        _ctx: tracing_subscriber::layer::Context<'_, S>,
    ) {
        let mut captured = CapturedEvent {
            level: event.metadata().level().to_string(),
            ..CapturedEvent::default()
        };
        event.record(&mut FieldVisitor(&mut captured));
        self.events.lock().unwrap().push(captured);
    }
}

/// What the stub transport saw for one call.
#[derive(Debug, Clone)]
pub struct SeenRequest {
    pub method: http::Method,
    pub uri: http::Uri,
    pub headers: http::HeaderMap,
    pub body: Bytes,
}

type Responder = dyn Fn(usize) -> Result<Response<HttpBody>, HttpError> + Send + Sync;

/// In-memory transport that records requests and answers via a closure
/// receiving the zero-based call index.
#[derive(Clone)]
pub struct StubTransport {
    seen: Arc<Mutex<Vec<SeenRequest>>>,
    responder: Arc<Responder>,
}

impl StubTransport {
    pub fn new<F>(responder: F) -> Self
    where
        F: Fn(usize) -> Result<Response<HttpBody>, HttpError> + Send + Sync + 'static,
    {
        Self {
            seen: Arc::default(),
            responder: Arc::new(responder),
        }
    }

    /// Always answers `status` with `body`.
    pub fn status(status: StatusCode, body: &'static str) -> Self {
        Self::new(move |_| Ok(response(status, body)))
    }

    pub fn seen(&self) -> Vec<SeenRequest> {
        self.seen.lock().unwrap().clone()
    }

    pub fn calls(&self) -> usize {
        self.seen.lock().unwrap().len()
    }

    pub fn transport(&self) -> crate::Transport {
        crate::Transport::new(self.clone())
    }
}

pub fn response(status: StatusCode, body: &'static str) -> Response<HttpBody> {
    Response::builder()
        .status(status)
        .body(full(body))
        .unwrap()
}

impl Service<Request<HttpBody>> for StubTransport {
    type Response = Response<HttpBody>;
    type Error = HttpError;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, _: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: Request<HttpBody>) -> Self::Future {
        let seen = Arc::clone(&self.seen);
        let responder = Arc::clone(&self.responder);
        Box::pin(async move {
            let (parts, body) = req.into_parts();
            let body = crate::body::collect_body(body)
                .await
                .map_err(HttpError::Transport)?;
            let index = {
                let mut seen = seen.lock().unwrap();
                seen.push(SeenRequest {
                    method: parts.method,
                    uri: parts.uri,
                    headers: parts.headers,
                    body,
                });
                seen.len() - 1
            };
            responder(index)
        })
    }
}
