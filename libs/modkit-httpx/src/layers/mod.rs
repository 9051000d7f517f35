//! Tower layers for HTTP client middleware
//!
//! Each layer backs one [`crate::TransportWrapper`] constructor and can also
//! be used directly with `tower::ServiceBuilder`.
//!
//! ## Available Layers
//!
//! - [`StatusCodeLayer`] - Rejects responses outside an accepted status set
//! - [`HeaderLayer`] - Appends fixed headers to all requests
//! - [`JsonContentTypeLayer`] - Defaults the request content type to JSON
//! - [`LoggingLayer`] - Logs requests and responses, optionally with bodies
//! - [`OtelLayer`] - Adds OpenTelemetry tracing spans to outbound requests
//! - [`RetryLayer`] - Re-sends requests answered with a server error

use crate::body::HttpBody;
use crate::error::HttpError;
use http::Response;
use std::future::Future;
use std::pin::Pin;

mod header;
mod logging;
mod otel;
mod retry;
mod status;

pub use header::{HeaderLayer, HeaderService, JsonContentTypeLayer, JsonContentTypeService};
pub use logging::{LoggingLayer, LoggingService};
pub(crate) use otel::process_name;
pub use otel::{OtelLayer, OtelService};
pub use retry::{RetryLayer, RetryService};
pub use status::{StatusCodeLayer, StatusCodeService};

/// Boxed response future shared by the transport layers
pub(crate) type ResponseFuture =
    Pin<Box<dyn Future<Output = Result<Response<HttpBody>, HttpError>> + Send>>;
