#![cfg_attr(coverage_nightly, feature(coverage_attribute))]
#![warn(warnings)]

//! Composable HTTP client/server toolkit for `ModKit`
//!
//! This crate provides:
//! - An immutable, fluent [`RequestBuilder`] that materializes a request plus
//!   a matching transport stack
//! - [`Transport`] middleware as tower layers (timeout, retry, logging,
//!   tracing, status validation, JSON content type) composed through
//!   [`TransportWrapper`] lists
//! - Server-side [`Handler`] middleware (logging, tracing, timeout) and typed
//!   handlers via [`json_handler`]
//! - Pluggable wire codecs ([`JsonCodec`], [`StatusJsonCodec`], [`FnCodec`])
//! - One-shot calls with request/response interceptors in [`call`]
//! - Shared, lazily built transports and clients over hyper + rustls
//! - Optional OpenTelemetry propagation (feature `otel`)
//!
//! # Wrapper ordering
//!
//! Wrapper lists are folded in order, so the last wrapper is the outermost
//! and runs first. [`default_transport_wrappers`] therefore puts the timeout
//! around everything and status validation closest to the wire.
//!
//! # Example
//!
//! ```ignore
//! use modkit_httpx::post;
//! use std::time::Duration;
//!
//! let reply: Echo = post("/echo")
//!     .base_url("http://localhost:8080")
//!     .with_req(&Echo { data: "hello world".into() })
//!     .timeout(Duration::from_secs(3))
//!     .fetch()
//!     .await?;
//! ```

mod body;
pub mod call;
mod client;
mod codec;
mod config;
mod error;
mod handler;
mod interceptor;
mod layers;
pub mod otel;
mod request;
mod response;
pub mod security;
mod tls;
mod transport;

#[cfg(test)]
mod test_support;

pub use body::{HttpBody, collect_body, drain_body, empty, full, is_upgrade};
pub use call::CallOptions;
pub use client::{
    HttpClient, build_client, build_insecure_client, build_retriable_client, build_wrapped_client,
    build_wrapped_insecure_client, client, insecure_client, retriable_client, wrapped_client,
    wrapped_insecure_client,
};
pub use codec::{
    Codec, FnCodec, JsonCodec, SharedCodec, StatusJsonCodec, decode_value, default_codec,
    encode_value,
};
pub use config::{
    CONTENT_TYPE_JSON, DEFAULT_EXPECTED_STATUS, DEFAULT_HANDLER_TIMEOUT, DEFAULT_MAX_BODY_SIZE,
    DEFAULT_RETRY_ATTEMPTS, DEFAULT_RETRY_DELAY, DEFAULT_TRANSPORT_TIMEOUT, TlsRootConfig,
    TransportConfig, effective_timeout,
};
pub use error::{
    BoxError, CodecError, ConfigError, ExpectedStatus, HttpError, InvalidUriKind,
};
pub use handler::{
    Handler, HandlerLoggingLayer, HandlerLoggingService, HandlerWrapper, default_handler_wrappers,
    handler, handler_with_max_body_size, json_handler, wrap_default_handler, wrap_handler,
};
pub use interceptor::{
    ChainedRequestInterceptor, ChainedResponseInterceptor, ContentTypeInterceptor, ExpectStatus,
    ExpectStatusRange, LoggingRequestInterceptor, LoggingResponseInterceptor, RequestInterceptor,
    ResponseInterceptor, SharedRequestInterceptor, SharedResponseInterceptor,
};
pub use layers::{
    HeaderLayer, HeaderService, JsonContentTypeLayer, JsonContentTypeService, LoggingLayer,
    LoggingService, OtelLayer, OtelService, RetryLayer, RetryService, StatusCodeLayer,
    StatusCodeService,
};
pub use request::{
    RequestBuilder, base_url, delete, get, head, method, options, patch, post, put, trace,
};
pub use response::HttpResponse;
pub use transport::{
    Transport, TransportWrapper, build_insecure_transport, build_retriable_transport,
    build_transport, build_transport_with_config, build_wrapped_insecure_transport,
    build_wrapped_transport, default_transport_wrappers, insecure_transport, retriable_transport,
    transport, wrap_default_transport, wrap_transport, wrapped_insecure_transport,
    wrapped_transport,
};
