//! Trace context helpers for HTTP headers
//!
//! Provides W3C Trace Context propagation with optional OpenTelemetry integration.
//! - With `otel` feature: Uses the global propagator and the current span's context
//! - Without `otel` feature: Injection is a no-op; ids are read from `traceparent`

use http::HeaderMap;

/// W3C Trace Context header name
pub const TRACEPARENT: &str = "traceparent";

/// Extract traceparent header value from HTTP headers
pub fn get_traceparent(headers: &HeaderMap) -> Option<&str> {
    headers.get(TRACEPARENT)?.to_str().ok()
}

/// Parse `(trace_id, span_id)` from a traceparent value
/// (format: "00-{trace_id}-{span_id}-{flags}")
pub fn parse_traceparent(traceparent: &str) -> Option<(String, String)> {
    let mut parts = traceparent.split('-');
    let version = parts.next()?;
    let trace_id = parts.next()?;
    let span_id = parts.next()?;
    parts.next()?;
    if version != "00" || trace_id.len() != 32 || span_id.len() != 16 {
        return None;
    }
    Some((trace_id.to_owned(), span_id.to_owned()))
}

#[cfg(feature = "otel")]
mod imp {
    use super::{get_traceparent, parse_traceparent};
    use http::{HeaderMap, HeaderName, HeaderValue};
    use opentelemetry::propagation::{Extractor, Injector};
    use opentelemetry::trace::TraceContextExt;
    use opentelemetry::global;
    use tracing::Span;
    use tracing_opentelemetry::OpenTelemetrySpanExt;

    struct HeadersExtractor<'a>(&'a HeaderMap);

    impl Extractor for HeadersExtractor<'_> {
        fn get(&self, key: &str) -> Option<&str> {
            self.0.get(key).and_then(|v| v.to_str().ok())
        }

        fn keys(&self) -> Vec<&str> {
            self.0.keys().map(HeaderName::as_str).collect()
        }
    }

    struct HeadersInjector<'a>(&'a mut HeaderMap);

    impl Injector for HeadersInjector<'_> {
        fn set(&mut self, key: &str, value: String) {
            if let (Ok(name), Ok(val)) = (
                HeaderName::from_bytes(key.as_bytes()),
                HeaderValue::from_str(&value),
            ) {
                self.0.insert(name, val);
            }
        }
    }

    /// Inject the current span's context into HTTP headers.
    pub fn inject_current_span(headers: &mut HeaderMap) {
        let cx = Span::current().context();
        global::get_text_map_propagator(|propagator| {
            propagator.inject_context(&cx, &mut HeadersInjector(headers));
        });
    }

    /// Make the remote context carried by `headers` the parent of `span`.
    pub fn set_parent_from_headers(span: &Span, headers: &HeaderMap) {
        let parent_cx = global::get_text_map_propagator(|propagator| {
            propagator.extract(&HeadersExtractor(headers))
        });
        let _ = span.set_parent(parent_cx);
    }

    /// Trace and span ids of the current span, falling back to `traceparent`.
    pub fn trace_ids(headers: &HeaderMap) -> (String, String) {
        let cx = Span::current().context();
        let span_ref = cx.span();
        let span_cx = span_ref.span_context();
        if span_cx.is_valid() {
            return (
                span_cx.trace_id().to_string(),
                span_cx.span_id().to_string(),
            );
        }
        get_traceparent(headers)
            .and_then(parse_traceparent)
            .unwrap_or_default()
    }
}

#[cfg(not(feature = "otel"))]
mod imp {
    use super::{get_traceparent, parse_traceparent};
    use http::HeaderMap;
    use tracing::Span;

    /// No-op: OpenTelemetry is disabled
    pub fn inject_current_span(_headers: &mut HeaderMap) {}

    /// No-op: OpenTelemetry is disabled
    pub fn set_parent_from_headers(_span: &Span, _headers: &HeaderMap) {}

    /// Trace and span ids from the `traceparent` header, empty when absent.
    pub fn trace_ids(headers: &HeaderMap) -> (String, String) {
        get_traceparent(headers)
            .and_then(parse_traceparent)
            .unwrap_or_default()
    }
}

pub use imp::{inject_current_span, set_parent_from_headers, trace_ids};

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    const SAMPLE: &str = "00-4bf92f3577b34da6a3ce929d0e0e4736-00f067aa0ba902b7-01";

    #[test]
    fn test_get_traceparent() {
        let mut headers = HeaderMap::new();
        assert!(get_traceparent(&headers).is_none());

        headers.insert(TRACEPARENT, SAMPLE.parse().unwrap());
        assert_eq!(get_traceparent(&headers), Some(SAMPLE));
    }

    #[test]
    fn test_parse_traceparent() {
        let (trace_id, span_id) = parse_traceparent(SAMPLE).unwrap();
        assert_eq!(trace_id, "4bf92f3577b34da6a3ce929d0e0e4736");
        assert_eq!(span_id, "00f067aa0ba902b7");

        assert!(parse_traceparent("invalid").is_none());
        assert!(parse_traceparent("").is_none());
        assert!(parse_traceparent("01-4bf92f3577b34da6a3ce929d0e0e4736-00f067aa0ba902b7-01").is_none());
    }

    #[test]
    fn test_trace_ids_from_header() {
        let mut headers = HeaderMap::new();
        assert_eq!(trace_ids(&headers), (String::new(), String::new()));

        headers.insert(TRACEPARENT, SAMPLE.parse().unwrap());
        let (trace_id, span_id) = trace_ids(&headers);
        assert_eq!(trace_id, "4bf92f3577b34da6a3ce929d0e0e4736");
        assert_eq!(span_id, "00f067aa0ba902b7");
    }

    #[test]
    #[cfg(not(feature = "otel"))]
    fn test_inject_current_span_noop() {
        let mut headers = HeaderMap::new();
        inject_current_span(&mut headers);
        assert!(headers.is_empty());
    }

    #[test]
    #[cfg(feature = "otel")]
    fn test_inject_current_span_no_panic() {
        use opentelemetry::global;
        use opentelemetry_sdk::propagation::TraceContextPropagator;

        global::set_text_map_propagator(TraceContextPropagator::new());

        let mut headers = HeaderMap::new();
        let _span = tracing::info_span!("test").entered();
        inject_current_span(&mut headers);
    }
}
