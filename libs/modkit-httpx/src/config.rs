use std::time::Duration;

/// Content type written by the JSON codecs and the JSON wrapper.
pub const CONTENT_TYPE_JSON: &str = "application/json";

/// Transport timeout used when none (or zero) is configured.
pub const DEFAULT_TRANSPORT_TIMEOUT: Duration = Duration::from_secs(10);

/// Handler timeout used by [`crate::default_handler_wrappers`].
pub const DEFAULT_HANDLER_TIMEOUT: Duration = Duration::from_secs(10);

/// Fixed pause between retry attempts.
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_millis(100);

/// Status code accepted when a request configures none.
pub const DEFAULT_EXPECTED_STATUS: u16 = 200;

/// Attempts made by [`crate::retriable_transport`].
pub const DEFAULT_RETRY_ATTEMPTS: usize = 3;

/// Largest request body a handler buffers (10 MB).
pub const DEFAULT_MAX_BODY_SIZE: usize = 10 * 1024 * 1024;

/// Replaces a zero duration with [`DEFAULT_TRANSPORT_TIMEOUT`].
#[must_use]
pub fn effective_timeout(timeout: Duration) -> Duration {
    if timeout.is_zero() {
        DEFAULT_TRANSPORT_TIMEOUT
    } else {
        timeout
    }
}

/// TLS root certificate configuration
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[non_exhaustive]
pub enum TlsRootConfig {
    /// Use Mozilla's root certificates (webpki-roots, no OS dependency)
    #[default]
    WebPki,
    /// Use OS native root certificate store
    Native,
}

/// Base transport configuration.
///
/// Both `http` and `https` URLs are always accepted; `insecure` only controls
/// whether server certificates are verified.
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// TCP connect timeout (default: 5 seconds)
    pub connect_timeout: Duration,

    /// TCP keepalive interval (default: 30 seconds)
    pub tcp_keepalive: Option<Duration>,

    /// Timeout for idle connections in the pool (default: 30 seconds)
    pub pool_idle_timeout: Option<Duration>,

    /// Maximum number of idle connections per host (default: 10)
    pub pool_max_idle_per_host: usize,

    /// TLS root certificate strategy (default: `WebPki`)
    pub tls_roots: TlsRootConfig,

    /// Skip server certificate verification (default: false)
    ///
    /// **WARNING**: only for talking to hosts with self-signed certificates
    /// in trusted environments.
    pub insecure: bool,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(5),
            tcp_keepalive: Some(Duration::from_secs(30)),
            pool_idle_timeout: Some(Duration::from_secs(30)),
            pool_max_idle_per_host: 10,
            tls_roots: TlsRootConfig::default(),
            insecure: false,
        }
    }
}

impl TransportConfig {
    /// Default configuration with certificate verification disabled
    #[must_use]
    pub fn insecure() -> Self {
        Self {
            insecure: true,
            ..Default::default()
        }
    }
}
