use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Boxed error used at the transport/body boundary.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Classification of URL validation failures.
///
/// Provides programmatic matching for different failure modes without
/// relying on unstable error message strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum InvalidUriKind {
    /// URL could not be parsed (malformed syntax)
    ParseError,
    /// URL is missing required host/authority component
    MissingAuthority,
    /// URL scheme is missing or is not http/https
    UnsupportedScheme,
}

/// Configuration failure recorded by the request builder.
///
/// The builder keeps the first failure and carries it through every later
/// chained call, so this type is `Clone`.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ConfigError {
    #[error("invalid header name '{0}'")]
    InvalidHeaderName(String),

    #[error("invalid value for header '{name}'")]
    InvalidHeaderValue { name: String },

    #[error("failed to encode query object: {0}")]
    QueryEncode(String),

    #[error("failed to serialize request payload: {0}")]
    PayloadEncode(String),
}

/// Codec failure, shared by the encode and decode paths.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum CodecError {
    /// JSON (de)serialization failed
    #[error("json: {0}")]
    Json(#[from] serde_json::Error),

    /// Status envelope carried a non-zero code
    #[error("unexpected code:{code},msg:{msg}")]
    Status { code: i64, msg: String },

    /// Failure reported by a user-supplied codec
    #[error("{0}")]
    Custom(#[source] BoxError),
}

/// The set of status codes a validator accepts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExpectedStatus {
    /// Any of the listed codes
    Codes(Vec<u16>),
    /// Any code in `start..=end`
    Range { start: u16, end: u16 },
}

impl ExpectedStatus {
    /// Returns `true` if `code` is accepted.
    #[must_use]
    pub fn matches(&self, code: u16) -> bool {
        match self {
            Self::Codes(codes) => codes.contains(&code),
            Self::Range { start, end } => (*start..=*end).contains(&code),
        }
    }
}

impl fmt::Display for ExpectedStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Codes(codes) => {
                f.write_str("[")?;
                for (i, code) in codes.iter().enumerate() {
                    if i > 0 {
                        f.write_str(",")?;
                    }
                    write!(f, "{code}")?;
                }
                f.write_str("]")
            }
            Self::Range { start, end } => write!(f, "[{start}..={end}]"),
        }
    }
}

/// HTTP toolkit error types
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum HttpError {
    /// Deferred builder error (bad header, query object, payload)
    #[error("Invalid request configuration: {0}")]
    Config(#[from] ConfigError),

    /// Request building failed
    #[error("Failed to build request: {0}")]
    RequestBuild(#[from] http::Error),

    /// Invalid URL
    ///
    /// Use the `kind` field for programmatic matching. The `reason` field contains
    /// a diagnostic message intended for logging only.
    #[error("Invalid URL '{url}': {reason}")]
    InvalidUri {
        /// The URL that failed validation
        url: String,
        /// Structured failure classification for programmatic matching
        kind: InvalidUriKind,
        /// Diagnostic message (unstable format, for logging only)
        reason: String,
    },

    /// Request payload could not be encoded by the codec
    #[error("Failed to encode request body: {0}")]
    Encode(#[source] CodecError),

    /// Base transport could not be constructed (TLS setup)
    #[error("Failed to build transport: {0}")]
    TransportBuild(#[source] BoxError),

    /// Transport error (network, connection, body stream, etc)
    #[error("Transport error: {0}")]
    Transport(#[source] BoxError),

    /// Response status outside the accepted set
    #[error("expected statuscode:{expected},got:{}", .got.as_u16())]
    UnexpectedStatus {
        expected: ExpectedStatus,
        got: http::StatusCode,
    },

    /// Response body could not be decoded by the codec
    #[error("Failed to decode response body: {0}")]
    Decode(#[source] CodecError),

    /// Deadline elapsed before the call completed
    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    /// Caller cancelled the call
    #[error("Request cancelled")]
    Cancelled,
}

impl HttpError {
    /// Status code carried by [`HttpError::UnexpectedStatus`].
    #[must_use]
    pub fn status(&self) -> Option<http::StatusCode> {
        match self {
            Self::UnexpectedStatus { got, .. } => Some(*got),
            _ => None,
        }
    }

    /// Returns `true` for [`HttpError::Timeout`].
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout(_))
    }
}

impl From<hyper::Error> for HttpError {
    fn from(err: hyper::Error) -> Self {
        HttpError::Transport(Box::new(err))
    }
}

impl From<hyper_util::client::legacy::Error> for HttpError {
    fn from(err: hyper_util::client::legacy::Error) -> Self {
        HttpError::Transport(Box::new(err))
    }
}
