//! Error types for the simurgh crate.

use std::io;
use std::time::Duration;

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while probing endpoints or emitting configs.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Candidate input file unreadable or empty after filtering.
    #[error("Input error: {0}")]
    Input(String),

    /// Connection error (DNS resolution, TCP dial).
    #[error("Connection error: {0}")]
    Connection(String),

    /// TLS/SSL error.
    #[error("TLS error: {0}")]
    Tls(String),

    /// HTTP protocol error.
    #[error("HTTP protocol error: {0}")]
    HttpProtocol(String),

    /// Non-success HTTP status code.
    #[error("HTTP {status}: {message}")]
    HttpStatus { status: u16, message: String },

    /// Operation exceeded its deadline.
    #[error("Operation timed out after {0:?}")]
    Timeout(Duration),

    /// The sweep was cancelled.
    #[error("Cancelled")]
    Cancelled,

    /// The probe reply came back with the checker's own IP.
    #[error("Loopback reply: endpoint returned our own address")]
    LoopbackReply,

    /// Rejected (protocol, transport, security) combination.
    #[error("Unsupported config: {0}")]
    UnsupportedConfig(String),

    /// URL parsing error.
    #[error("URL parse error: {0}")]
    UrlParse(#[from] url::ParseError),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

impl Error {
    /// Create an input error.
    pub fn input(message: impl Into<String>) -> Self {
        Self::Input(message.into())
    }

    /// Create a connection error.
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection(message.into())
    }

    /// Create a TLS error.
    pub fn tls(message: impl Into<String>) -> Self {
        Self::Tls(message.into())
    }

    /// Create an HTTP protocol error.
    pub fn http_protocol(message: impl Into<String>) -> Self {
        Self::HttpProtocol(message.into())
    }

    /// Create an HTTP status error.
    pub fn http_status(status: u16, message: impl Into<String>) -> Self {
        Self::HttpStatus {
            status,
            message: message.into(),
        }
    }

    /// Create an unsupported-config error.
    pub fn unsupported_config(message: impl Into<String>) -> Self {
        Self::UnsupportedConfig(message.into())
    }
}
