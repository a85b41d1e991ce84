// Error handling module
// Defines the error taxonomy shared by the transport, runner and CLI layers

use thiserror::Error;

/// Errors that can occur while talking to the daemon or preparing a run
#[derive(Error, Debug, Clone, PartialEq)]
pub enum BenchError {
    /// Non-success HTTP status, connection failure or timeout
    #[error("Transport error: {message}")]
    Transport { status: Option<u16>, message: String },

    /// The daemon answered with a body we could not understand
    #[error("Response parse error: {0}")]
    ResponseParse(String),

    /// Retrieved content does not hash to the expected digest
    #[error("Integrity error: expected {expected}, got {actual}")]
    Integrity { expected: String, actual: String },

    /// Required external daemon or container is not running
    #[error("Precondition failed: {0}")]
    Precondition(String),

    /// Invalid run configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// Local payload or export file failure
    #[error("I/O error: {0}")]
    Io(String),
}

impl BenchError {
    /// Build a transport error from a non-success response
    pub fn status(status: u16, body: impl Into<String>) -> Self {
        let body = body.into();
        BenchError::Transport {
            status: Some(status),
            message: format!("daemon returned HTTP {}: {}", status, body.trim()),
        }
    }

    /// Short tag used in tables and logs
    pub fn kind(&self) -> &'static str {
        match self {
            BenchError::Transport { .. } => "transport",
            BenchError::ResponseParse(_) => "response_parse",
            BenchError::Integrity { .. } => "integrity",
            BenchError::Precondition(_) => "precondition",
            BenchError::Config(_) => "config",
            BenchError::Io(_) => "io",
        }
    }
}

impl From<reqwest::Error> for BenchError {
    fn from(e: reqwest::Error) -> Self {
        let kind = if e.is_timeout() {
            "timeout"
        } else if e.is_connect() {
            "connection_failed"
        } else if e.is_request() {
            "request_error"
        } else if e.is_body() {
            "body_error"
        } else if e.is_decode() {
            "decode_error"
        } else {
            "unknown"
        };

        BenchError::Transport {
            status: e.status().map(|s| s.as_u16()),
            message: format!("{} (kind: {})", e, kind),
        }
    }
}

impl From<std::io::Error> for BenchError {
    fn from(e: std::io::Error) -> Self {
        BenchError::Io(e.to_string())
    }
}

/// Result type alias for harness operations
pub type Result<T> = std::result::Result<T, BenchError>;
