//! Error types and handling for the reading-session engine
//!
//! Every fallible boundary in the engine funnels into [`Error`], optimized
//! for zero-cost propagation and clear diagnostics the way the rest of the
//! crate's subsystems expect.

use thiserror::Error;

/// Main result type used throughout the crate
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the reading-session engine
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Image cache errors (download, decode, filesystem)
    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),

    /// Catalog collaborator errors (chapter/page list fetch)
    #[error("Catalog error: {0}")]
    Catalog(String),

    /// Resource not found
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// Invalid input from a caller
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Programmer error / broken invariant — should never happen in correct code
    #[error("Invariant violation: {0}")]
    Invariant(String),

    /// I/O errors from std
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Cache-layer error taxonomy (spec: download/decode/filesystem)
#[derive(Error, Debug, Clone)]
#[error("{code}: {message}")]
pub struct CacheError {
    /// Human readable message
    pub message: String,
    /// Whether retrying the same request might succeed
    pub retriable: bool,
    /// Coarse error kind: "network", "http", "decode", "unknown"
    pub code: &'static str,
    /// HTTP status code, if the failure came from a response
    pub status_code: Option<u16>,
}

impl CacheError {
    /// Build a network/transport failure — always retriable
    pub fn network(message: impl Into<String>) -> Self {
        Self { message: message.into(), retriable: true, code: "network", status_code: None }
    }

    /// Build an HTTP-status failure; retriable iff status is 408, 429, or 5xx
    pub fn http(status_code: u16) -> Self {
        let retriable = matches!(status_code, 408 | 429) || (500..600).contains(&status_code);
        Self {
            message: format!("unexpected HTTP status {status_code}"),
            retriable,
            code: "http",
            status_code: Some(status_code),
        }
    }

    /// Build a decode failure — always retriable (content may be corrupt in transit)
    pub fn decode(message: impl Into<String>) -> Self {
        Self { message: message.into(), retriable: true, code: "decode", status_code: None }
    }

    /// Build a filesystem failure — never auto-retriable
    pub fn filesystem(message: impl Into<String>) -> Self {
        Self { message: message.into(), retriable: false, code: "unknown", status_code: None }
    }
}

impl Error {
    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create an invariant-violation error
    pub fn invariant(msg: impl Into<String>) -> Self {
        Self::Invariant(msg.into())
    }

    /// Create a not-found error
    pub fn not_found(resource: impl Into<String>) -> Self {
        Self::NotFound(resource.into())
    }

    /// Create an invalid-input error
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }
}
