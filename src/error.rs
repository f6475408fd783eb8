//! Indexer error types

use thiserror::Error;

/// NNTP protocol, persistence and configuration errors
#[derive(Error, Debug)]
pub enum Error {
    /// IO error during network operations
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// TLS error during secure connection
    #[error("TLS error: {0}")]
    Tls(String),

    /// Connection or read timeout
    #[error("Connection timeout")]
    Timeout,

    /// Invalid response from server (garbage status line, missing terminator)
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// NNTP protocol error with response code
    #[error("NNTP error {code}: {message}")]
    Protocol {
        /// NNTP response code (e.g., 411, 412, 502)
        code: u16,
        /// Error message from server
        message: String,
    },

    /// Authentication rejected (481/482/502)
    #[error("Authentication failed: {0}")]
    AuthFailed(String),

    /// No such newsgroup
    #[error("No such newsgroup: {0}")]
    NoSuchGroup(String),

    /// Server returned 423 for an article-number range
    #[error("No articles in range {low}-{high}")]
    NoSuchRange {
        /// Low article number of the rejected range
        low: u64,
        /// High article number of the rejected range
        high: u64,
    },

    /// Connection closed unexpectedly
    #[error("Connection closed")]
    ConnectionClosed,

    /// Missing or invalid configuration value
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable description of the problem
        message: String,
        /// The configuration key that caused the error, if known
        key: Option<String>,
    },

    /// Article index persistence failure
    #[error("store error: {0}")]
    Store(#[from] sqlx::Error),

    /// Run was cancelled before completion
    #[error("Cancelled")]
    Cancelled,

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Whether a chunk fetch that hit this error may be retried on a fresh
    /// connection.
    ///
    /// Transport-level faults are retryable; authentication, configuration,
    /// persistence and 423 range errors are not.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::Io(_)
                | Error::Tls(_)
                | Error::Timeout
                | Error::InvalidResponse(_)
                | Error::Protocol { .. }
                | Error::ConnectionClosed
        )
    }

    /// Process exit code for drivers wrapping the indexer core.
    ///
    /// Partial failure (exit 4) is not an error; it is reported through
    /// [`RunReport::exit_code`](crate::indexer::RunReport::exit_code).
    pub fn exit_code(&self) -> i32 {
        match self {
            Error::Config { .. } => 2,
            Error::AuthFailed(_) => 3,
            Error::Cancelled => 5,
            _ => 1,
        }
    }

    /// Shorthand for a [`Error::Config`] with a known key
    pub fn config(key: &str, message: impl Into<String>) -> Self {
        Error::Config {
            message: message.into(),
            key: Some(key.to_string()),
        }
    }
}

/// Result type alias using the indexer [`Error`]
pub type Result<T> = std::result::Result<T, Error>;
