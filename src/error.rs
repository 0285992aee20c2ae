//! Error types for chat-media-dl
//!
//! Per-item failures inside a download run are absorbed and counted; the variants here are
//! what escapes to callers (enumeration failures, configuration problems, report I/O) and
//! what a single transfer attempt can fail with before the retry logic folds it into an
//! outcome.

use thiserror::Error;

/// Result type alias for chat-media-dl operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for chat-media-dl
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g., "checkpoint_interval")
        key: Option<String>,
    },

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The remote message service failed (enumeration, resolution or byte transfer)
    #[error("message source error: {0}")]
    Source(String),

    /// A message carried media that could not be turned into a downloadable item
    #[error("invalid message {message_id}: {reason}")]
    InvalidMessage {
        /// Message the media was attached to
        message_id: i64,
        /// Why the attachment was rejected
        reason: String,
    },

    /// The operation observed a cancellation signal
    #[error("operation cancelled")]
    Cancelled,

    /// Other error
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Build a [`Error::Source`] from anything displayable
    pub fn source(err: impl std::fmt::Display) -> Self {
        Error::Source(err.to_string())
    }

    /// Build a [`Error::Config`] for a specific key
    pub fn config(key: &str, message: impl Into<String>) -> Self {
        Error::Config {
            message: message.into(),
            key: Some(key.to_string()),
        }
    }

    /// Whether this error is the cancellation signal rather than a real failure
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Error::Cancelled)
    }
}
