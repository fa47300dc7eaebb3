//! Error types for the session subsystem.

use serde_json::Error as SerdeError;
use thiserror::Error;

/// Errors emitted by session components.
#[derive(Debug, Error)]
pub enum SessionError {
    /// The provided configuration was invalid.
    #[error("invalid session configuration: {0}")]
    InvalidConfig(&'static str),

    /// Underlying I/O failure while reading or writing conversation files.
    #[error("i/o error: {source}")]
    Io {
        /// Source [`std::io::Error`].
        #[from]
        source: std::io::Error,
    },

    /// Serialization or deserialization error.
    #[error("serialization error: {source}")]
    Serialization {
        /// Source [`serde_json::Error`].
        #[from]
        source: SerdeError,
    },
}

/// Result type alias for session operations.
pub type SessionResult<T> = Result<T, SessionError>;
