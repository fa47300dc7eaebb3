//! Error types for the policy subsystem.

use serde_json::Error as SerdeError;
use thiserror::Error;

/// Errors emitted by policy components.
#[derive(Debug, Error)]
pub enum PolicyError {
    /// A handler rule failed validation.
    #[error("invalid handler rule: {0}")]
    InvalidRule(&'static str),

    /// Underlying I/O failure while persisting policy state.
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

/// Result alias for policy operations.
pub type PolicyResult<T> = Result<T, PolicyError>;
