//! Error types for hook document synchronization.

use serde_json::Error as SerdeError;
use thiserror::Error;

/// Errors emitted while reading or rewriting the hook document.
#[derive(Debug, Error)]
pub enum HookError {
    /// The document exists but has a shape we refuse to rewrite.
    #[error("hook document malformed: {0}")]
    Document(&'static str),

    /// Underlying I/O failure on the document file.
    #[error("i/o error: {source}")]
    Io {
        /// Source [`std::io::Error`].
        #[from]
        source: std::io::Error,
    },

    /// The rewritten document failed to serialize.
    #[error("serialization error: {source}")]
    Serialization {
        /// Source [`serde_json::Error`].
        #[from]
        source: SerdeError,
    },
}

/// Result alias for hook synchronization operations.
pub type HookResult<T> = Result<T, HookError>;
