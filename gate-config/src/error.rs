//! Error types for configuration loading and validation.

use serde_json::Error as SerdeError;
use thiserror::Error;

/// Errors emitted while loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The document parsed but violates a structural constraint.
    #[error("invalid configuration: {0}")]
    Invalid(&'static str),

    /// Underlying I/O failure while reading the document.
    #[error("i/o error: {source}")]
    Io {
        /// Source [`std::io::Error`].
        #[from]
        source: std::io::Error,
    },

    /// The document is not well-formed JSON for the expected schema.
    #[error("configuration parse error: {source}")]
    Parse {
        /// Source [`serde_json::Error`].
        #[from]
        source: SerdeError,
    },
}

/// Result alias for configuration operations.
pub type ConfigResult<T> = Result<T, ConfigError>;
