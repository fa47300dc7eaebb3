//! Shared error definitions for gate primitives.

use thiserror::Error;

/// Result alias used throughout the decision service.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while manipulating primitive types.
#[derive(Debug, Error)]
pub enum Error {
    /// The supplied conversation identifier failed validation.
    #[error("invalid conversation id `{id}`: {reason}")]
    InvalidConversationId {
        /// The offending identifier string, truncated for display.
        id: String,
        /// Human-readable reason for rejection.
        reason: String,
    },

    /// The supplied tool name failed validation.
    #[error("invalid tool name: {reason}")]
    InvalidToolName {
        /// Human-readable reason for rejection.
        reason: String,
    },

    /// The supplied event kind is not one the service understands.
    #[error("unknown event kind `{kind}`")]
    UnknownEventKind {
        /// The unrecognized kind string.
        kind: String,
    },

    /// The supplied safety category is not one the service understands.
    #[error("unknown safety category `{category}`")]
    UnknownCategory {
        /// The unrecognized category string.
        category: String,
    },
}

impl Error {
    /// Builds an [`Error::InvalidConversationId`] with a display-safe id.
    #[must_use]
    pub fn invalid_conversation_id(id: &str, reason: impl Into<String>) -> Self {
        let mut id = id.to_owned();
        id.truncate(40);
        Self::InvalidConversationId {
            id,
            reason: reason.into(),
        }
    }

    /// Builds an [`Error::InvalidToolName`].
    #[must_use]
    pub fn invalid_tool_name(reason: impl Into<String>) -> Self {
        Self::InvalidToolName {
            reason: reason.into(),
        }
    }
}
