//! Core shared types for the toolgate decision service.

#![warn(missing_docs, clippy::pedantic)]

mod error;
mod event;
mod ids;
mod verdict;

/// Error type and result alias shared across the workspace.
pub use error::{Error, Result};
/// Tool-use events and their lifecycle kinds.
pub use event::{EventKind, ToolEvent, ToolEventBuilder, validate_tool_name};
/// Identifiers for conversations and logged events.
pub use ids::{ConversationId, EventId};
/// Normalized decision outcomes and risk categories.
pub use verdict::{DecisionLabel, SafetyCategory, Verdict, VerdictBuilder, clamp_score};
