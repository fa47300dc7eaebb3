//! Tool-use events submitted by the coding agent.

use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Error, Result};
use crate::ids::ConversationId;

const MAX_TOOL_NAME_LEN: usize = 256;

/// Lifecycle point at which the agent consulted the service.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
pub enum EventKind {
    /// The agent is asking whether a pending tool call may run.
    PermissionRequest,
    /// A tool call is about to execute.
    PreToolUse,
    /// A tool call finished successfully.
    PostToolUse,
    /// A tool call finished with a failure.
    PostToolUseFailure,
    /// The human submitted a prompt to the agent.
    UserPromptSubmit,
    /// A new agent session began.
    SessionStart,
    /// An agent session ended.
    SessionEnd,
    /// The agent finished responding.
    Stop,
    /// A delegated subagent began work.
    SubagentStart,
    /// A delegated subagent finished work.
    SubagentStop,
    /// The agent is about to compact its context window.
    PreCompact,
    /// The agent environment is being initialized.
    Setup,
    /// The agent emitted an informational notification.
    Notification,
}

impl EventKind {
    /// Every kind the service understands, in stable order.
    pub const ALL: [EventKind; 13] = [
        EventKind::PermissionRequest,
        EventKind::PreToolUse,
        EventKind::PostToolUse,
        EventKind::PostToolUseFailure,
        EventKind::UserPromptSubmit,
        EventKind::SessionStart,
        EventKind::SessionEnd,
        EventKind::Stop,
        EventKind::SubagentStart,
        EventKind::SubagentStop,
        EventKind::PreCompact,
        EventKind::Setup,
        EventKind::Notification,
    ];

    /// Returns the wire spelling of the kind.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            EventKind::PermissionRequest => "PermissionRequest",
            EventKind::PreToolUse => "PreToolUse",
            EventKind::PostToolUse => "PostToolUse",
            EventKind::PostToolUseFailure => "PostToolUseFailure",
            EventKind::UserPromptSubmit => "UserPromptSubmit",
            EventKind::SessionStart => "SessionStart",
            EventKind::SessionEnd => "SessionEnd",
            EventKind::Stop => "Stop",
            EventKind::SubagentStart => "SubagentStart",
            EventKind::SubagentStop => "SubagentStop",
            EventKind::PreCompact => "PreCompact",
            EventKind::Setup => "Setup",
            EventKind::Notification => "Notification",
        }
    }

    /// Whether events of this kind describe a specific tool invocation.
    #[must_use]
    pub const fn is_tool_scoped(self) -> bool {
        matches!(
            self,
            EventKind::PermissionRequest
                | EventKind::PreToolUse
                | EventKind::PostToolUse
                | EventKind::PostToolUseFailure
        )
    }
}

impl Display for EventKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        EventKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| Error::UnknownEventKind { kind: s.to_owned() })
    }
}

/// Validates a tool name arriving from the agent.
///
/// # Errors
///
/// Returns [`Error::InvalidToolName`] if the name is empty or longer than
/// 256 characters.
pub fn validate_tool_name(name: &str) -> Result<()> {
    if name.trim().is_empty() {
        return Err(Error::invalid_tool_name("tool name cannot be empty"));
    }
    if name.len() > MAX_TOOL_NAME_LEN {
        return Err(Error::invalid_tool_name(format!(
            "tool name length must be <= {MAX_TOOL_NAME_LEN}"
        )));
    }
    Ok(())
}

/// One tool-use event as received from the agent.
///
/// Events are immutable once constructed; the dispatcher builds one per
/// inbound request and every downstream component borrows it.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ToolEvent {
    kind: EventKind,
    conversation_id: ConversationId,
    tool_name: Option<String>,
    tool_arguments: Option<Value>,
    working_directory: Option<String>,
    received_at: DateTime<Utc>,
}

impl ToolEvent {
    /// Starts building an event for the given kind and conversation.
    #[must_use]
    pub fn builder(kind: EventKind, conversation_id: ConversationId) -> ToolEventBuilder {
        ToolEventBuilder {
            kind,
            conversation_id,
            tool_name: None,
            tool_arguments: None,
            working_directory: None,
        }
    }

    /// Lifecycle point this event describes.
    #[must_use]
    pub const fn kind(&self) -> EventKind {
        self.kind
    }

    /// Session the event belongs to.
    #[must_use]
    pub const fn conversation_id(&self) -> &ConversationId {
        &self.conversation_id
    }

    /// Name of the tool being invoked, when the kind carries one.
    #[must_use]
    pub fn tool_name(&self) -> Option<&str> {
        self.tool_name.as_deref()
    }

    /// Raw tool arguments as supplied by the agent.
    #[must_use]
    pub const fn tool_arguments(&self) -> Option<&Value> {
        self.tool_arguments.as_ref()
    }

    /// Directory the agent was operating in.
    #[must_use]
    pub fn working_directory(&self) -> Option<&str> {
        self.working_directory.as_deref()
    }

    /// Server-side receipt timestamp.
    #[must_use]
    pub const fn received_at(&self) -> DateTime<Utc> {
        self.received_at
    }
}

/// Builder for [`ToolEvent`].
#[derive(Debug)]
pub struct ToolEventBuilder {
    kind: EventKind,
    conversation_id: ConversationId,
    tool_name: Option<String>,
    tool_arguments: Option<Value>,
    working_directory: Option<String>,
}

impl ToolEventBuilder {
    /// Sets the tool name after validating it.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidToolName`] if the name is empty or too long.
    pub fn tool_name(mut self, name: impl Into<String>) -> Result<Self> {
        let name = name.into();
        validate_tool_name(&name)?;
        self.tool_name = Some(name);
        Ok(self)
    }

    /// Attaches the raw tool arguments document.
    #[must_use]
    pub fn tool_arguments(mut self, arguments: Value) -> Self {
        self.tool_arguments = Some(arguments);
        self
    }

    /// Records the agent's working directory.
    #[must_use]
    pub fn working_directory(mut self, dir: impl Into<String>) -> Self {
        self.working_directory = Some(dir.into());
        self
    }

    /// Finalizes the event, stamping the receipt time.
    #[must_use]
    pub fn build(self) -> ToolEvent {
        ToolEvent {
            kind: self.kind,
            conversation_id: self.conversation_id,
            tool_name: self.tool_name,
            tool_arguments: self.tool_arguments,
            working_directory: self.working_directory,
            received_at: Utc::now(),
        }
    }
}
