//! Wire types for the hook protocol spoken with the agent.
//!
//! Inbound documents arrive with whichever field spelling the agent
//! version uses, so every field accepts both camelCase and snake_case.
//! Outbound documents serialize "no opinion" as exactly `{}`; anything
//! else nests under `hookSpecificOutput` the way the agent expects.

use gate_primitives::{EventKind, ToolEvent, Verdict};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Longest reasoning text a denial message carries.
const MAX_REASON_LEN: usize = 1000;
/// Longest injected-context text a response carries.
const MAX_CONTEXT_LEN: usize = 500;

/// One inbound hook request, field spellings normalized.
#[derive(Clone, Debug, Deserialize)]
pub struct HookRequest {
    #[serde(
        rename = "hookEventName",
        alias = "hook_event_name",
        alias = "eventKind",
        alias = "event_kind"
    )]
    event_kind: String,
    #[serde(
        rename = "sessionId",
        alias = "session_id",
        alias = "conversationId",
        alias = "conversation_id"
    )]
    conversation_id: String,
    #[serde(
        default,
        rename = "toolName",
        alias = "tool_name"
    )]
    tool_name: Option<String>,
    #[serde(
        default,
        rename = "toolInput",
        alias = "tool_input",
        alias = "toolArguments",
        alias = "tool_arguments"
    )]
    tool_arguments: Option<Value>,
    #[serde(
        default,
        rename = "cwd",
        alias = "workingDirectory",
        alias = "working_directory"
    )]
    working_directory: Option<String>,
}

impl HookRequest {
    /// Parses a request from a raw JSON document.
    ///
    /// # Errors
    ///
    /// Returns the deserialization error when the document does not
    /// carry the required fields. The dispatcher treats this as
    /// malformed input and answers "no opinion."
    pub fn from_value(value: Value) -> Result<Self, serde_json::Error> {
        serde_json::from_value(value)
    }

    /// Raw event kind string as received.
    #[must_use]
    pub fn event_kind(&self) -> &str {
        &self.event_kind
    }

    /// Raw conversation identifier as received.
    #[must_use]
    pub fn conversation_id(&self) -> &str {
        &self.conversation_id
    }

    /// Tool name, when the event concerns one.
    #[must_use]
    pub fn tool_name(&self) -> Option<&str> {
        self.tool_name.as_deref()
    }

    /// Validates the request and builds the immutable event.
    ///
    /// # Errors
    ///
    /// Returns a primitive validation error when the event kind is
    /// unknown, the conversation id is malformed, or the tool name
    /// fails validation.
    pub fn into_event(self) -> gate_primitives::Result<ToolEvent> {
        let kind: EventKind = self.event_kind.parse()?;
        let conversation_id = self.conversation_id.parse()?;
        let mut builder = ToolEvent::builder(kind, conversation_id);
        if let Some(name) = self.tool_name {
            builder = builder.tool_name(name)?;
        }
        if let Some(arguments) = self.tool_arguments {
            builder = builder.tool_arguments(arguments);
        }
        if let Some(dir) = self.working_directory {
            builder = builder.working_directory(dir);
        }
        Ok(builder.build())
    }
}

/// Allow/deny decision nested in a permission response.
#[derive(Clone, Debug, Serialize)]
pub struct PermissionDecision {
    behavior: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    interrupt: Option<bool>,
}

/// Event-kind-specific payload of a populated response.
#[derive(Clone, Debug, Serialize)]
pub struct HookOutput {
    #[serde(rename = "hookEventName")]
    hook_event_name: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    decision: Option<PermissionDecision>,
    #[serde(
        rename = "permissionDecision",
        skip_serializing_if = "Option::is_none"
    )]
    permission_decision: Option<&'static str>,
    #[serde(
        rename = "permissionDecisionReason",
        skip_serializing_if = "Option::is_none"
    )]
    permission_decision_reason: Option<String>,
    #[serde(
        rename = "additionalContext",
        skip_serializing_if = "Option::is_none"
    )]
    additional_context: Option<String>,
}

/// One outbound hook response.
#[derive(Clone, Debug, Default, Serialize)]
pub struct HookResponse {
    #[serde(
        rename = "hookSpecificOutput",
        skip_serializing_if = "Option::is_none"
    )]
    hook_specific_output: Option<HookOutput>,
}

impl HookResponse {
    /// The empty response: the service has nothing to say.
    #[must_use]
    pub const fn no_opinion() -> Self {
        Self {
            hook_specific_output: None,
        }
    }

    /// Approves a permission request outright.
    #[must_use]
    pub fn permission_allow(kind: EventKind) -> Self {
        Self::with_output(HookOutput {
            hook_event_name: kind.as_str(),
            decision: Some(PermissionDecision {
                behavior: "allow",
                message: None,
                interrupt: None,
            }),
            permission_decision: None,
            permission_decision_reason: None,
            additional_context: None,
        })
    }

    /// Denies a permission request, carrying the verdict's score,
    /// threshold, and reasoning in the human-readable message.
    #[must_use]
    pub fn permission_deny(kind: EventKind, verdict: &Verdict) -> Self {
        let message = format!(
            "Safety score {} below threshold {}. Reason: {}",
            verdict.score(),
            verdict.threshold_used(),
            truncate(verdict.reasoning(), MAX_REASON_LEN),
        );
        Self::with_output(HookOutput {
            hook_event_name: kind.as_str(),
            decision: Some(PermissionDecision {
                behavior: "deny",
                message: Some(message),
                interrupt: verdict.interrupt().then_some(true),
            }),
            permission_decision: None,
            permission_decision_reason: None,
            additional_context: None,
        })
    }

    /// Answers a pre-tool event with the three-way permission decision.
    #[must_use]
    pub fn pre_tool(kind: EventKind, decision: &'static str, reason: Option<&str>) -> Self {
        Self::with_output(HookOutput {
            hook_event_name: kind.as_str(),
            decision: None,
            permission_decision: Some(decision),
            permission_decision_reason: reason.map(|text| truncate(text, MAX_REASON_LEN)),
            additional_context: None,
        })
    }

    /// Hands ambient context back to the agent without deciding
    /// anything.
    #[must_use]
    pub fn additional_context(kind: EventKind, context: &str) -> Self {
        Self::with_output(HookOutput {
            hook_event_name: kind.as_str(),
            decision: None,
            permission_decision: None,
            permission_decision_reason: None,
            additional_context: Some(truncate(context, MAX_CONTEXT_LEN)),
        })
    }

    /// Whether this response is the empty "no opinion" document.
    #[must_use]
    pub const fn is_no_opinion(&self) -> bool {
        self.hook_specific_output.is_none()
    }

    /// Serializes the response to its wire document.
    #[must_use]
    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or_else(|_| Value::Object(serde_json::Map::new()))
    }

    const fn with_output(output: HookOutput) -> Self {
        Self {
            hook_specific_output: Some(output),
        }
    }
}

fn truncate(text: &str, max_len: usize) -> String {
    if text.len() <= max_len {
        return text.to_owned();
    }
    let mut cut = max_len;
    while !text.is_char_boundary(cut) {
        cut -= 1;
    }
    text[..cut].to_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use gate_primitives::SafetyCategory;
    use serde_json::json;

    #[test]
    fn accepts_camel_case_fields() {
        let request = HookRequest::from_value(json!({
            "hookEventName": "PermissionRequest",
            "sessionId": "conv-1",
            "toolName": "Bash",
            "toolInput": {"command": "git status"},
            "cwd": "/tmp/project"
        }))
        .expect("parse");
        assert_eq!(request.event_kind(), "PermissionRequest");
        assert_eq!(request.tool_name(), Some("Bash"));

        let event = request.into_event().expect("event");
        assert_eq!(event.kind(), EventKind::PermissionRequest);
        assert_eq!(event.working_directory(), Some("/tmp/project"));
    }

    #[test]
    fn accepts_snake_case_fields() {
        let request = HookRequest::from_value(json!({
            "hook_event_name": "PreToolUse",
            "session_id": "conv-2",
            "tool_name": "Write",
            "tool_arguments": {"file_path": "/tmp/a"},
            "working_directory": "/tmp"
        }))
        .expect("parse");
        let event = request.into_event().expect("event");
        assert_eq!(event.kind(), EventKind::PreToolUse);
        assert_eq!(event.tool_name(), Some("Write"));
    }

    #[test]
    fn missing_conversation_id_fails_parse() {
        assert!(
            HookRequest::from_value(json!({"hookEventName": "Stop"})).is_err()
        );
    }

    #[test]
    fn unknown_event_kind_fails_event_construction() {
        let request = HookRequest::from_value(json!({
            "hookEventName": "NotAKind",
            "sessionId": "conv-1"
        }))
        .expect("parse");
        assert!(request.into_event().is_err());
    }

    #[test]
    fn no_opinion_serializes_to_empty_object() {
        let serialized =
            serde_json::to_string(&HookResponse::no_opinion()).expect("serialize");
        assert_eq!(serialized, "{}");
    }

    #[test]
    fn denial_message_carries_score_threshold_and_reasoning() {
        let verdict = Verdict::builder()
            .score(40)
            .threshold(95)
            .category(SafetyCategory::Dangerous)
            .reasoning("recursively deletes the repository")
            .build();
        let value = HookResponse::permission_deny(EventKind::PermissionRequest, &verdict)
            .to_value();

        let decision = &value["hookSpecificOutput"]["decision"];
        assert_eq!(decision["behavior"], "deny");
        assert_eq!(decision["interrupt"], true);
        let message = decision["message"].as_str().expect("message");
        assert!(message.contains("40"));
        assert!(message.contains("95"));
        assert!(message.contains("recursively deletes the repository"));
    }

    #[test]
    fn allow_response_omits_message_and_interrupt() {
        let value =
            HookResponse::permission_allow(EventKind::PermissionRequest).to_value();
        let decision = &value["hookSpecificOutput"]["decision"];
        assert_eq!(decision["behavior"], "allow");
        assert!(decision.get("message").is_none());
        assert!(decision.get("interrupt").is_none());
    }

    #[test]
    fn pre_tool_response_names_the_decision() {
        let value = HookResponse::pre_tool(EventKind::PreToolUse, "ask", Some("needs review"))
            .to_value();
        let output = &value["hookSpecificOutput"];
        assert_eq!(output["hookEventName"], "PreToolUse");
        assert_eq!(output["permissionDecision"], "ask");
        assert_eq!(output["permissionDecisionReason"], "needs review");
    }

    #[test]
    fn injected_context_is_truncated() {
        let long = "y".repeat(2000);
        let value =
            HookResponse::additional_context(EventKind::PostToolUse, &long).to_value();
        let context = value["hookSpecificOutput"]["additionalContext"]
            .as_str()
            .expect("context");
        assert_eq!(context.len(), 500);
    }

    #[test]
    fn oversized_reasoning_is_truncated_in_the_message() {
        let verdict = Verdict::builder()
            .score(10)
            .threshold(90)
            .reasoning("z".repeat(3000))
            .build();
        let value = HookResponse::permission_deny(EventKind::PermissionRequest, &verdict)
            .to_value();
        let message = value["hookSpecificOutput"]["decision"]["message"]
            .as_str()
            .expect("message");
        assert!(message.len() < 1100);
    }
}
