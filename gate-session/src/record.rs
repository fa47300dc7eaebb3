//! Record types for the per-conversation event log.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use gate_primitives::{ConversationId, DecisionLabel, EventId, ToolEvent, Verdict};

const MAX_RENDERED_CONTENT_LEN: usize = 200;

/// One logged event together with the decision made about it.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EventRecord {
    id: EventId,
    event: ToolEvent,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    verdict: Option<Verdict>,
    decision: DecisionLabel,
    /// True when enforcement gating downgraded the surfaced response
    /// relative to the recorded decision.
    #[serde(default)]
    gated: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    rule_name: Option<String>,
}

impl EventRecord {
    /// Creates a builder for a new event record.
    #[must_use]
    pub fn builder(event: ToolEvent) -> EventRecordBuilder {
        EventRecordBuilder {
            id: EventId::random(),
            event,
            verdict: None,
            decision: DecisionLabel::NoOpinion,
            gated: false,
            rule_name: None,
        }
    }

    /// Unique identifier of the record.
    #[must_use]
    pub const fn id(&self) -> EventId {
        self.id
    }

    /// The logged event.
    #[must_use]
    pub const fn event(&self) -> &ToolEvent {
        &self.event
    }

    /// Verdict produced for the event, when one was computed.
    #[must_use]
    pub const fn verdict(&self) -> Option<&Verdict> {
        self.verdict.as_ref()
    }

    /// Decision the service actually reached, before gating.
    #[must_use]
    pub const fn decision(&self) -> DecisionLabel {
        self.decision
    }

    /// Whether the surfaced response was downgraded by the gate.
    #[must_use]
    pub const fn gated(&self) -> bool {
        self.gated
    }

    /// Name of the handler rule that matched, if any.
    #[must_use]
    pub fn rule_name(&self) -> Option<&str> {
        self.rule_name.as_deref()
    }

    /// Renders one context line for this record.
    #[must_use]
    pub fn render_line(&self) -> String {
        let mut line = format!(
            "[{}] {}",
            self.event.received_at().format("%Y-%m-%dT%H:%M:%SZ"),
            self.event.kind()
        );
        if let Some(tool) = self.event.tool_name() {
            line.push(' ');
            line.push_str(tool);
        }
        line.push_str(&format!(" decision={}", self.decision));
        if let Some(verdict) = &self.verdict {
            line.push_str(&format!(" score={}", verdict.score()));
        }
        if let Some(arguments) = self.event.tool_arguments() {
            let mut content = arguments.to_string();
            if content.len() > MAX_RENDERED_CONTENT_LEN {
                let mut cut = MAX_RENDERED_CONTENT_LEN;
                while !content.is_char_boundary(cut) {
                    cut -= 1;
                }
                content.truncate(cut);
                content.push_str("...");
            }
            line.push(' ');
            line.push_str(&content);
        }
        line
    }
}

/// Builder type used to assemble [`EventRecord`] instances.
#[derive(Debug)]
pub struct EventRecordBuilder {
    id: EventId,
    event: ToolEvent,
    verdict: Option<Verdict>,
    decision: DecisionLabel,
    gated: bool,
    rule_name: Option<String>,
}

impl EventRecordBuilder {
    /// Attaches the computed verdict.
    #[must_use]
    pub fn verdict(mut self, verdict: Verdict) -> Self {
        self.verdict = Some(verdict);
        self
    }

    /// Records the decision reached before gating.
    #[must_use]
    pub fn decision(mut self, decision: DecisionLabel) -> Self {
        self.decision = decision;
        self
    }

    /// Marks the record as gated: the response surfaced to the agent was
    /// downgraded relative to the recorded decision.
    #[must_use]
    pub fn gated(mut self, gated: bool) -> Self {
        self.gated = gated;
        self
    }

    /// Names the handler rule that matched.
    #[must_use]
    pub fn rule_name(mut self, name: impl Into<String>) -> Self {
        self.rule_name = Some(name.into());
        self
    }

    /// Finalizes the record.
    #[must_use]
    pub fn build(self) -> EventRecord {
        EventRecord {
            id: self.id,
            event: self.event,
            verdict: self.verdict,
            decision: self.decision,
            gated: self.gated,
            rule_name: self.rule_name,
        }
    }
}

/// Full bounded event log of one conversation.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ConversationRecord {
    conversation_id: ConversationId,
    created_at: DateTime<Utc>,
    last_active_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    working_directory: Option<String>,
    log: VecDeque<EventRecord>,
}

impl ConversationRecord {
    /// Creates an empty record for a fresh conversation.
    #[must_use]
    pub fn new(conversation_id: ConversationId) -> Self {
        let now = Utc::now();
        Self {
            conversation_id,
            created_at: now,
            last_active_at: now,
            working_directory: None,
            log: VecDeque::new(),
        }
    }

    /// Appends a record, evicting oldest entries beyond `max_events` and
    /// refreshing activity metadata.
    pub fn append(&mut self, record: EventRecord, max_events: usize) {
        if let Some(dir) = record.event().working_directory() {
            self.working_directory = Some(dir.to_owned());
        }
        self.log.push_back(record);
        while self.log.len() > max_events {
            self.log.pop_front();
        }
        self.touch();
    }

    /// Refreshes the last-activity timestamp.
    pub fn touch(&mut self) {
        self.last_active_at = Utc::now();
    }

    /// Conversation this log belongs to.
    #[must_use]
    pub const fn conversation_id(&self) -> &ConversationId {
        &self.conversation_id
    }

    /// When the conversation was first seen.
    #[must_use]
    pub const fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// When the conversation last produced an event.
    #[must_use]
    pub const fn last_active_at(&self) -> DateTime<Utc> {
        self.last_active_at
    }

    /// Most recently observed working directory.
    #[must_use]
    pub fn working_directory(&self) -> Option<&str> {
        self.working_directory.as_deref()
    }

    /// The ordered event log, oldest first.
    #[must_use]
    pub const fn log(&self) -> &VecDeque<EventRecord> {
        &self.log
    }

    /// Renders the most recent `max_events` entries chronologically.
    #[must_use]
    pub fn render_context(&self, max_events: usize) -> String {
        let skip = self.log.len().saturating_sub(max_events);
        self.log
            .iter()
            .skip(skip)
            .map(EventRecord::render_line)
            .collect::<Vec<_>>()
            .join("\n")
    }
}
