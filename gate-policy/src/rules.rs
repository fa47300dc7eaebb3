//! Handler rules mapping events to decision behaviors.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use gate_primitives::EventKind;

use crate::error::{PolicyError, PolicyResult};
use crate::matcher::PatternMatcher;

const fn default_approve_threshold() -> u8 {
    80
}

const fn default_true() -> bool {
    true
}

/// Severity at which a log-only handler records its event.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogLevel {
    /// Developer-level detail.
    Debug,
    /// Routine operational record.
    #[default]
    Info,
    /// Something went wrong but dispatch continues.
    Warn,
}

/// Decision behavior a handler rule selects.
///
/// A closed set: adding a behavior means adding a variant here and its
/// arm in the dispatcher, not registering anything dynamically.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BehaviorKind {
    /// Score the event through the external evaluator and compare
    /// against the rule's threshold.
    Evaluate,
    /// Run deterministic local checks against the rule's options without
    /// consulting the evaluator.
    Validate,
    /// Ask the evaluator for ambient context to hand back to the agent;
    /// never approves or denies.
    InjectContext,
    /// Event-specific bookkeeping (session start/end housekeeping).
    Custom,
    /// Record the event and stop.
    LogOnly {
        /// Severity to record at.
        #[serde(default)]
        level: LogLevel,
    },
}

impl BehaviorKind {
    /// Stable label for logging.
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            BehaviorKind::Evaluate => "evaluate",
            BehaviorKind::Validate => "validate",
            BehaviorKind::InjectContext => "inject_context",
            BehaviorKind::Custom => "custom",
            BehaviorKind::LogOnly { .. } => "log_only",
        }
    }
}

/// One configured handler rule.
///
/// Identity within a rule set is positional: rules are consulted in
/// configured order and the first whose pattern matches wins.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct HandlerRule {
    name: String,
    /// Tool-name pattern; absent, empty, or `*` matches every tool.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    match_pattern: Option<String>,
    behavior: BehaviorKind,
    /// Template for the evaluator prompt; the built-in default applies
    /// when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    evaluator_template: Option<String>,
    #[serde(default = "default_approve_threshold")]
    approve_threshold: u8,
    #[serde(default = "default_true")]
    auto_approve_enabled: bool,
    /// Behavior-specific options (validation patterns, custom keys).
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    options: Map<String, Value>,
}

impl HandlerRule {
    /// Creates a rule after validating its name and threshold.
    ///
    /// # Errors
    ///
    /// Returns [`PolicyError::InvalidRule`] when the name is empty or the
    /// threshold exceeds 100.
    pub fn new(name: impl Into<String>, behavior: BehaviorKind) -> PolicyResult<Self> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(PolicyError::InvalidRule("rule name cannot be empty"));
        }
        Ok(Self {
            name,
            match_pattern: None,
            behavior,
            evaluator_template: None,
            approve_threshold: default_approve_threshold(),
            auto_approve_enabled: true,
            options: Map::new(),
        })
    }

    /// Sets the tool-name pattern.
    #[must_use]
    pub fn with_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.match_pattern = Some(pattern.into());
        self
    }

    /// Sets the evaluator prompt template.
    #[must_use]
    pub fn with_template(mut self, template: impl Into<String>) -> Self {
        self.evaluator_template = Some(template.into());
        self
    }

    /// Sets the approval threshold.
    ///
    /// # Errors
    ///
    /// Returns [`PolicyError::InvalidRule`] when the threshold exceeds 100.
    pub fn with_threshold(mut self, threshold: u8) -> PolicyResult<Self> {
        if threshold > 100 {
            return Err(PolicyError::InvalidRule("approve threshold must be <= 100"));
        }
        self.approve_threshold = threshold;
        Ok(self)
    }

    /// Enables or disables automatic approval for this rule.
    #[must_use]
    pub fn with_auto_approve(mut self, enabled: bool) -> Self {
        self.auto_approve_enabled = enabled;
        self
    }

    /// Attaches a behavior-specific option.
    #[must_use]
    pub fn with_option(mut self, key: impl Into<String>, value: Value) -> Self {
        self.options.insert(key.into(), value);
        self
    }

    /// Rule name used in logs and the session record.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Tool-name pattern, when configured.
    #[must_use]
    pub fn match_pattern(&self) -> Option<&str> {
        self.match_pattern.as_deref()
    }

    /// Behavior this rule selects.
    #[must_use]
    pub const fn behavior(&self) -> &BehaviorKind {
        &self.behavior
    }

    /// Evaluator prompt template, when configured.
    #[must_use]
    pub fn evaluator_template(&self) -> Option<&str> {
        self.evaluator_template.as_deref()
    }

    /// Score required for automatic approval.
    #[must_use]
    pub const fn approve_threshold(&self) -> u8 {
        self.approve_threshold
    }

    /// Whether this rule may approve automatically.
    #[must_use]
    pub const fn auto_approve_enabled(&self) -> bool {
        self.auto_approve_enabled
    }

    /// Behavior-specific options.
    #[must_use]
    pub const fn options(&self) -> &Map<String, Value> {
        &self.options
    }
}

/// Every configured handler rule, grouped by event kind.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RuleSet {
    #[serde(default = "default_true")]
    enabled: bool,
    #[serde(default)]
    rules: HashMap<EventKind, Vec<HandlerRule>>,
}

impl Default for RuleSet {
    fn default() -> Self {
        Self::new()
    }
}

impl RuleSet {
    /// Creates an empty, enabled rule set.
    #[must_use]
    pub fn new() -> Self {
        Self {
            enabled: true,
            rules: HashMap::new(),
        }
    }

    /// Disables every rule; resolution then finds nothing.
    #[must_use]
    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    /// Whether the rule set participates in dispatch.
    #[must_use]
    pub const fn enabled(&self) -> bool {
        self.enabled
    }

    /// Registers a rule at the end of the order for its event kind.
    pub fn register(&mut self, kind: EventKind, rule: HandlerRule) {
        self.rules.entry(kind).or_default().push(rule);
    }

    /// Rules registered for one event kind, in configured order.
    #[must_use]
    pub fn rules_for(&self, kind: EventKind) -> &[HandlerRule] {
        self.rules.get(&kind).map_or(&[], Vec::as_slice)
    }

    /// Event kinds that have at least one rule.
    #[must_use]
    pub fn registered_kinds(&self) -> Vec<EventKind> {
        let mut kinds: Vec<_> = EventKind::ALL
            .into_iter()
            .filter(|kind| !self.rules_for(*kind).is_empty())
            .collect();
        kinds.sort_unstable();
        kinds
    }

    /// Resolves the first rule for `kind` whose pattern matches the tool
    /// name, or `None` when the set is disabled or nothing matches.
    #[must_use]
    pub fn resolve(
        &self,
        kind: EventKind,
        tool_name: Option<&str>,
        matcher: &PatternMatcher,
    ) -> Option<&HandlerRule> {
        if !self.enabled {
            return None;
        }
        self.rules_for(kind)
            .iter()
            .find(|rule| matcher.matches(tool_name, rule.match_pattern()))
    }

    /// Every distinct pattern text currently configured, for cache sync.
    #[must_use]
    pub fn pattern_texts(&self) -> Vec<String> {
        let mut patterns: Vec<String> = self
            .rules
            .values()
            .flatten()
            .filter_map(|rule| rule.match_pattern().map(str::to_owned))
            .collect();
        patterns.sort_unstable();
        patterns.dedup();
        patterns
    }
}
