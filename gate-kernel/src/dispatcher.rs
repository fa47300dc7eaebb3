//! The decision pipeline executed for every inbound hook event.

use std::sync::Arc;
use std::time::{Duration, Instant};

use regex::RegexBuilder;
use serde_json::Value;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use gate_config::{ConfigHandle, GateConfig};
use gate_evaluator::{EvaluatorError, SafetyEvaluator};
use gate_policy::{
    gate, BehaviorKind, CalibrationEngine, EnforcementMode, EnforcementState, HandlerRule,
    LogLevel, PatternMatcher,
};
use gate_primitives::{DecisionLabel, EventKind, SafetyCategory, ToolEvent, Verdict};
use gate_prompts::JudgmentPrompt;
use gate_session::{EventRecord, SessionStore};

use crate::error::{KernelError, KernelResult};
use crate::wire::{HookRequest, HookResponse};

/// Executes the decision pipeline for inbound hook events.
///
/// `dispatch` never returns an error: every fault on the hot path
/// degrades to the empty "no opinion" response, because the agent's
/// only fallback is asking the human anyway. Real errors are reserved
/// for the administrative surface.
pub struct Dispatcher {
    config: Arc<ConfigHandle>,
    enforcement: Arc<EnforcementState>,
    sessions: Arc<SessionStore>,
    calibration: Arc<CalibrationEngine>,
    matcher: Arc<PatternMatcher>,
    evaluator: Arc<dyn SafetyEvaluator>,
}

/// Builder assembling a [`Dispatcher`] from its shared components.
#[derive(Default)]
pub struct DispatcherBuilder {
    config: Option<Arc<ConfigHandle>>,
    enforcement: Option<Arc<EnforcementState>>,
    sessions: Option<Arc<SessionStore>>,
    calibration: Option<Arc<CalibrationEngine>>,
    matcher: Option<Arc<PatternMatcher>>,
    evaluator: Option<Arc<dyn SafetyEvaluator>>,
}

impl DispatcherBuilder {
    /// Sets the shared configuration handle.
    #[must_use]
    pub fn config(mut self, config: Arc<ConfigHandle>) -> Self {
        self.config = Some(config);
        self
    }

    /// Sets the process-wide enforcement state.
    #[must_use]
    pub fn enforcement(mut self, enforcement: Arc<EnforcementState>) -> Self {
        self.enforcement = Some(enforcement);
        self
    }

    /// Sets the session store.
    #[must_use]
    pub fn sessions(mut self, sessions: Arc<SessionStore>) -> Self {
        self.sessions = Some(sessions);
        self
    }

    /// Sets the calibration engine.
    #[must_use]
    pub fn calibration(mut self, calibration: Arc<CalibrationEngine>) -> Self {
        self.calibration = Some(calibration);
        self
    }

    /// Sets the shared pattern matcher; a fresh one is created when
    /// omitted.
    #[must_use]
    pub fn matcher(mut self, matcher: Arc<PatternMatcher>) -> Self {
        self.matcher = Some(matcher);
        self
    }

    /// Sets the safety-oracle adapter.
    #[must_use]
    pub fn evaluator(mut self, evaluator: Arc<dyn SafetyEvaluator>) -> Self {
        self.evaluator = Some(evaluator);
        self
    }

    /// Finalizes the dispatcher.
    ///
    /// # Errors
    ///
    /// Returns [`KernelError::Misconfigured`] naming the first missing
    /// component.
    pub fn build(self) -> KernelResult<Dispatcher> {
        Ok(Dispatcher {
            config: self
                .config
                .ok_or(KernelError::Misconfigured("config handle is required"))?,
            enforcement: self
                .enforcement
                .ok_or(KernelError::Misconfigured("enforcement state is required"))?,
            sessions: self
                .sessions
                .ok_or(KernelError::Misconfigured("session store is required"))?,
            calibration: self
                .calibration
                .ok_or(KernelError::Misconfigured("calibration engine is required"))?,
            matcher: self.matcher.unwrap_or_default(),
            evaluator: self
                .evaluator
                .ok_or(KernelError::Misconfigured("evaluator is required"))?,
        })
    }
}

/// What running one behavior concluded, before gating.
struct BehaviorOutcome {
    verdict: Option<Verdict>,
    decision: DecisionLabel,
}

impl BehaviorOutcome {
    const fn silent() -> Self {
        Self {
            verdict: None,
            decision: DecisionLabel::NoOpinion,
        }
    }
}

impl Dispatcher {
    /// Starts assembling a dispatcher.
    #[must_use]
    pub fn builder() -> DispatcherBuilder {
        DispatcherBuilder::default()
    }

    /// The shared pattern matcher, for cache resync on config reload.
    #[must_use]
    pub fn matcher(&self) -> &Arc<PatternMatcher> {
        &self.matcher
    }

    /// Handles one raw inbound hook document.
    ///
    /// Malformed documents, unknown event kinds, and invalid
    /// identifiers all degrade to the empty response.
    pub async fn dispatch(&self, request: Value) -> HookResponse {
        let request = match HookRequest::from_value(request) {
            Ok(request) => request,
            Err(err) => {
                debug!(error = %err, "malformed hook request, no opinion");
                return HookResponse::no_opinion();
            }
        };
        let event = match request.into_event() {
            Ok(event) => event,
            Err(err) => {
                debug!(error = %err, "invalid hook request fields, no opinion");
                return HookResponse::no_opinion();
            }
        };
        self.dispatch_event(event).await
    }

    /// Handles an already-validated event.
    pub async fn dispatch_event(&self, event: ToolEvent) -> HookResponse {
        let config = self.config.current();
        let mode = self.enforcement.mode();

        if let Some(tool) = event.tool_name() {
            if config.is_pass_through(tool) {
                info!(
                    tool,
                    conversation = %event.conversation_id(),
                    "pass-through tool, no opinion"
                );
                self.record(&event, BehaviorOutcome::silent(), false, None)
                    .await;
                return HookResponse::no_opinion();
            }
        }

        let Some(rule) = config
            .rules()
            .resolve(event.kind(), event.tool_name(), &self.matcher)
        else {
            debug!(kind = %event.kind(), "no handler rule matched, no opinion");
            return HookResponse::no_opinion();
        };

        let outcome = if mode == EnforcementMode::Observe
            && !config.dispatch().evaluate_in_observe()
        {
            BehaviorOutcome::silent()
        } else {
            self.run_behavior(rule, &event, &config).await
        };

        if let (Some(tool), Some(verdict)) = (event.tool_name(), outcome.verdict.as_ref()) {
            if let Err(err) = self
                .calibration
                .record_decision(tool, verdict.score(), outcome.decision)
                .await
            {
                warn!(tool, error = %err, "calibration state not persisted");
            }
        }

        let gated = gate(mode, outcome.decision);
        let surfaced = gated.surfaced();
        let verdict = outcome.verdict.clone();
        self.record(&event, outcome, gated.downgraded(), Some(rule.name()))
            .await;

        if mode == EnforcementMode::Observe {
            return HookResponse::no_opinion();
        }
        translate(event.kind(), surfaced, verdict.as_ref())
    }

    async fn run_behavior(
        &self,
        rule: &HandlerRule,
        event: &ToolEvent,
        config: &GateConfig,
    ) -> BehaviorOutcome {
        match rule.behavior() {
            BehaviorKind::LogOnly { level } => {
                log_event(*level, rule, event);
                BehaviorOutcome::silent()
            }
            BehaviorKind::Custom => self.run_custom(event).await,
            BehaviorKind::Validate => run_validate(rule, event),
            BehaviorKind::Evaluate => self.run_evaluate(rule, event, config).await,
            BehaviorKind::InjectContext => self.run_inject_context(rule, event, config).await,
        }
    }

    async fn run_evaluate(
        &self,
        rule: &HandlerRule,
        event: &ToolEvent,
        config: &GateConfig,
    ) -> BehaviorOutcome {
        let threshold = rule.approve_threshold();
        let Some(prompt) = self.render_prompt(rule, event, config).await else {
            return BehaviorOutcome::silent();
        };

        let started = Instant::now();
        match self.call_evaluator(&prompt, config).await {
            Ok(judgment) => {
                let latency = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
                let verdict = Verdict::builder()
                    .score(i64::from(judgment.score()))
                    .reasoning(judgment.reasoning())
                    .category(judgment.category())
                    .threshold(threshold)
                    .latency_ms(latency)
                    .build();
                let decision = decision_label(event.kind(), &verdict, rule, config);
                debug!(
                    rule = rule.name(),
                    score = verdict.score(),
                    threshold,
                    decision = %decision,
                    latency_ms = latency,
                    "event evaluated"
                );
                BehaviorOutcome {
                    verdict: Some(verdict),
                    decision,
                }
            }
            Err(err) if err.fails_open() => {
                warn!(rule = rule.name(), error = %err, "evaluator unreachable, failing open");
                BehaviorOutcome::silent()
            }
            Err(err) => {
                warn!(rule = rule.name(), error = %err, "evaluator failed, error verdict");
                BehaviorOutcome {
                    verdict: Some(Verdict::evaluator_failure(err.to_string(), threshold)),
                    decision: DecisionLabel::Denied,
                }
            }
        }
    }

    async fn run_inject_context(
        &self,
        rule: &HandlerRule,
        event: &ToolEvent,
        config: &GateConfig,
    ) -> BehaviorOutcome {
        let Some(prompt) = self.render_prompt(rule, event, config).await else {
            return BehaviorOutcome::silent();
        };
        match self.call_evaluator(&prompt, config).await {
            Ok(judgment) if !judgment.reasoning().trim().is_empty() => {
                let verdict = Verdict::builder()
                    .score(i64::from(judgment.score()))
                    .category(judgment.category())
                    .injected_context(judgment.reasoning())
                    .build();
                BehaviorOutcome {
                    verdict: Some(verdict),
                    decision: DecisionLabel::NoOpinion,
                }
            }
            Ok(_) => BehaviorOutcome::silent(),
            Err(err) => {
                // Context injection is best-effort; any oracle failure
                // just means no context this time.
                debug!(rule = rule.name(), error = %err, "context injection skipped");
                BehaviorOutcome::silent()
            }
        }
    }

    async fn run_custom(&self, event: &ToolEvent) -> BehaviorOutcome {
        match event.kind() {
            EventKind::SessionStart => {
                // Warm the conversation record so later events append to
                // an already-persisted log.
                if let Err(err) = self.sessions.get_or_create(event.conversation_id()).await {
                    warn!(
                        conversation = %event.conversation_id(),
                        error = %err,
                        "session housekeeping failed"
                    );
                }
                info!(conversation = %event.conversation_id(), "session started");
            }
            EventKind::SessionEnd => {
                info!(conversation = %event.conversation_id(), "session ended");
            }
            kind => {
                debug!(kind = %kind, "custom behavior has no bookkeeping for this kind");
            }
        }
        BehaviorOutcome::silent()
    }

    /// Renders the judgment prompt, degrading a broken operator
    /// template to the built-in default rather than failing the event.
    async fn render_prompt(
        &self,
        rule: &HandlerRule,
        event: &ToolEvent,
        config: &GateConfig,
    ) -> Option<String> {
        let context = match self
            .sessions
            .build_context(
                event.conversation_id(),
                config.session().recent_context_events(),
            )
            .await
        {
            Ok(context) => context,
            Err(err) => {
                warn!(
                    conversation = %event.conversation_id(),
                    error = %err,
                    "recent context unavailable"
                );
                String::new()
            }
        };

        if let Some(template) = rule.evaluator_template() {
            match JudgmentPrompt::from_template(template).render(event, &context) {
                Ok(prompt) => return Some(prompt),
                Err(err) => {
                    warn!(
                        rule = rule.name(),
                        error = %err,
                        "rule template failed to render, using default"
                    );
                }
            }
        }
        match JudgmentPrompt::new().render(event, &context) {
            Ok(prompt) => Some(prompt),
            Err(err) => {
                debug!(rule = rule.name(), error = %err, "event cannot be rendered for judgment");
                None
            }
        }
    }

    async fn call_evaluator(
        &self,
        prompt: &str,
        config: &GateConfig,
    ) -> Result<gate_evaluator::SafetyJudgment, EvaluatorError> {
        let limit = Duration::from_secs(config.evaluator().timeout_secs());
        match timeout(limit, self.evaluator.evaluate(prompt)).await {
            Ok(result) => result,
            Err(_) => Err(EvaluatorError::Timeout { limit }),
        }
    }

    async fn record(
        &self,
        event: &ToolEvent,
        outcome: BehaviorOutcome,
        gated: bool,
        rule_name: Option<&str>,
    ) {
        let mut builder = EventRecord::builder(event.clone())
            .decision(outcome.decision)
            .gated(gated);
        if let Some(verdict) = outcome.verdict {
            builder = builder.verdict(verdict);
        }
        if let Some(name) = rule_name {
            builder = builder.rule_name(name);
        }
        if let Err(err) = self
            .sessions
            .append(event.conversation_id(), builder.build())
            .await
        {
            warn!(
                conversation = %event.conversation_id(),
                error = %err,
                "event record not persisted"
            );
        }
    }
}

/// Maps a verdict to the decision label for its event kind.
///
/// Pre-tool events get the three-way mapping: clear the threshold to
/// allow, fall below the hard-deny floor to deny, anything between is
/// deferred to the human. Rules with auto-approve disabled defer their
/// approvals instead of surfacing them.
fn decision_label(
    kind: EventKind,
    verdict: &Verdict,
    rule: &HandlerRule,
    config: &GateConfig,
) -> DecisionLabel {
    if verdict.allow() {
        return if rule.auto_approve_enabled() {
            DecisionLabel::Approved
        } else {
            DecisionLabel::Ask
        };
    }
    if kind == EventKind::PreToolUse && verdict.score() >= config.dispatch().hard_deny_floor() {
        return DecisionLabel::Ask;
    }
    DecisionLabel::Denied
}

fn run_validate(rule: &HandlerRule, event: &ToolEvent) -> BehaviorOutcome {
    let Some(arguments) = event.tool_arguments() else {
        return BehaviorOutcome::silent();
    };
    let haystack = arguments.to_string();

    let patterns = rule
        .options()
        .get("deny_patterns")
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default();

    for pattern in patterns.iter().filter_map(Value::as_str) {
        if argument_matches(pattern, &haystack) {
            let verdict = Verdict::builder()
                .score(0)
                .threshold(rule.approve_threshold())
                .category(SafetyCategory::Dangerous)
                .reasoning(format!("tool arguments matched blocked pattern `{pattern}`"))
                .build();
            return BehaviorOutcome {
                verdict: Some(verdict),
                decision: DecisionLabel::Denied,
            };
        }
    }
    BehaviorOutcome::silent()
}

/// Unanchored, case-insensitive match against serialized arguments; a
/// malformed pattern degrades to substring search.
fn argument_matches(pattern: &str, haystack: &str) -> bool {
    match RegexBuilder::new(pattern)
        .case_insensitive(true)
        .size_limit(1 << 20)
        .build()
    {
        Ok(regex) => regex.is_match(haystack),
        Err(err) => {
            warn!(pattern, error = %err, "deny pattern failed to compile, substring fallback");
            haystack.to_lowercase().contains(&pattern.to_lowercase())
        }
    }
}

fn log_event(level: LogLevel, rule: &HandlerRule, event: &ToolEvent) {
    match level {
        LogLevel::Debug => debug!(
            rule = rule.name(),
            kind = %event.kind(),
            conversation = %event.conversation_id(),
            tool = event.tool_name().unwrap_or(""),
            "event logged"
        ),
        LogLevel::Info => info!(
            rule = rule.name(),
            kind = %event.kind(),
            conversation = %event.conversation_id(),
            tool = event.tool_name().unwrap_or(""),
            "event logged"
        ),
        LogLevel::Warn => warn!(
            rule = rule.name(),
            kind = %event.kind(),
            conversation = %event.conversation_id(),
            tool = event.tool_name().unwrap_or(""),
            "event logged"
        ),
    }
}

/// Translates the gated decision into the protocol shape for the kind.
fn translate(kind: EventKind, surfaced: DecisionLabel, verdict: Option<&Verdict>) -> HookResponse {
    match kind {
        EventKind::PermissionRequest => match surfaced {
            DecisionLabel::Approved => HookResponse::permission_allow(kind),
            DecisionLabel::Denied => verdict
                .map(|verdict| HookResponse::permission_deny(kind, verdict))
                .unwrap_or_else(HookResponse::no_opinion),
            DecisionLabel::Ask | DecisionLabel::NoOpinion => HookResponse::no_opinion(),
        },
        EventKind::PreToolUse => match surfaced {
            DecisionLabel::Approved => HookResponse::pre_tool(kind, "allow", None),
            DecisionLabel::Denied => HookResponse::pre_tool(
                kind,
                "deny",
                Some(verdict.map_or("Requires review", Verdict::reasoning)),
            ),
            DecisionLabel::Ask => HookResponse::pre_tool(
                kind,
                "ask",
                Some(verdict.map_or("Requires review", Verdict::reasoning)),
            ),
            DecisionLabel::NoOpinion => HookResponse::no_opinion(),
        },
        _ => verdict
            .and_then(Verdict::injected_context)
            .map_or_else(HookResponse::no_opinion, |context| {
                HookResponse::additional_context(kind, context)
            }),
    }
}
