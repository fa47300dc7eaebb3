//! The operator configuration document.

use std::path::Path;

use gate_policy::{
    BehaviorKind, CalibrationSettings, EnforcementMode, HandlerRule, LogLevel, RuleSet,
};
use gate_primitives::EventKind;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{ConfigError, ConfigResult};
use crate::settings::{DispatchSettings, EvaluatorBackend, EvaluatorSettings, SessionSettings};

/// Complete operator configuration, loaded from one JSON document.
///
/// Every section is optional in the document; missing sections take the
/// defaults a local deployment expects. The document is read at startup
/// and may be reloaded at runtime through a
/// [`ConfigHandle`](crate::ConfigHandle).
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GateConfig {
    enforcement_mode: EnforcementMode,
    pass_through_tools: Vec<String>,
    rules: RuleSet,
    session: SessionSettings,
    calibration: CalibrationSettings,
    evaluator: EvaluatorSettings,
    dispatch: DispatchSettings,
}

impl GateConfig {
    /// Configuration a fresh local install runs with: observe mode and
    /// the stock rule set.
    #[must_use]
    pub fn standard() -> Self {
        Self {
            rules: standard_rules(),
            ..Self::default()
        }
    }

    /// Mode the enforcement state starts in when no runtime state file
    /// exists yet.
    #[must_use]
    pub const fn enforcement_mode(&self) -> EnforcementMode {
        self.enforcement_mode
    }

    /// Tool names answered "no opinion" without evaluation.
    #[must_use]
    pub fn pass_through_tools(&self) -> &[String] {
        &self.pass_through_tools
    }

    /// Whether a tool bypasses evaluation entirely.
    #[must_use]
    pub fn is_pass_through(&self, tool_name: &str) -> bool {
        self.pass_through_tools
            .iter()
            .any(|tool| tool == tool_name)
    }

    /// Configured handler rules.
    #[must_use]
    pub const fn rules(&self) -> &RuleSet {
        &self.rules
    }

    /// Session store settings.
    #[must_use]
    pub const fn session(&self) -> &SessionSettings {
        &self.session
    }

    /// Threshold calibration settings.
    #[must_use]
    pub const fn calibration(&self) -> &CalibrationSettings {
        &self.calibration
    }

    /// Evaluator transport settings.
    #[must_use]
    pub const fn evaluator(&self) -> &EvaluatorSettings {
        &self.evaluator
    }

    /// Dispatch pipeline settings.
    #[must_use]
    pub const fn dispatch(&self) -> &DispatchSettings {
        &self.dispatch
    }

    /// Sets the startup enforcement mode.
    #[must_use]
    pub fn with_enforcement_mode(mut self, mode: EnforcementMode) -> Self {
        self.enforcement_mode = mode;
        self
    }

    /// Sets the pass-through tool list.
    #[must_use]
    pub fn with_pass_through_tools(mut self, tools: Vec<String>) -> Self {
        self.pass_through_tools = tools;
        self
    }

    /// Replaces the rule set.
    #[must_use]
    pub fn with_rules(mut self, rules: RuleSet) -> Self {
        self.rules = rules;
        self
    }

    /// Replaces the session settings.
    #[must_use]
    pub fn with_session(mut self, session: SessionSettings) -> Self {
        self.session = session;
        self
    }

    /// Replaces the calibration settings.
    #[must_use]
    pub fn with_calibration(mut self, calibration: CalibrationSettings) -> Self {
        self.calibration = calibration;
        self
    }

    /// Replaces the evaluator settings.
    #[must_use]
    pub fn with_evaluator(mut self, evaluator: EvaluatorSettings) -> Self {
        self.evaluator = evaluator;
        self
    }

    /// Replaces the dispatch settings.
    #[must_use]
    pub fn with_dispatch(mut self, dispatch: DispatchSettings) -> Self {
        self.dispatch = dispatch;
        self
    }

    /// Loads and validates the document at `path`.
    ///
    /// # Errors
    ///
    /// Returns an error when the file cannot be read, does not parse,
    /// or fails validation.
    pub async fn load(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let bytes = tokio::fs::read(path.as_ref()).await?;
        let config: Self = serde_json::from_slice(&bytes)?;
        config.validate()?;
        Ok(config)
    }

    /// Loads the document at `path`, falling back to [`Self::standard`]
    /// when no file exists.
    ///
    /// A present-but-broken document is still an error: silently
    /// replacing a mistyped policy with defaults would drop rules the
    /// operator believes are active.
    ///
    /// # Errors
    ///
    /// Returns an error when an existing file cannot be read, does not
    /// parse, or fails validation.
    pub async fn load_or_standard(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let path = path.as_ref();
        match tokio::fs::read(path).await {
            Ok(bytes) => {
                let config: Self = serde_json::from_slice(&bytes)?;
                config.validate()?;
                Ok(config)
            }
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "no configuration document, using standard defaults");
                Ok(Self::standard())
            }
            Err(err) => Err(ConfigError::Io { source: err }),
        }
    }

    /// Checks structural constraints the schema cannot express.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] naming the first violated
    /// constraint.
    pub fn validate(&self) -> ConfigResult<()> {
        for kind in self.rules.registered_kinds() {
            for rule in self.rules.rules_for(kind) {
                if rule.name().trim().is_empty() {
                    return Err(ConfigError::Invalid("rule name cannot be empty"));
                }
                if rule.approve_threshold() > 100 {
                    return Err(ConfigError::Invalid(
                        "rule approve_threshold must be at most 100",
                    ));
                }
            }
        }

        if self.session.max_events_per_conversation() == 0 {
            return Err(ConfigError::Invalid(
                "session max_events_per_conversation must be at least 1",
            ));
        }
        if self.session.recent_context_events() == 0 {
            return Err(ConfigError::Invalid(
                "session recent_context_events must be at least 1",
            ));
        }

        if self.calibration.baseline_threshold() > 100 {
            return Err(ConfigError::Invalid(
                "calibration baseline_threshold must be at most 100",
            ));
        }
        if !(0.0..=1.0).contains(&self.calibration.min_confidence()) {
            return Err(ConfigError::Invalid(
                "calibration min_confidence must be between 0.0 and 1.0",
            ));
        }
        if self.calibration.max_adjustment() > 100 {
            return Err(ConfigError::Invalid(
                "calibration max_adjustment must be at most 100",
            ));
        }
        if self.calibration.max_override_history() == 0 {
            return Err(ConfigError::Invalid(
                "calibration max_override_history must be at least 1",
            ));
        }

        if self.evaluator.timeout_secs() == 0 {
            return Err(ConfigError::Invalid(
                "evaluator timeout_secs must be at least 1",
            ));
        }
        if self.evaluator.backend() == EvaluatorBackend::Command
            && self.evaluator.program().is_none()
        {
            return Err(ConfigError::Invalid(
                "evaluator command backend requires a program",
            ));
        }

        if self.dispatch.hard_deny_floor() > 100 {
            return Err(ConfigError::Invalid(
                "dispatch hard_deny_floor must be at most 100",
            ));
        }

        Ok(())
    }
}

/// The stock rule set, mirroring the hook surface a default install
/// registers: evaluation on the two permission gates, context injection
/// after tool use, log-only records for conversational events, and
/// session housekeeping.
fn standard_rules() -> RuleSet {
    let mut rules = RuleSet::new();
    rules.register(
        EventKind::PermissionRequest,
        HandlerRule::new("permission-evaluate", BehaviorKind::Evaluate)
            .expect("rule")
            .with_threshold(80)
            .expect("threshold"),
    );
    rules.register(
        EventKind::PreToolUse,
        HandlerRule::new("pre-tool-evaluate", BehaviorKind::Evaluate)
            .expect("rule")
            .with_threshold(85)
            .expect("threshold"),
    );
    rules.register(
        EventKind::PostToolUse,
        HandlerRule::new("post-tool-context", BehaviorKind::InjectContext).expect("rule"),
    );
    rules.register(
        EventKind::PostToolUseFailure,
        HandlerRule::new(
            "failure-log",
            BehaviorKind::LogOnly {
                level: LogLevel::Warn,
            },
        )
        .expect("rule"),
    );
    rules.register(
        EventKind::UserPromptSubmit,
        HandlerRule::new(
            "prompt-log",
            BehaviorKind::LogOnly {
                level: LogLevel::Info,
            },
        )
        .expect("rule"),
    );
    rules.register(
        EventKind::Stop,
        HandlerRule::new(
            "stop-log",
            BehaviorKind::LogOnly {
                level: LogLevel::Info,
            },
        )
        .expect("rule"),
    );
    rules.register(
        EventKind::SessionStart,
        HandlerRule::new("session-housekeeping", BehaviorKind::Custom).expect("rule"),
    );
    rules.register(
        EventKind::SessionEnd,
        HandlerRule::new("session-housekeeping", BehaviorKind::Custom).expect("rule"),
    );
    rules
}
