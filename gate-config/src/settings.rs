//! Component settings embedded in the configuration document.

use serde::{Deserialize, Serialize};

/// Settings for the per-conversation session store.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionSettings {
    max_events_per_conversation: usize,
    recent_context_events: usize,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            max_events_per_conversation: 500,
            recent_context_events: 10,
        }
    }
}

impl SessionSettings {
    /// Cap on retained events per conversation, oldest evicted first.
    #[must_use]
    pub const fn max_events_per_conversation(&self) -> usize {
        self.max_events_per_conversation
    }

    /// How many recent events feed the evaluator prompt context.
    #[must_use]
    pub const fn recent_context_events(&self) -> usize {
        self.recent_context_events
    }

    /// Sets the retained-event cap.
    #[must_use]
    pub fn with_max_events_per_conversation(mut self, max_events: usize) -> Self {
        self.max_events_per_conversation = max_events;
        self
    }

    /// Sets the recent-context window.
    #[must_use]
    pub fn with_recent_context_events(mut self, events: usize) -> Self {
        self.recent_context_events = events;
        self
    }
}

/// Which transport reaches the safety evaluator.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvaluatorBackend {
    /// POST prompts to a local HTTP analyzer service.
    #[default]
    Http,
    /// Pipe prompts to a subprocess on stdin.
    Command,
}

/// Settings for reaching the external safety evaluator.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct EvaluatorSettings {
    backend: EvaluatorBackend,
    base_url: String,
    timeout_secs: u64,
    allow_remote: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    program: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    args: Vec<String>,
}

impl Default for EvaluatorSettings {
    fn default() -> Self {
        Self {
            backend: EvaluatorBackend::Http,
            base_url: "http://127.0.0.1:5050/".to_owned(),
            timeout_secs: 30,
            allow_remote: false,
            program: None,
            args: Vec::new(),
        }
    }
}

impl EvaluatorSettings {
    /// Selected transport.
    #[must_use]
    pub const fn backend(&self) -> EvaluatorBackend {
        self.backend
    }

    /// Base URL of the HTTP analyzer service.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Per-call timeout in seconds.
    #[must_use]
    pub const fn timeout_secs(&self) -> u64 {
        self.timeout_secs
    }

    /// Whether non-loopback analyzer hosts are permitted.
    #[must_use]
    pub const fn allow_remote(&self) -> bool {
        self.allow_remote
    }

    /// Subprocess program for the command backend.
    #[must_use]
    pub fn program(&self) -> Option<&str> {
        self.program.as_deref()
    }

    /// Arguments passed to the subprocess program.
    #[must_use]
    pub fn args(&self) -> &[String] {
        &self.args
    }

    /// Selects the transport.
    #[must_use]
    pub fn with_backend(mut self, backend: EvaluatorBackend) -> Self {
        self.backend = backend;
        self
    }

    /// Sets the analyzer base URL.
    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Sets the per-call timeout in seconds.
    #[must_use]
    pub fn with_timeout_secs(mut self, timeout_secs: u64) -> Self {
        self.timeout_secs = timeout_secs;
        self
    }

    /// Permits non-loopback analyzer hosts.
    #[must_use]
    pub fn with_allow_remote(mut self, allow_remote: bool) -> Self {
        self.allow_remote = allow_remote;
        self
    }

    /// Sets the subprocess program for the command backend.
    #[must_use]
    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = Some(program.into());
        self
    }

    /// Sets the subprocess arguments.
    #[must_use]
    pub fn with_args(mut self, args: Vec<String>) -> Self {
        self.args = args;
        self
    }
}

/// Settings for the dispatch pipeline itself.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchSettings {
    hard_deny_floor: u8,
    evaluate_in_observe: bool,
}

impl Default for DispatchSettings {
    fn default() -> Self {
        Self {
            hard_deny_floor: 30,
            evaluate_in_observe: true,
        }
    }
}

impl DispatchSettings {
    /// Score below which a pre-tool decision denies outright instead of
    /// escalating to the human.
    #[must_use]
    pub const fn hard_deny_floor(&self) -> u8 {
        self.hard_deny_floor
    }

    /// Whether observe mode still runs evaluations for visibility.
    #[must_use]
    pub const fn evaluate_in_observe(&self) -> bool {
        self.evaluate_in_observe
    }

    /// Sets the outright-denial floor.
    #[must_use]
    pub fn with_hard_deny_floor(mut self, floor: u8) -> Self {
        self.hard_deny_floor = floor;
        self
    }

    /// Sets whether observe mode still evaluates.
    #[must_use]
    pub fn with_evaluate_in_observe(mut self, evaluate: bool) -> Self {
        self.evaluate_in_observe = evaluate;
        self
    }
}
