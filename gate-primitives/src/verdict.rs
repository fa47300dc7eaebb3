//! Normalized decision outcomes produced for a single event.

use std::fmt::{self, Display, Formatter};

use serde::{Deserialize, Serialize};

/// Clamps a raw evaluator score into the `[0, 100]` range.
#[must_use]
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn clamp_score(raw: i64) -> u8 {
    raw.clamp(0, 100) as u8
}

/// Risk band assigned to an evaluated event.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SafetyCategory {
    /// Routine operation with no destructive potential.
    Safe,
    /// Minor side effects possible; generally acceptable.
    Cautious,
    /// Meaningful destructive potential; warrants scrutiny.
    Risky,
    /// Severe or irreversible consequences likely.
    Dangerous,
    /// The evaluator did not classify the event.
    Unknown,
    /// The evaluator itself failed; treated as maximally suspect.
    Error,
}

impl SafetyCategory {
    /// Derives a category from a score when the evaluator omits one.
    #[must_use]
    pub const fn from_score(score: u8) -> Self {
        match score {
            90..=u8::MAX => SafetyCategory::Safe,
            70..=89 => SafetyCategory::Cautious,
            40..=69 => SafetyCategory::Risky,
            _ => SafetyCategory::Dangerous,
        }
    }

    /// Whether this category should interrupt the agent immediately.
    #[must_use]
    pub const fn is_interrupt_worthy(self) -> bool {
        matches!(self, SafetyCategory::Dangerous)
    }

    /// Returns the wire spelling of the category.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            SafetyCategory::Safe => "safe",
            SafetyCategory::Cautious => "cautious",
            SafetyCategory::Risky => "risky",
            SafetyCategory::Dangerous => "dangerous",
            SafetyCategory::Unknown => "unknown",
            SafetyCategory::Error => "error",
        }
    }
}

impl Display for SafetyCategory {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for SafetyCategory {
    type Err = crate::error::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "safe" => Ok(SafetyCategory::Safe),
            "cautious" => Ok(SafetyCategory::Cautious),
            "risky" => Ok(SafetyCategory::Risky),
            "dangerous" => Ok(SafetyCategory::Dangerous),
            "unknown" => Ok(SafetyCategory::Unknown),
            "error" => Ok(SafetyCategory::Error),
            other => Err(crate::error::Error::UnknownCategory {
                category: other.to_owned(),
            }),
        }
    }
}

/// Final label recorded for an event after gating.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionLabel {
    /// The event was automatically approved.
    Approved,
    /// The event was automatically denied.
    Denied,
    /// The event was deferred to the human.
    Ask,
    /// The service expressed no opinion.
    NoOpinion,
}

impl DecisionLabel {
    /// Returns the wire spelling of the label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            DecisionLabel::Approved => "approved",
            DecisionLabel::Denied => "denied",
            DecisionLabel::Ask => "ask",
            DecisionLabel::NoOpinion => "no_opinion",
        }
    }
}

impl Display for DecisionLabel {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Normalized outcome of evaluating one event.
///
/// A verdict is produced at most once per event and lives only inside the
/// event record that owns it; "no opinion" is the absence of a verdict,
/// not a verdict variant.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Verdict {
    allow: bool,
    score: u8,
    reasoning: String,
    category: SafetyCategory,
    threshold_used: u8,
    interrupt: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    injected_context: Option<String>,
    #[serde(default)]
    latency_ms: u64,
}

impl Verdict {
    /// Starts building a verdict.
    #[must_use]
    pub fn builder() -> VerdictBuilder {
        VerdictBuilder {
            score: 0,
            reasoning: None,
            category: None,
            threshold: 0,
            interrupt: None,
            injected_context: None,
            latency_ms: 0,
        }
    }

    /// Builds the verdict recorded when the evaluator responded but failed.
    ///
    /// Scores zero with the error category, so enforce mode treats the
    /// event as a denial rather than silently waving it through.
    #[must_use]
    pub fn evaluator_failure(reason: impl Into<String>, threshold: u8) -> Self {
        Self {
            allow: false,
            score: 0,
            reasoning: reason.into(),
            category: SafetyCategory::Error,
            threshold_used: threshold,
            interrupt: false,
            injected_context: None,
            latency_ms: 0,
        }
    }

    /// Whether the score cleared the threshold.
    #[must_use]
    pub const fn allow(&self) -> bool {
        self.allow
    }

    /// Clamped safety score in `[0, 100]`.
    #[must_use]
    pub const fn score(&self) -> u8 {
        self.score
    }

    /// Evaluator-provided reasoning text.
    #[must_use]
    pub fn reasoning(&self) -> &str {
        &self.reasoning
    }

    /// Risk band for the event.
    #[must_use]
    pub const fn category(&self) -> SafetyCategory {
        self.category
    }

    /// Threshold the score was compared against.
    #[must_use]
    pub const fn threshold_used(&self) -> u8 {
        self.threshold_used
    }

    /// Whether the agent should be interrupted immediately.
    #[must_use]
    pub const fn interrupt(&self) -> bool {
        self.interrupt
    }

    /// Ambient context to hand back to the agent, if any.
    #[must_use]
    pub fn injected_context(&self) -> Option<&str> {
        self.injected_context.as_deref()
    }

    /// Wall-clock time the evaluation took, in milliseconds.
    #[must_use]
    pub const fn latency_ms(&self) -> u64 {
        self.latency_ms
    }

    /// Label this verdict resolves to before gating.
    #[must_use]
    pub const fn decision_label(&self) -> DecisionLabel {
        if self.allow {
            DecisionLabel::Approved
        } else {
            DecisionLabel::Denied
        }
    }
}

/// Builder for [`Verdict`].
pub struct VerdictBuilder {
    score: i64,
    reasoning: Option<String>,
    category: Option<SafetyCategory>,
    threshold: u8,
    interrupt: Option<bool>,
    injected_context: Option<String>,
    latency_ms: u64,
}

impl VerdictBuilder {
    /// Sets the raw evaluator score; clamped to `[0, 100]` on build.
    #[must_use]
    pub fn score(mut self, raw: i64) -> Self {
        self.score = raw;
        self
    }

    /// Sets the evaluator reasoning text.
    #[must_use]
    pub fn reasoning(mut self, reasoning: impl Into<String>) -> Self {
        self.reasoning = Some(reasoning.into());
        self
    }

    /// Sets the risk category; derived from the score when omitted.
    #[must_use]
    pub fn category(mut self, category: SafetyCategory) -> Self {
        self.category = Some(category);
        self
    }

    /// Sets the approval threshold the score is compared against.
    #[must_use]
    pub fn threshold(mut self, threshold: u8) -> Self {
        self.threshold = threshold;
        self
    }

    /// Overrides the interrupt flag; derived from the category when omitted.
    #[must_use]
    pub fn interrupt(mut self, interrupt: bool) -> Self {
        self.interrupt = Some(interrupt);
        self
    }

    /// Attaches ambient context for the agent.
    #[must_use]
    pub fn injected_context(mut self, context: impl Into<String>) -> Self {
        self.injected_context = Some(context.into());
        self
    }

    /// Records how long the evaluation took.
    #[must_use]
    pub fn latency_ms(mut self, latency_ms: u64) -> Self {
        self.latency_ms = latency_ms;
        self
    }

    /// Finalizes the verdict, clamping the score and deriving
    /// allow/interrupt from it.
    #[must_use]
    pub fn build(self) -> Verdict {
        let score = clamp_score(self.score);
        let category = self.category.unwrap_or_else(|| SafetyCategory::from_score(score));
        Verdict {
            allow: score >= self.threshold,
            score,
            reasoning: self.reasoning.unwrap_or_default(),
            category,
            threshold_used: self.threshold,
            interrupt: self.interrupt.unwrap_or_else(|| category.is_interrupt_worthy()),
            injected_context: self.injected_context,
            latency_ms: self.latency_ms,
        }
    }
}
