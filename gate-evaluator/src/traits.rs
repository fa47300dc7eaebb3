//! Shared evaluator trait and data structures.

use std::time::Duration;

use async_trait::async_trait;
use gate_primitives::{SafetyCategory, clamp_score};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result alias used by evaluator adapters.
pub type EvaluatorResult<T> = Result<T, EvaluatorError>;

/// Error type shared by evaluator implementations.
///
/// The taxonomy matters downstream: transport-level faults fail open
/// (the dispatcher answers "no opinion"), while a response-level failure
/// means the oracle was reached and could not vouch for the event, which
/// resolves to an error-category verdict instead.
#[derive(Debug, Error)]
pub enum EvaluatorError {
    /// Adapter is misconfigured.
    #[error("evaluator not configured: {reason}")]
    Configuration {
        /// Additional context for the failure.
        reason: String,
    },

    /// The oracle did not answer within the configured deadline.
    #[error("evaluator timed out after {limit:?}")]
    Timeout {
        /// Deadline that elapsed.
        limit: Duration,
    },

    /// Transport-level failures (connect, read, protocol).
    #[error("evaluator transport error: {reason}")]
    Transport {
        /// Additional context about the error.
        reason: String,
    },

    /// The oracle responded but the response signals or constitutes a
    /// failure (non-success status, nonzero exit, unparseable payload,
    /// explicit `success=false`).
    #[error("evaluator response error: {reason}")]
    Response {
        /// Additional context about the response failure.
        reason: String,
    },
}

impl EvaluatorError {
    /// Convenience constructor for configuration issues.
    #[must_use]
    pub fn configuration(reason: impl Into<String>) -> Self {
        Self::Configuration {
            reason: reason.into(),
        }
    }

    /// Convenience constructor for transport failures.
    #[must_use]
    pub fn transport(reason: impl Into<String>) -> Self {
        Self::Transport {
            reason: reason.into(),
        }
    }

    /// Convenience constructor for response failures.
    #[must_use]
    pub fn response(reason: impl Into<String>) -> Self {
        Self::Response {
            reason: reason.into(),
        }
    }

    /// Whether this failure leaves the service with no opinion rather
    /// than an error verdict.
    #[must_use]
    pub const fn fails_open(&self) -> bool {
        matches!(self, Self::Timeout { .. } | Self::Transport { .. })
    }
}

/// Scored judgment returned by the safety oracle.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SafetyJudgment {
    score: u8,
    reasoning: String,
    category: SafetyCategory,
}

impl SafetyJudgment {
    /// Creates a judgment, clamping the raw score into `[0, 100]` and
    /// deriving the category from the score when the oracle omits one.
    #[must_use]
    pub fn new(raw_score: i64, reasoning: impl Into<String>, category: Option<SafetyCategory>) -> Self {
        let score = clamp_score(raw_score);
        Self {
            score,
            reasoning: reasoning.into(),
            category: category.unwrap_or_else(|| SafetyCategory::from_score(score)),
        }
    }

    /// Clamped safety score.
    #[must_use]
    pub const fn score(&self) -> u8 {
        self.score
    }

    /// Reasoning text supplied by the oracle.
    #[must_use]
    pub fn reasoning(&self) -> &str {
        &self.reasoning
    }

    /// Risk band assigned by the oracle or derived from the score.
    #[must_use]
    pub const fn category(&self) -> SafetyCategory {
        self.category
    }
}

/// Trait implemented by all safety-oracle adapters.
#[async_trait]
pub trait SafetyEvaluator: Send + Sync {
    /// Submits a rendered judgment prompt and returns the oracle's
    /// scored answer.
    async fn evaluate(&self, prompt: &str) -> EvaluatorResult<SafetyJudgment>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn judgment_clamps_score() {
        let judgment = SafetyJudgment::new(150, "fine", None);
        assert_eq!(judgment.score(), 100);
        let judgment = SafetyJudgment::new(-4, "bad", None);
        assert_eq!(judgment.score(), 0);
    }

    #[test]
    fn judgment_derives_category_when_missing() {
        let judgment = SafetyJudgment::new(95, "routine", None);
        assert_eq!(judgment.category(), SafetyCategory::Safe);
        let judgment = SafetyJudgment::new(10, "destructive", None);
        assert_eq!(judgment.category(), SafetyCategory::Dangerous);
    }

    #[test]
    fn transport_failures_fail_open() {
        assert!(EvaluatorError::transport("refused").fails_open());
        assert!(
            EvaluatorError::Timeout {
                limit: Duration::from_secs(30)
            }
            .fails_open()
        );
        assert!(!EvaluatorError::response("exit 1").fails_open());
        assert!(!EvaluatorError::configuration("bad url").fails_open());
    }
}
