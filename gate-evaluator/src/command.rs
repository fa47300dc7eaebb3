//! Subprocess adapter for a local analyzer script.

use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::debug;

use gate_primitives::SafetyCategory;

use crate::traits::{EvaluatorError, EvaluatorResult, SafetyEvaluator, SafetyJudgment};

/// Evaluator adapter that pipes the prompt to a local program and parses
/// one JSON verdict object from its stdout.
#[derive(Clone, Debug)]
pub struct CommandEvaluator {
    program: String,
    args: Vec<String>,
    timeout: Duration,
}

impl CommandEvaluator {
    /// Creates an adapter for the supplied program.
    #[must_use]
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            timeout: Duration::from_secs(30),
        }
    }

    /// Appends program arguments.
    #[must_use]
    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Sets the per-invocation deadline; the child is killed when it
    /// elapses.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[async_trait]
impl SafetyEvaluator for CommandEvaluator {
    async fn evaluate(&self, prompt: &str) -> EvaluatorResult<SafetyJudgment> {
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|err| {
                EvaluatorError::transport(format!("failed to spawn `{}`: {err}", self.program))
            })?;

        if let Some(mut stdin) = child.stdin.take() {
            // A script may exit before reading the prompt; the exit
            // status decides the outcome, not this write.
            if let Err(err) = stdin.write_all(prompt.as_bytes()).await {
                debug!(error = %err, "analyzer stdin write failed");
            }
        }

        let output = timeout(self.timeout, child.wait_with_output())
            .await
            .map_err(|_| EvaluatorError::Timeout {
                limit: self.timeout,
            })?
            .map_err(|err| {
                EvaluatorError::transport(format!("failed to collect analyzer output: {err}"))
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(EvaluatorError::response(format!(
                "analyzer exited with {}: {}",
                output.status,
                stderr.trim()
            )));
        }

        let parsed: VerdictOutput = serde_json::from_slice(&output.stdout).map_err(|err| {
            EvaluatorError::response(format!("failed to decode analyzer stdout: {err}"))
        })?;
        parsed.into_judgment()
    }
}

#[derive(Debug, Deserialize)]
struct VerdictOutput {
    score: Option<i64>,
    #[serde(default)]
    reasoning: Option<String>,
    #[serde(default)]
    category: Option<String>,
}

impl VerdictOutput {
    fn into_judgment(self) -> EvaluatorResult<SafetyJudgment> {
        let Some(score) = self.score else {
            return Err(EvaluatorError::response("analyzer output missing score"));
        };
        let category = self
            .category
            .as_deref()
            .and_then(|raw| raw.parse::<SafetyCategory>().ok());
        Ok(SafetyJudgment::new(
            score,
            self.reasoning.unwrap_or_default(),
            category,
        ))
    }
}
