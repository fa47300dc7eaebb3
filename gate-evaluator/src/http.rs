//! HTTP adapter for a safety-analyzer service.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use hyper::body::to_bytes;
use hyper::header::CONTENT_TYPE;
use hyper::{Body, Request, Uri};
use serde::{Deserialize, Serialize};
use tokio::time::timeout;
use tracing::debug;

use gate_primitives::SafetyCategory;

use crate::http_client::{HyperClient, build_client};
use crate::traits::{EvaluatorError, EvaluatorResult, SafetyEvaluator, SafetyJudgment};

const ANALYZE_PATH: &str = "api/analyze";

/// Configuration for the HTTP evaluator adapter.
#[derive(Clone, Debug)]
pub struct HttpEvaluatorConfig {
    base_url: String,
    timeout: Duration,
    allow_remote: bool,
}

impl HttpEvaluatorConfig {
    /// Creates a configuration pointing at the default local analyzer.
    #[must_use]
    pub fn new() -> Self {
        Self {
            base_url: "http://127.0.0.1:5050/".to_owned(),
            timeout: Duration::from_secs(30),
            allow_remote: false,
        }
    }

    /// Overrides the analyzer base URL.
    ///
    /// Non-loopback hosts are rejected unless [`Self::allow_remote`] was
    /// called first, so a mistyped config cannot ship tool metadata to an
    /// arbitrary host.
    ///
    /// # Errors
    ///
    /// Returns [`EvaluatorError::Configuration`] if the URL is malformed
    /// or points off-host without remote access enabled.
    pub fn with_base_url(mut self, base_url: impl AsRef<str>) -> EvaluatorResult<Self> {
        self.base_url = sanitize_base_url(base_url.as_ref(), self.allow_remote)?;
        Ok(self)
    }

    /// Permits a non-loopback analyzer endpoint.
    #[must_use]
    pub fn allow_remote(mut self) -> Self {
        self.allow_remote = true;
        self
    }

    /// Sets the per-request deadline.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

impl Default for HttpEvaluatorConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Evaluator adapter calling an analyzer service over HTTP.
pub struct HttpEvaluator {
    client: HyperClient,
    endpoint: Uri,
    timeout: Duration,
}

impl fmt::Debug for HttpEvaluator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpEvaluator")
            .field("endpoint", &self.endpoint)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl HttpEvaluator {
    /// Constructs the adapter from the supplied configuration.
    ///
    /// # Errors
    ///
    /// Returns [`EvaluatorError::Configuration`] if the endpoint is
    /// invalid or the HTTP client cannot be constructed.
    #[allow(clippy::needless_pass_by_value)]
    pub fn new(config: HttpEvaluatorConfig) -> EvaluatorResult<Self> {
        let base = sanitize_base_url(&config.base_url, config.allow_remote)?;
        let endpoint = format!("{base}{ANALYZE_PATH}")
            .parse::<Uri>()
            .map_err(|err| {
                EvaluatorError::configuration(format!("invalid analyzer endpoint: {err}"))
            })?;
        let client = build_client()?;
        Ok(Self {
            client,
            endpoint,
            timeout: config.timeout,
        })
    }
}

#[async_trait]
impl SafetyEvaluator for HttpEvaluator {
    async fn evaluate(&self, prompt: &str) -> EvaluatorResult<SafetyJudgment> {
        let payload = AnalyzeRequest { prompt };
        let body = serde_json::to_vec(&payload).map_err(|err| {
            EvaluatorError::configuration(format!("failed to encode analyzer request: {err}"))
        })?;

        let request = Request::post(self.endpoint.clone())
            .header(CONTENT_TYPE, "application/json")
            .body(Body::from(body))
            .map_err(|err| {
                EvaluatorError::transport(format!("failed to build analyzer request: {err}"))
            })?;

        let response = timeout(self.timeout, self.client.request(request))
            .await
            .map_err(|_| EvaluatorError::Timeout {
                limit: self.timeout,
            })?
            .map_err(|err| EvaluatorError::transport(format!("analyzer request failed: {err}")))?;

        let status = response.status();
        let bytes = to_bytes(response.into_body()).await.map_err(|err| {
            EvaluatorError::transport(format!("failed to read analyzer response: {err}"))
        })?;

        if !status.is_success() {
            let reason = String::from_utf8_lossy(&bytes).to_string();
            return Err(EvaluatorError::response(format!(
                "analyzer returned {status}: {reason}"
            )));
        }

        let parsed: AnalyzeResponse = serde_json::from_slice(&bytes).map_err(|err| {
            EvaluatorError::response(format!("failed to decode analyzer response: {err}"))
        })?;
        debug!(score = ?parsed.score, category = ?parsed.category, "analyzer responded");
        parsed.into_judgment()
    }
}

#[derive(Debug, Serialize)]
struct AnalyzeRequest<'a> {
    prompt: &'a str,
}

#[derive(Debug, Deserialize)]
struct AnalyzeResponse {
    #[serde(default = "default_success")]
    success: bool,
    #[serde(default)]
    score: Option<i64>,
    #[serde(default)]
    reasoning: Option<String>,
    #[serde(default)]
    category: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

const fn default_success() -> bool {
    true
}

impl AnalyzeResponse {
    fn into_judgment(self) -> EvaluatorResult<SafetyJudgment> {
        if !self.success {
            let reason = self.error.unwrap_or_else(|| "analyzer reported failure".to_owned());
            return Err(EvaluatorError::response(reason));
        }
        let Some(score) = self.score else {
            return Err(EvaluatorError::response("analyzer response missing score"));
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

fn sanitize_base_url(input: &str, allow_remote: bool) -> EvaluatorResult<String> {
    let mut base = input.trim().to_owned();
    if !(base.starts_with("http://") || base.starts_with("https://")) {
        return Err(EvaluatorError::configuration(
            "analyzer base URL must start with http:// or https://",
        ));
    }
    if !base.ends_with('/') {
        base.push('/');
    }
    let uri = base
        .parse::<Uri>()
        .map_err(|err| EvaluatorError::configuration(format!("invalid analyzer base URL: {err}")))?;
    if !allow_remote {
        let host = uri.host().unwrap_or_default();
        if !is_loopback_host(host) {
            return Err(EvaluatorError::configuration(format!(
                "analyzer host `{host}` is not loopback; enable remote access explicitly"
            )));
        }
    }
    Ok(base)
}

fn is_loopback_host(host: &str) -> bool {
    let host = host.trim_start_matches('[').trim_end_matches(']');
    host == "localhost" || host == "::1" || host.starts_with("127.")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_base_url_without_scheme() {
        let err = HttpEvaluatorConfig::new()
            .with_base_url("localhost:5050")
            .expect_err("missing scheme should error");
        assert!(matches!(err, EvaluatorError::Configuration { .. }));
    }

    #[test]
    fn rejects_remote_host_by_default() {
        let err = HttpEvaluatorConfig::new()
            .with_base_url("http://evil.example.com:5050")
            .expect_err("remote host should error");
        assert!(matches!(err, EvaluatorError::Configuration { .. }));
    }

    #[test]
    fn accepts_loopback_hosts() {
        for url in [
            "http://localhost:5050",
            "http://127.0.0.1:5050/",
            "http://[::1]:5050",
        ] {
            assert!(
                HttpEvaluatorConfig::new().with_base_url(url).is_ok(),
                "{url} should be accepted"
            );
        }
    }

    #[test]
    fn remote_host_allowed_when_opted_in() {
        let config = HttpEvaluatorConfig::new()
            .allow_remote()
            .with_base_url("https://analyzer.internal:5050")
            .expect("opt-in remote");
        assert!(config.base_url.starts_with("https://analyzer.internal"));
    }

    #[test]
    fn failure_response_maps_to_response_error() {
        let parsed: AnalyzeResponse =
            serde_json::from_str(r#"{"success": false, "error": "model unavailable"}"#).unwrap();
        let err = parsed.into_judgment().expect_err("failure response");
        assert!(matches!(err, EvaluatorError::Response { .. }));
        assert!(!err.fails_open());
    }

    #[test]
    fn success_response_parses_judgment() {
        let parsed: AnalyzeResponse = serde_json::from_str(
            r#"{"score": 96, "category": "safe", "reasoning": "read-only command"}"#,
        )
        .unwrap();
        let judgment = parsed.into_judgment().expect("judgment");
        assert_eq!(judgment.score(), 96);
        assert_eq!(judgment.category(), SafetyCategory::Safe);
    }

    #[test]
    fn unknown_category_falls_back_to_score_band() {
        let parsed: AnalyzeResponse =
            serde_json::from_str(r#"{"score": 20, "category": "mystery"}"#).unwrap();
        let judgment = parsed.into_judgment().expect("judgment");
        assert_eq!(judgment.category(), SafetyCategory::Dangerous);
    }

    #[test]
    fn out_of_range_score_is_clamped() {
        let parsed: AnalyzeResponse = serde_json::from_str(r#"{"score": 400}"#).unwrap();
        let judgment = parsed.into_judgment().expect("judgment");
        assert_eq!(judgment.score(), 100);
    }
}
