//! Longitudinal per-tool statistics and threshold suggestions.
//!
//! Every scored decision and every human override feeds a per-tool
//! [`ToolStats`] entry. Once a tool has accumulated enough evidence the
//! engine suggests an adjusted approval threshold; until then it stays
//! silent rather than steering policy from thin data.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use gate_primitives::{clamp_score, ConversationId, DecisionLabel};
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, warn};

use crate::error::{PolicyError, PolicyResult};

/// Decisions needed before the decision term of confidence saturates.
const DECISIONS_FOR_FULL_CONFIDENCE: f64 = 50.0;
/// Overrides needed before the override term of confidence saturates.
const OVERRIDES_FOR_FULL_CONFIDENCE: f64 = 10.0;
/// Weight of the decision term in the confidence blend.
const DECISION_WEIGHT: f64 = 0.6;
/// Weight of the override term in the confidence blend.
const OVERRIDE_WEIGHT: f64 = 0.4;
/// Threshold points shifted per net misclassification.
const POINTS_PER_MISCLASSIFICATION: i64 = 2;

/// Tunables controlling when and how thresholds are suggested.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CalibrationSettings {
    baseline_threshold: u8,
    min_decisions: u64,
    min_confidence: f64,
    max_adjustment: u8,
    max_override_history: usize,
}

impl Default for CalibrationSettings {
    fn default() -> Self {
        Self {
            baseline_threshold: 80,
            min_decisions: 20,
            min_confidence: 0.6,
            max_adjustment: 20,
            max_override_history: 1_000,
        }
    }
}

impl CalibrationSettings {
    /// Starting threshold for tools that have never seen an override.
    #[must_use]
    pub const fn baseline_threshold(&self) -> u8 {
        self.baseline_threshold
    }

    /// Minimum decisions before any suggestion is produced.
    #[must_use]
    pub const fn min_decisions(&self) -> u64 {
        self.min_decisions
    }

    /// Minimum confidence before any suggestion is produced.
    #[must_use]
    pub const fn min_confidence(&self) -> f64 {
        self.min_confidence
    }

    /// Largest swing, in points, a suggestion may apply to its baseline.
    #[must_use]
    pub const fn max_adjustment(&self) -> u8 {
        self.max_adjustment
    }

    /// Most override records retained in the history.
    #[must_use]
    pub const fn max_override_history(&self) -> usize {
        self.max_override_history
    }

    /// Sets the baseline threshold.
    ///
    /// # Errors
    ///
    /// Returns an error when the threshold exceeds 100.
    pub fn with_baseline_threshold(mut self, threshold: u8) -> PolicyResult<Self> {
        if threshold > 100 {
            return Err(PolicyError::InvalidRule(
                "baseline threshold must be at most 100",
            ));
        }
        self.baseline_threshold = threshold;
        Ok(self)
    }

    /// Sets the minimum decision count gating suggestions.
    #[must_use]
    pub fn with_min_decisions(mut self, min_decisions: u64) -> Self {
        self.min_decisions = min_decisions;
        self
    }

    /// Sets the minimum confidence gating suggestions.
    ///
    /// # Errors
    ///
    /// Returns an error when the value is outside `[0.0, 1.0]`.
    pub fn with_min_confidence(mut self, min_confidence: f64) -> PolicyResult<Self> {
        if !(0.0..=1.0).contains(&min_confidence) {
            return Err(PolicyError::InvalidRule(
                "minimum confidence must be between 0.0 and 1.0",
            ));
        }
        self.min_confidence = min_confidence;
        Ok(self)
    }

    /// Sets the largest allowed suggestion swing.
    ///
    /// # Errors
    ///
    /// Returns an error when the swing exceeds 100 points.
    pub fn with_max_adjustment(mut self, max_adjustment: u8) -> PolicyResult<Self> {
        if max_adjustment > 100 {
            return Err(PolicyError::InvalidRule(
                "maximum adjustment must be at most 100",
            ));
        }
        self.max_adjustment = max_adjustment;
        Ok(self)
    }

    /// Sets the override history bound.
    ///
    /// # Errors
    ///
    /// Returns an error when the bound is zero.
    pub fn with_max_override_history(mut self, bound: usize) -> PolicyResult<Self> {
        if bound == 0 {
            return Err(PolicyError::InvalidRule(
                "override history bound must be at least 1",
            ));
        }
        self.max_override_history = bound;
        Ok(self)
    }
}

/// A human decision that disagreed with the automatic verdict.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OverrideRecord {
    tool_name: String,
    original_decision: DecisionLabel,
    human_decision: DecisionLabel,
    score: u8,
    threshold: u8,
    conversation_id: ConversationId,
    timestamp: DateTime<Utc>,
}

impl OverrideRecord {
    /// Creates an override record stamped with the current time.
    #[must_use]
    pub fn new(
        tool_name: impl Into<String>,
        original_decision: DecisionLabel,
        human_decision: DecisionLabel,
        score: u8,
        threshold: u8,
        conversation_id: ConversationId,
    ) -> Self {
        Self {
            tool_name: tool_name.into(),
            original_decision,
            human_decision,
            score,
            threshold,
            conversation_id,
            timestamp: Utc::now(),
        }
    }

    /// Name of the tool the override concerns.
    #[must_use]
    pub fn tool_name(&self) -> &str {
        &self.tool_name
    }

    /// Label the system produced.
    #[must_use]
    pub const fn original_decision(&self) -> DecisionLabel {
        self.original_decision
    }

    /// Label the human substituted.
    #[must_use]
    pub const fn human_decision(&self) -> DecisionLabel {
        self.human_decision
    }

    /// Safety score at decision time.
    #[must_use]
    pub const fn score(&self) -> u8 {
        self.score
    }

    /// Approval threshold in force at decision time.
    #[must_use]
    pub const fn threshold(&self) -> u8 {
        self.threshold
    }

    /// Conversation the overridden event belonged to.
    #[must_use]
    pub const fn conversation_id(&self) -> &ConversationId {
        &self.conversation_id
    }

    /// When the override was recorded.
    #[must_use]
    pub const fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    /// The system denied but the human approved.
    #[must_use]
    pub fn is_false_positive(&self) -> bool {
        self.original_decision == DecisionLabel::Denied
            && self.human_decision == DecisionLabel::Approved
    }

    /// The system approved but the human denied.
    #[must_use]
    pub fn is_false_negative(&self) -> bool {
        self.original_decision == DecisionLabel::Approved
            && self.human_decision == DecisionLabel::Denied
    }
}

/// Accumulated evidence about one tool's decisions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolStats {
    tool_name: String,
    total_decisions: u64,
    override_count: u64,
    false_positive_count: u64,
    false_negative_count: u64,
    running_average_score: f64,
    confidence: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    suggested_threshold: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    last_threshold: Option<u8>,
}

impl ToolStats {
    fn new(tool_name: impl Into<String>) -> Self {
        Self {
            tool_name: tool_name.into(),
            total_decisions: 0,
            override_count: 0,
            false_positive_count: 0,
            false_negative_count: 0,
            running_average_score: 0.0,
            confidence: 0.0,
            suggested_threshold: None,
            last_threshold: None,
        }
    }

    /// Name of the tool these statistics describe.
    #[must_use]
    pub fn tool_name(&self) -> &str {
        &self.tool_name
    }

    /// Total decisions observed for this tool.
    #[must_use]
    pub const fn total_decisions(&self) -> u64 {
        self.total_decisions
    }

    /// Total human overrides recorded for this tool.
    #[must_use]
    pub const fn override_count(&self) -> u64 {
        self.override_count
    }

    /// Overrides where a denial was reversed to an approval.
    #[must_use]
    pub const fn false_positive_count(&self) -> u64 {
        self.false_positive_count
    }

    /// Overrides where an approval was reversed to a denial.
    #[must_use]
    pub const fn false_negative_count(&self) -> u64 {
        self.false_negative_count
    }

    /// Running mean of observed safety scores.
    #[must_use]
    pub const fn running_average_score(&self) -> f64 {
        self.running_average_score
    }

    /// Evidence weight in `[0.0, 1.0]`.
    #[must_use]
    pub const fn confidence(&self) -> f64 {
        self.confidence
    }

    /// Suggested approval threshold, once evidence suffices.
    #[must_use]
    pub const fn suggested_threshold(&self) -> Option<u8> {
        self.suggested_threshold
    }

    /// Threshold in force at the most recent override, if any.
    #[must_use]
    pub const fn last_threshold(&self) -> Option<u8> {
        self.last_threshold
    }
}

/// Recomputes the derived fields after a mutation.
///
/// Confidence blends decision volume and override volume; each term
/// saturates at 1.0. The suggestion stays absent until both the
/// decision-count and confidence minimums are met, then shifts the
/// baseline by two points per net misclassification, bounded by the
/// configured maximum swing. Net false positives lower the suggestion,
/// net false negatives raise it.
#[allow(clippy::cast_precision_loss)]
fn recompute(stats: &mut ToolStats, settings: &CalibrationSettings) {
    let decision_term = (stats.total_decisions as f64 / DECISIONS_FOR_FULL_CONFIDENCE).min(1.0);
    let override_term = (stats.override_count as f64 / OVERRIDES_FOR_FULL_CONFIDENCE).min(1.0);
    stats.confidence = decision_term * DECISION_WEIGHT + override_term * OVERRIDE_WEIGHT;

    if stats.total_decisions < settings.min_decisions()
        || stats.confidence < settings.min_confidence()
    {
        stats.suggested_threshold = None;
        return;
    }

    let baseline = i64::from(stats.last_threshold.unwrap_or(settings.baseline_threshold()));
    let net = i64::try_from(stats.false_positive_count).unwrap_or(i64::MAX)
        .saturating_sub(i64::try_from(stats.false_negative_count).unwrap_or(i64::MAX));
    let swing = net.saturating_mul(POINTS_PER_MISCLASSIFICATION).clamp(
        -i64::from(settings.max_adjustment()),
        i64::from(settings.max_adjustment()),
    );
    stats.suggested_threshold = Some(clamp_score(baseline - swing));
}

/// Engine accumulating decisions and overrides into per-tool statistics.
///
/// Statistics for distinct tools are locked independently, so hot tools
/// never serialize against each other. Every mutation persists a full
/// snapshot before returning when a snapshot path is configured.
#[derive(Debug)]
pub struct CalibrationEngine {
    settings: CalibrationSettings,
    tools: RwLock<HashMap<String, Arc<Mutex<ToolStats>>>>,
    overrides: Mutex<VecDeque<OverrideRecord>>,
    snapshot_path: Option<PathBuf>,
    persist_lock: Mutex<()>,
}

impl CalibrationEngine {
    /// Creates an in-memory engine with no snapshot persistence.
    #[must_use]
    pub fn new(settings: CalibrationSettings) -> Self {
        Self {
            settings,
            tools: RwLock::new(HashMap::new()),
            overrides: Mutex::new(VecDeque::new()),
            snapshot_path: None,
            persist_lock: Mutex::new(()),
        }
    }

    /// Opens an engine backed by a snapshot file, reloading prior state.
    ///
    /// A missing snapshot starts the engine empty. An unreadable
    /// snapshot is logged and discarded rather than blocking startup.
    ///
    /// # Errors
    ///
    /// Returns an error when the snapshot file exists but cannot be
    /// read from disk.
    pub async fn open(
        settings: CalibrationSettings,
        path: impl AsRef<Path>,
    ) -> PolicyResult<Self> {
        let path = path.as_ref();
        let document = match tokio::fs::read(path).await {
            Ok(bytes) => match serde_json::from_slice::<SnapshotDocument>(&bytes) {
                Ok(document) => document,
                Err(err) => {
                    warn!(path = %path.display(), error = %err, "calibration snapshot unreadable, starting empty");
                    SnapshotDocument::default()
                }
            },
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => SnapshotDocument::default(),
            Err(err) => return Err(PolicyError::Io { source: err }),
        };

        let mut tools = HashMap::with_capacity(document.tools.len());
        for (name, stats) in document.tools {
            tools.insert(name, Arc::new(Mutex::new(stats)));
        }
        let mut overrides: VecDeque<OverrideRecord> = document.overrides.into();
        while overrides.len() > settings.max_override_history() {
            overrides.pop_front();
        }

        Ok(Self {
            settings,
            tools: RwLock::new(tools),
            overrides: Mutex::new(overrides),
            snapshot_path: Some(path.to_path_buf()),
            persist_lock: Mutex::new(()),
        })
    }

    /// Settings the engine was built with.
    #[must_use]
    pub const fn settings(&self) -> &CalibrationSettings {
        &self.settings
    }

    /// Observes one scored decision for a tool.
    ///
    /// Creates the tool's entry on first sight, then updates the total
    /// and the running average score.
    ///
    /// # Errors
    ///
    /// Returns an error when persisting the snapshot fails.
    #[allow(clippy::cast_precision_loss)]
    pub async fn record_decision(
        &self,
        tool_name: &str,
        score: u8,
        decision: DecisionLabel,
    ) -> PolicyResult<()> {
        let entry = self.entry(tool_name).await;
        {
            let mut stats = entry.lock().await;
            stats.total_decisions += 1;
            let count = stats.total_decisions as f64;
            stats.running_average_score +=
                (f64::from(score) - stats.running_average_score) / count;
            recompute(&mut stats, &self.settings);
            debug!(
                tool = tool_name,
                score,
                decision = %decision,
                total = stats.total_decisions,
                "decision recorded"
            );
        }
        self.persist().await
    }

    /// Records a human override and classifies the disagreement.
    ///
    /// A reversed denial counts as a false positive, a reversed
    /// approval as a false negative; other disagreements only raise the
    /// override count.
    ///
    /// # Errors
    ///
    /// Returns an error when persisting the snapshot fails.
    pub async fn record_override(&self, record: OverrideRecord) -> PolicyResult<()> {
        let entry = self.entry(record.tool_name()).await;
        {
            let mut stats = entry.lock().await;
            stats.override_count += 1;
            if record.is_false_positive() {
                stats.false_positive_count += 1;
            } else if record.is_false_negative() {
                stats.false_negative_count += 1;
            }
            stats.last_threshold = Some(record.threshold());
            recompute(&mut stats, &self.settings);
            debug!(
                tool = record.tool_name(),
                original = %record.original_decision(),
                human = %record.human_decision(),
                overrides = stats.override_count,
                "override recorded"
            );
        }
        {
            let mut overrides = self.overrides.lock().await;
            overrides.push_back(record);
            while overrides.len() > self.settings.max_override_history() {
                overrides.pop_front();
            }
        }
        self.persist().await
    }

    /// Snapshot of every tool's statistics, ordered by tool name.
    pub async fn tool_stats(&self) -> Vec<ToolStats> {
        let tools = self.tools.read().await;
        let mut out = Vec::with_capacity(tools.len());
        for entry in tools.values() {
            out.push(entry.lock().await.clone());
        }
        drop(tools);
        out.sort_by(|a, b| a.tool_name.cmp(&b.tool_name));
        out
    }

    /// Statistics for one tool, when any decision has been observed.
    pub async fn stats_for(&self, tool_name: &str) -> Option<ToolStats> {
        let entry = {
            let tools = self.tools.read().await;
            Arc::clone(tools.get(tool_name)?)
        };
        let stats = entry.lock().await;
        Some(stats.clone())
    }

    /// Suggested approval threshold for a tool, once evidence suffices.
    pub async fn suggested_threshold(&self, tool_name: &str) -> Option<u8> {
        self.stats_for(tool_name)
            .await
            .and_then(|stats| stats.suggested_threshold)
    }

    /// Retained override records, oldest first.
    pub async fn override_history(&self) -> Vec<OverrideRecord> {
        self.overrides.lock().await.iter().cloned().collect()
    }

    async fn entry(&self, tool_name: &str) -> Arc<Mutex<ToolStats>> {
        {
            let tools = self.tools.read().await;
            if let Some(entry) = tools.get(tool_name) {
                return Arc::clone(entry);
            }
        }

        let mut tools = self.tools.write().await;
        Arc::clone(
            tools
                .entry(tool_name.to_owned())
                .or_insert_with(|| Arc::new(Mutex::new(ToolStats::new(tool_name)))),
        )
    }

    async fn persist(&self) -> PolicyResult<()> {
        let Some(path) = &self.snapshot_path else {
            return Ok(());
        };
        let _guard = self.persist_lock.lock().await;

        let mut tools = BTreeMap::new();
        {
            let map = self.tools.read().await;
            for (name, entry) in map.iter() {
                tools.insert(name.clone(), entry.lock().await.clone());
            }
        }
        let overrides = self.overrides.lock().await.iter().cloned().collect();

        let bytes = serde_json::to_vec_pretty(&SnapshotDocument { tools, overrides })?;
        tokio::fs::write(path, bytes).await?;
        Ok(())
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct SnapshotDocument {
    #[serde(default)]
    tools: BTreeMap<String, ToolStats>,
    #[serde(default)]
    overrides: Vec<OverrideRecord>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::future::join_all;
    use tempfile::TempDir;

    fn conversation() -> ConversationId {
        ConversationId::new("calibration-tests").expect("conversation id")
    }

    fn denial_reversed(tool: &str, threshold: u8) -> OverrideRecord {
        OverrideRecord::new(
            tool,
            DecisionLabel::Denied,
            DecisionLabel::Approved,
            40,
            threshold,
            conversation(),
        )
    }

    #[tokio::test]
    async fn first_decision_creates_the_entry() {
        let engine = CalibrationEngine::new(CalibrationSettings::default());
        engine
            .record_decision("Bash", 80, DecisionLabel::Approved)
            .await
            .expect("record");

        let stats = engine.stats_for("Bash").await.expect("stats");
        assert_eq!(stats.total_decisions(), 1);
        assert!((stats.running_average_score() - 80.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn running_average_tracks_incrementally() {
        let engine = CalibrationEngine::new(CalibrationSettings::default());
        for score in [80, 90, 100] {
            engine
                .record_decision("Bash", score, DecisionLabel::Approved)
                .await
                .expect("record");
        }

        let stats = engine.stats_for("Bash").await.expect("stats");
        assert_eq!(stats.total_decisions(), 3);
        assert!((stats.running_average_score() - 90.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn thin_evidence_yields_no_suggestion() {
        let engine = CalibrationEngine::new(CalibrationSettings::default());
        for _ in 0..5 {
            engine
                .record_decision("Bash", 50, DecisionLabel::Denied)
                .await
                .expect("record");
        }

        assert_eq!(engine.suggested_threshold("Bash").await, None);
    }

    #[tokio::test]
    async fn reversed_denial_counts_as_false_positive_only() {
        let engine = CalibrationEngine::new(CalibrationSettings::default());
        engine
            .record_override(denial_reversed("Bash", 80))
            .await
            .expect("record");

        let stats = engine.stats_for("Bash").await.expect("stats");
        assert_eq!(stats.false_positive_count(), 1);
        assert_eq!(stats.false_negative_count(), 0);
        assert_eq!(stats.override_count(), 1);
    }

    #[tokio::test]
    async fn reversed_approval_counts_as_false_negative() {
        let engine = CalibrationEngine::new(CalibrationSettings::default());
        engine
            .record_override(OverrideRecord::new(
                "Bash",
                DecisionLabel::Approved,
                DecisionLabel::Denied,
                85,
                80,
                conversation(),
            ))
            .await
            .expect("record");

        let stats = engine.stats_for("Bash").await.expect("stats");
        assert_eq!(stats.false_negative_count(), 1);
        assert_eq!(stats.false_positive_count(), 0);
    }

    #[tokio::test]
    async fn escalation_override_classifies_as_neither() {
        let engine = CalibrationEngine::new(CalibrationSettings::default());
        engine
            .record_override(OverrideRecord::new(
                "Bash",
                DecisionLabel::Ask,
                DecisionLabel::Approved,
                70,
                80,
                conversation(),
            ))
            .await
            .expect("record");

        let stats = engine.stats_for("Bash").await.expect("stats");
        assert_eq!(stats.override_count(), 1);
        assert_eq!(stats.false_positive_count(), 0);
        assert_eq!(stats.false_negative_count(), 0);
    }

    #[tokio::test]
    async fn repeated_reversed_denials_lower_the_suggestion() {
        let engine = CalibrationEngine::new(CalibrationSettings::default());
        for _ in 0..60 {
            engine
                .record_decision("Bash", 50, DecisionLabel::Denied)
                .await
                .expect("record");
        }
        for _ in 0..10 {
            engine
                .record_override(denial_reversed("Bash", 80))
                .await
                .expect("record");
        }

        let suggested = engine.suggested_threshold("Bash").await.expect("suggestion");
        assert!(suggested < 80);
        assert_eq!(suggested, 60);
    }

    #[tokio::test]
    async fn suggestion_swing_is_bounded() {
        let engine = CalibrationEngine::new(CalibrationSettings::default());
        for _ in 0..50 {
            engine
                .record_decision("Bash", 50, DecisionLabel::Denied)
                .await
                .expect("record");
        }
        // 30 net false positives would swing 60 points unclamped.
        for _ in 0..30 {
            engine
                .record_override(denial_reversed("Bash", 80))
                .await
                .expect("record");
        }

        assert_eq!(engine.suggested_threshold("Bash").await, Some(60));
    }

    #[tokio::test]
    async fn balanced_overrides_suggest_the_baseline() {
        let engine = CalibrationEngine::new(CalibrationSettings::default());
        for _ in 0..50 {
            engine
                .record_decision("Bash", 75, DecisionLabel::Approved)
                .await
                .expect("record");
        }
        for _ in 0..2 {
            engine
                .record_override(denial_reversed("Bash", 75))
                .await
                .expect("record");
            engine
                .record_override(OverrideRecord::new(
                    "Bash",
                    DecisionLabel::Approved,
                    DecisionLabel::Denied,
                    80,
                    75,
                    conversation(),
                ))
                .await
                .expect("record");
        }

        assert_eq!(engine.suggested_threshold("Bash").await, Some(75));
    }

    #[tokio::test]
    async fn override_history_is_bounded_but_counts_persist() {
        let settings = CalibrationSettings::default()
            .with_max_override_history(3)
            .expect("settings");
        let engine = CalibrationEngine::new(settings);
        for _ in 0..5 {
            engine
                .record_override(denial_reversed("Bash", 80))
                .await
                .expect("record");
        }

        assert_eq!(engine.override_history().await.len(), 3);
        let stats = engine.stats_for("Bash").await.expect("stats");
        assert_eq!(stats.override_count(), 5);
    }

    #[tokio::test]
    async fn snapshot_reloads_verbatim() {
        let dir = TempDir::new().expect("temp dir");
        let path = dir.path().join("calibration.json");

        {
            let engine = CalibrationEngine::open(CalibrationSettings::default(), &path)
                .await
                .expect("open");
            for _ in 0..25 {
                engine
                    .record_decision("Bash", 90, DecisionLabel::Approved)
                    .await
                    .expect("record");
            }
            engine
                .record_override(denial_reversed("Bash", 80))
                .await
                .expect("record");
        }

        let reloaded = CalibrationEngine::open(CalibrationSettings::default(), &path)
            .await
            .expect("reopen");
        let stats = reloaded.stats_for("Bash").await.expect("stats");
        assert_eq!(stats.total_decisions(), 25);
        assert_eq!(stats.override_count(), 1);
        assert_eq!(stats.false_positive_count(), 1);
        assert_eq!(reloaded.override_history().await.len(), 1);
    }

    #[tokio::test]
    async fn corrupt_snapshot_starts_empty() {
        let dir = TempDir::new().expect("temp dir");
        let path = dir.path().join("calibration.json");
        tokio::fs::write(&path, b"{ not json").await.expect("write");

        let engine = CalibrationEngine::open(CalibrationSettings::default(), &path)
            .await
            .expect("open");
        assert!(engine.tool_stats().await.is_empty());
    }

    #[tokio::test]
    async fn concurrent_decisions_for_one_tool_all_land() {
        let engine = Arc::new(CalibrationEngine::new(CalibrationSettings::default()));
        let tasks = (0..8).map(|_| {
            let engine = Arc::clone(&engine);
            tokio::spawn(async move {
                engine
                    .record_decision("Bash", 70, DecisionLabel::Approved)
                    .await
            })
        });
        for result in join_all(tasks).await {
            result.expect("join").expect("record");
        }

        let stats = engine.stats_for("Bash").await.expect("stats");
        assert_eq!(stats.total_decisions(), 8);
    }

    #[tokio::test]
    async fn distinct_tools_keep_distinct_entries() {
        let engine = Arc::new(CalibrationEngine::new(CalibrationSettings::default()));
        let tasks = (0..6).map(|index| {
            let engine = Arc::clone(&engine);
            tokio::spawn(async move {
                let tool = format!("tool-{index}");
                engine
                    .record_decision(&tool, 60, DecisionLabel::Approved)
                    .await
            })
        });
        for result in join_all(tasks).await {
            result.expect("join").expect("record");
        }

        let all = engine.tool_stats().await;
        assert_eq!(all.len(), 6);
        assert!(all.iter().all(|stats| stats.total_decisions() == 1));
    }
}
