//! End-to-end scenarios for the dispatch pipeline: a scripted oracle,
//! real stores in a scratch directory, and the full wire round trip.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use serde_json::{json, Value};
use tempfile::TempDir;

use gate_config::{ConfigHandle, GateConfig};
use gate_evaluator::{EvaluatorError, EvaluatorResult, SafetyEvaluator, SafetyJudgment};
use gate_kernel::Dispatcher;
use gate_policy::{
    BehaviorKind, CalibrationEngine, CalibrationSettings, EnforcementMode, EnforcementState,
    HandlerRule, LogLevel, RuleSet,
};
use gate_primitives::{ConversationId, DecisionLabel, EventKind, SafetyCategory};
use gate_session::{SessionStore, SessionStoreConfig};

#[derive(Clone)]
enum Script {
    Judge(i64, SafetyCategory, &'static str),
    RespondFailure(&'static str),
    Unreachable,
}

struct ScriptedEvaluator {
    script: Script,
}

#[async_trait]
impl SafetyEvaluator for ScriptedEvaluator {
    async fn evaluate(&self, _prompt: &str) -> EvaluatorResult<SafetyJudgment> {
        match &self.script {
            Script::Judge(score, category, reasoning) => {
                Ok(SafetyJudgment::new(*score, *reasoning, Some(*category)))
            }
            Script::RespondFailure(reason) => Err(EvaluatorError::response(*reason)),
            Script::Unreachable => Err(EvaluatorError::Timeout {
                limit: Duration::from_secs(30),
            }),
        }
    }
}

struct Harness {
    _dir: TempDir,
    dispatcher: Dispatcher,
    sessions: Arc<SessionStore>,
    calibration: Arc<CalibrationEngine>,
}

async fn harness(mode: EnforcementMode, config: GateConfig, script: Script) -> Result<Harness> {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
    let dir = TempDir::new()?;
    let sessions = Arc::new(
        SessionStore::open(SessionStoreConfig::new(dir.path().join("sessions"))).await?,
    );
    let calibration = Arc::new(CalibrationEngine::new(CalibrationSettings::default()));
    let dispatcher = Dispatcher::builder()
        .config(Arc::new(ConfigHandle::new(config)))
        .enforcement(Arc::new(EnforcementState::new(mode)))
        .sessions(Arc::clone(&sessions))
        .calibration(Arc::clone(&calibration))
        .evaluator(Arc::new(ScriptedEvaluator { script }))
        .build()?;
    Ok(Harness {
        _dir: dir,
        dispatcher,
        sessions,
        calibration,
    })
}

fn permission_config(threshold: u8) -> GateConfig {
    let mut rules = RuleSet::new();
    rules.register(
        EventKind::PermissionRequest,
        HandlerRule::new("permission-evaluate", BehaviorKind::Evaluate)
            .expect("rule")
            .with_threshold(threshold)
            .expect("threshold"),
    );
    GateConfig::default().with_rules(rules)
}

fn bash_request(command: &str) -> Value {
    json!({
        "hookEventName": "PermissionRequest",
        "sessionId": "conv-1",
        "toolName": "Bash",
        "toolInput": {"command": command}
    })
}

fn conv() -> ConversationId {
    ConversationId::new("conv-1").expect("id")
}

#[tokio::test]
async fn safe_score_above_threshold_allows() -> Result<()> {
    let harness = harness(
        EnforcementMode::Enforce,
        permission_config(95),
        Script::Judge(96, SafetyCategory::Safe, "routine read-only command"),
    )
    .await?;

    let response = harness.dispatcher.dispatch(bash_request("git status")).await;
    let value = response.to_value();
    assert_eq!(value["hookSpecificOutput"]["decision"]["behavior"], "allow");
    Ok(())
}

#[tokio::test]
async fn dangerous_score_denies_with_message_and_interrupt() -> Result<()> {
    let harness = harness(
        EnforcementMode::Enforce,
        permission_config(95),
        Script::Judge(40, SafetyCategory::Dangerous, "wipes the working tree"),
    )
    .await?;

    let response = harness.dispatcher.dispatch(bash_request("rm -rf .")).await;
    let value = response.to_value();
    let decision = &value["hookSpecificOutput"]["decision"];
    assert_eq!(decision["behavior"], "deny");
    assert_eq!(decision["interrupt"], true);
    let message = decision["message"].as_str().expect("message");
    assert!(message.contains("40"));
    assert!(message.contains("95"));
    assert!(message.contains("wipes the working tree"));
    Ok(())
}

#[tokio::test]
async fn observe_mode_answers_empty_but_records_the_verdict() -> Result<()> {
    let harness = harness(
        EnforcementMode::Observe,
        permission_config(95),
        Script::Judge(40, SafetyCategory::Dangerous, "wipes the working tree"),
    )
    .await?;

    let response = harness.dispatcher.dispatch(bash_request("rm -rf .")).await;
    assert!(response.is_no_opinion());
    assert_eq!(serde_json::to_string(&response)?, "{}");

    let record = harness.sessions.get_or_create(&conv()).await?;
    let entry = record.log().back().expect("entry");
    assert_eq!(entry.decision(), DecisionLabel::Denied);
    assert!(entry.gated());
    assert_eq!(entry.verdict().expect("verdict").score(), 40);
    Ok(())
}

#[tokio::test]
async fn observe_mode_is_silent_for_every_behavior() -> Result<()> {
    let mut rules = RuleSet::new();
    rules.register(
        EventKind::PermissionRequest,
        HandlerRule::new("evaluate", BehaviorKind::Evaluate).expect("rule"),
    );
    rules.register(
        EventKind::PostToolUse,
        HandlerRule::new("context", BehaviorKind::InjectContext).expect("rule"),
    );
    rules.register(
        EventKind::UserPromptSubmit,
        HandlerRule::new(
            "log",
            BehaviorKind::LogOnly {
                level: LogLevel::Info,
            },
        )
        .expect("rule"),
    );
    rules.register(
        EventKind::SessionStart,
        HandlerRule::new("housekeeping", BehaviorKind::Custom).expect("rule"),
    );
    let harness = harness(
        EnforcementMode::Observe,
        GateConfig::default().with_rules(rules),
        Script::Judge(99, SafetyCategory::Safe, "all fine"),
    )
    .await?;

    for request in [
        bash_request("git status"),
        json!({"hookEventName": "PostToolUse", "sessionId": "conv-1", "toolName": "Bash"}),
        json!({"hookEventName": "UserPromptSubmit", "sessionId": "conv-1"}),
        json!({"hookEventName": "SessionStart", "sessionId": "conv-1"}),
    ] {
        let response = harness.dispatcher.dispatch(request).await;
        assert!(response.is_no_opinion());
    }
    Ok(())
}

#[tokio::test]
async fn approve_only_downgrades_denials_but_passes_approvals() -> Result<()> {
    let denying = harness(
        EnforcementMode::ApproveOnly,
        permission_config(95),
        Script::Judge(40, SafetyCategory::Dangerous, "wipes the working tree"),
    )
    .await?;
    let response = denying.dispatcher.dispatch(bash_request("rm -rf .")).await;
    assert!(response.is_no_opinion());

    let record = denying.sessions.get_or_create(&conv()).await?;
    let entry = record.log().back().expect("entry");
    assert_eq!(entry.decision(), DecisionLabel::Denied);
    assert!(entry.gated());

    let allowing = harness(
        EnforcementMode::ApproveOnly,
        permission_config(95),
        Script::Judge(96, SafetyCategory::Safe, "routine"),
    )
    .await?;
    let response = allowing.dispatcher.dispatch(bash_request("git log")).await;
    let value = response.to_value();
    assert_eq!(value["hookSpecificOutput"]["decision"]["behavior"], "allow");
    Ok(())
}

#[tokio::test]
async fn unreachable_evaluator_fails_open() -> Result<()> {
    let harness = harness(
        EnforcementMode::Enforce,
        permission_config(95),
        Script::Unreachable,
    )
    .await?;

    let response = harness.dispatcher.dispatch(bash_request("git push")).await;
    assert!(response.is_no_opinion());

    let record = harness.sessions.get_or_create(&conv()).await?;
    let entry = record.log().back().expect("entry");
    assert_eq!(entry.decision(), DecisionLabel::NoOpinion);
    assert!(entry.verdict().is_none());
    Ok(())
}

#[tokio::test]
async fn responding_failure_denies_with_error_verdict() -> Result<()> {
    let harness = harness(
        EnforcementMode::Enforce,
        permission_config(95),
        Script::RespondFailure("analyzer exited 1"),
    )
    .await?;

    let response = harness.dispatcher.dispatch(bash_request("git push")).await;
    let value = response.to_value();
    assert_eq!(value["hookSpecificOutput"]["decision"]["behavior"], "deny");

    let record = harness.sessions.get_or_create(&conv()).await?;
    let entry = record.log().back().expect("entry");
    let verdict = entry.verdict().expect("verdict");
    assert_eq!(verdict.score(), 0);
    assert_eq!(verdict.category(), SafetyCategory::Error);
    Ok(())
}

#[tokio::test]
async fn pass_through_tool_is_silent_even_in_enforce() -> Result<()> {
    let config = permission_config(95).with_pass_through_tools(vec!["Bash".to_owned()]);
    let harness = harness(
        EnforcementMode::Enforce,
        config,
        Script::Judge(0, SafetyCategory::Dangerous, "would deny"),
    )
    .await?;

    let response = harness.dispatcher.dispatch(bash_request("rm -rf /")).await;
    assert!(response.is_no_opinion());

    let record = harness.sessions.get_or_create(&conv()).await?;
    let entry = record.log().back().expect("entry");
    assert_eq!(entry.decision(), DecisionLabel::NoOpinion);
    Ok(())
}

#[tokio::test]
async fn malformed_requests_degrade_to_no_opinion() -> Result<()> {
    let harness = harness(
        EnforcementMode::Enforce,
        permission_config(95),
        Script::Judge(99, SafetyCategory::Safe, "fine"),
    )
    .await?;

    for request in [
        json!("not an object"),
        json!({}),
        json!({"hookEventName": "NotAKind", "sessionId": "conv-1"}),
        json!({"hookEventName": "PermissionRequest", "sessionId": "../escape"}),
        json!({"hookEventName": "PermissionRequest", "sessionId": "conv-1", "toolName": ""}),
    ] {
        let response = harness.dispatcher.dispatch(request).await;
        assert!(response.is_no_opinion());
        assert_eq!(serde_json::to_string(&response)?, "{}");
    }
    Ok(())
}

#[tokio::test]
async fn unmatched_event_kind_is_silent() -> Result<()> {
    let harness = harness(
        EnforcementMode::Enforce,
        permission_config(95),
        Script::Judge(99, SafetyCategory::Safe, "fine"),
    )
    .await?;

    let response = harness
        .dispatcher
        .dispatch(json!({"hookEventName": "Notification", "sessionId": "conv-1"}))
        .await;
    assert!(response.is_no_opinion());
    Ok(())
}

#[tokio::test]
async fn disabled_rule_set_is_silent() -> Result<()> {
    let mut rules = RuleSet::new();
    rules.register(
        EventKind::PermissionRequest,
        HandlerRule::new("evaluate", BehaviorKind::Evaluate).expect("rule"),
    );
    let harness = harness(
        EnforcementMode::Enforce,
        GateConfig::default().with_rules(rules.disabled()),
        Script::Judge(0, SafetyCategory::Dangerous, "would deny"),
    )
    .await?;

    let response = harness.dispatcher.dispatch(bash_request("rm -rf /")).await;
    assert!(response.is_no_opinion());
    Ok(())
}

#[tokio::test]
async fn pre_tool_mid_score_asks_instead_of_denying() -> Result<()> {
    let mut rules = RuleSet::new();
    rules.register(
        EventKind::PreToolUse,
        HandlerRule::new("pre-tool-evaluate", BehaviorKind::Evaluate)
            .expect("rule")
            .with_threshold(85)
            .expect("threshold"),
    );
    let harness = harness(
        EnforcementMode::Enforce,
        GateConfig::default().with_rules(rules),
        Script::Judge(50, SafetyCategory::Risky, "touches many files"),
    )
    .await?;

    let response = harness
        .dispatcher
        .dispatch(json!({
            "hookEventName": "PreToolUse",
            "sessionId": "conv-1",
            "toolName": "Write",
            "toolInput": {"file_path": "/etc/hosts"}
        }))
        .await;
    let value = response.to_value();
    let output = &value["hookSpecificOutput"];
    assert_eq!(output["permissionDecision"], "ask");
    assert_eq!(output["permissionDecisionReason"], "touches many files");
    Ok(())
}

#[tokio::test]
async fn post_tool_context_injection_surfaces_additional_context() -> Result<()> {
    let mut rules = RuleSet::new();
    rules.register(
        EventKind::PostToolUse,
        HandlerRule::new("post-tool-context", BehaviorKind::InjectContext).expect("rule"),
    );
    let harness = harness(
        EnforcementMode::Enforce,
        GateConfig::default().with_rules(rules),
        Script::Judge(90, SafetyCategory::Safe, "the edited file has no test coverage"),
    )
    .await?;

    let response = harness
        .dispatcher
        .dispatch(json!({
            "hookEventName": "PostToolUse",
            "sessionId": "conv-1",
            "toolName": "Edit",
            "toolInput": {"file_path": "src/lib.rs"}
        }))
        .await;
    let value = response.to_value();
    assert_eq!(
        value["hookSpecificOutput"]["additionalContext"],
        "the edited file has no test coverage"
    );
    Ok(())
}

#[tokio::test]
async fn validate_rule_denies_blocked_arguments_locally() -> Result<()> {
    let mut rules = RuleSet::new();
    rules.register(
        EventKind::PermissionRequest,
        HandlerRule::new("validate-bash", BehaviorKind::Validate)
            .expect("rule")
            .with_pattern("Bash")
            .with_option("deny_patterns", json!(["rm\\s+-rf\\s+/"])),
    );
    let harness = harness(
        EnforcementMode::Enforce,
        GateConfig::default().with_rules(rules),
        Script::Unreachable,
    )
    .await?;

    let response = harness.dispatcher.dispatch(bash_request("rm -rf /")).await;
    let value = response.to_value();
    assert_eq!(value["hookSpecificOutput"]["decision"]["behavior"], "deny");

    let response = harness.dispatcher.dispatch(bash_request("git status")).await;
    assert!(response.is_no_opinion());
    Ok(())
}

#[tokio::test]
async fn first_matching_rule_wins_across_patterns() -> Result<()> {
    let mut rules = RuleSet::new();
    rules.register(
        EventKind::PermissionRequest,
        HandlerRule::new("read-passes", BehaviorKind::LogOnly {
            level: LogLevel::Debug,
        })
        .expect("rule")
        .with_pattern("Read|Glob"),
    );
    rules.register(
        EventKind::PermissionRequest,
        HandlerRule::new("everything-else", BehaviorKind::Evaluate)
            .expect("rule")
            .with_threshold(95)
            .expect("threshold"),
    );
    let harness = harness(
        EnforcementMode::Enforce,
        GateConfig::default().with_rules(rules),
        Script::Judge(10, SafetyCategory::Dangerous, "not consulted for Read"),
    )
    .await?;

    let response = harness
        .dispatcher
        .dispatch(json!({
            "hookEventName": "PermissionRequest",
            "sessionId": "conv-1",
            "toolName": "Read",
            "toolInput": {"file_path": "/tmp/a"}
        }))
        .await;
    assert!(response.is_no_opinion());

    let response = harness.dispatcher.dispatch(bash_request("rm -rf /")).await;
    assert!(!response.is_no_opinion());
    Ok(())
}

#[tokio::test]
async fn decisions_feed_the_calibration_engine() -> Result<()> {
    let harness = harness(
        EnforcementMode::Enforce,
        permission_config(95),
        Script::Judge(40, SafetyCategory::Dangerous, "risky"),
    )
    .await?;

    for _ in 0..3 {
        harness.dispatcher.dispatch(bash_request("rm -rf .")).await;
    }

    let stats = harness
        .calibration
        .stats_for("Bash")
        .await
        .expect("stats for Bash");
    assert_eq!(stats.total_decisions(), 3);
    assert!((stats.running_average_score() - 40.0).abs() < 1e-9);
    Ok(())
}

#[tokio::test]
async fn snake_case_requests_are_equivalent() -> Result<()> {
    let harness = harness(
        EnforcementMode::Enforce,
        permission_config(95),
        Script::Judge(96, SafetyCategory::Safe, "routine"),
    )
    .await?;

    let response = harness
        .dispatcher
        .dispatch(json!({
            "hook_event_name": "PermissionRequest",
            "session_id": "conv-1",
            "tool_name": "Bash",
            "tool_input": {"command": "git status"}
        }))
        .await;
    let value = response.to_value();
    assert_eq!(value["hookSpecificOutput"]["decision"]["behavior"], "allow");
    Ok(())
}

#[tokio::test]
async fn concurrent_dispatches_all_land_in_the_conversation_log() -> Result<()> {
    let harness = harness(
        EnforcementMode::Enforce,
        permission_config(95),
        Script::Judge(96, SafetyCategory::Safe, "routine"),
    )
    .await?;

    let dispatcher = Arc::new(harness.dispatcher);
    let dispatches = (0..8).map(|n| {
        let dispatcher = Arc::clone(&dispatcher);
        async move {
            dispatcher
                .dispatch(bash_request(&format!("git log -{n}")))
                .await
        }
    });
    for response in futures::future::join_all(dispatches).await {
        let value = response.to_value();
        assert_eq!(value["hookSpecificOutput"]["decision"]["behavior"], "allow");
    }

    let record = harness.sessions.get_or_create(&conv()).await?;
    assert_eq!(record.log().len(), 8);
    Ok(())
}
