//! Mirrors the configured handler rules into the agent's hook document.
//!
//! The document is owned by the agent and may carry registrations from
//! other tools or from the operator's own hand. Every entry this
//! service writes carries a trailing marker token in its command
//! string; synchronization replaces exactly the marked set and leaves
//! everything else byte-for-byte alone.

use std::path::{Path, PathBuf};

use gate_policy::{HandlerRule, RuleSet};
use gate_primitives::EventKind;
use serde_json::{json, Map, Value};
use tokio::fs;
use tracing::{debug, warn};

use crate::error::{HookError, HookResult};

/// Trailing token identifying entries this service owns.
///
/// It rides at the end of the command string, where a shell treats it
/// as a comment, so marked commands execute identically to unmarked
/// ones.
pub const MANAGED_MARKER: &str = "#toolgate-managed";

const HOOKS_KEY: &str = "hooks";

/// Synchronizes handler rules into the external hook document.
#[derive(Debug, Clone)]
pub struct HookSynchronizer {
    settings_path: PathBuf,
    command: String,
    timeout_secs: u64,
}

impl HookSynchronizer {
    /// Creates a synchronizer targeting the given document path.
    #[must_use]
    pub fn new(settings_path: impl Into<PathBuf>) -> Self {
        Self {
            settings_path: settings_path.into(),
            command: "toolgate-hook".to_owned(),
            timeout_secs: 30,
        }
    }

    /// Sets the hook command the agent should run.
    #[must_use]
    pub fn with_command(mut self, command: impl Into<String>) -> Self {
        self.command = command.into();
        self
    }

    /// Sets the per-entry timeout written into registrations.
    #[must_use]
    pub fn with_timeout_secs(mut self, timeout_secs: u64) -> Self {
        self.timeout_secs = timeout_secs;
        self
    }

    /// Path of the document being synchronized.
    #[must_use]
    pub fn settings_path(&self) -> &Path {
        &self.settings_path
    }

    /// Registers one marked entry per configured rule, replacing any
    /// previously marked entries.
    ///
    /// A disabled rule set synchronizes to zero marked entries, which
    /// makes install with a disabled configuration equivalent to
    /// [`HookSynchronizer::uninstall`]. Repeated calls with unchanged
    /// configuration leave the document bytes untouched.
    ///
    /// # Errors
    ///
    /// Returns an error when the document root or a configured event
    /// kind entry has a shape that cannot hold hook registrations, or
    /// when reading or writing the file fails.
    pub async fn install(&self, rules: &RuleSet) -> HookResult<()> {
        let mut document = self.read_document().await?;
        let root = document
            .as_object_mut()
            .ok_or(HookError::Document("root is not a JSON object"))?;

        let had_hooks_section = root.contains_key(HOOKS_KEY);
        let hooks = root
            .entry(HOOKS_KEY)
            .or_insert_with(|| Value::Object(Map::new()))
            .as_object_mut()
            .ok_or(HookError::Document("hooks section is not a JSON object"))?;

        let mut touched = strip_managed(hooks);

        if rules.enabled() {
            for kind in rules.registered_kinds() {
                let desired = self.entries_for(kind, rules.rules_for(kind));
                if desired.is_empty() {
                    continue;
                }
                let array = hooks
                    .entry(kind.as_str().to_owned())
                    .or_insert_with(|| Value::Array(Vec::new()))
                    .as_array_mut()
                    .ok_or(HookError::Document("event kind entry is not a JSON array"))?;
                array.extend(desired);
                touched.push(kind.as_str().to_owned());
            }
        }

        drop_emptied(hooks, &touched);
        let hooks_empty = hooks.is_empty();
        if hooks_empty && (!had_hooks_section || !touched.is_empty()) {
            root.remove(HOOKS_KEY);
        }

        self.write_document(&document).await
    }

    /// Removes every marked entry, dropping event kinds and the hooks
    /// section itself when the removal empties them.
    ///
    /// # Errors
    ///
    /// Returns an error when the document root or hooks section has an
    /// unexpected shape, or when reading or writing the file fails.
    pub async fn uninstall(&self) -> HookResult<()> {
        let mut document = self.read_document().await?;
        let root = document
            .as_object_mut()
            .ok_or(HookError::Document("root is not a JSON object"))?;

        let Some(hooks_value) = root.get_mut(HOOKS_KEY) else {
            return Ok(());
        };
        let hooks = hooks_value
            .as_object_mut()
            .ok_or(HookError::Document("hooks section is not a JSON object"))?;

        let touched = strip_managed(hooks);
        if touched.is_empty() {
            return Ok(());
        }

        drop_emptied(hooks, &touched);
        if hooks.is_empty() {
            root.remove(HOOKS_KEY);
        }

        self.write_document(&document).await
    }

    /// Whether any marked entry is currently registered.
    ///
    /// # Errors
    ///
    /// Returns an error when the document exists but cannot be read.
    pub async fn is_installed(&self) -> HookResult<bool> {
        let document = self.read_document().await?;
        Ok(document
            .get(HOOKS_KEY)
            .and_then(Value::as_object)
            .is_some_and(|hooks| {
                hooks
                    .values()
                    .filter_map(Value::as_array)
                    .flatten()
                    .any(is_managed)
            }))
    }

    fn entries_for(&self, kind: EventKind, rules: &[HandlerRule]) -> Vec<Value> {
        rules
            .iter()
            .map(|rule| {
                let mut entry = Map::new();
                entry.insert("type".to_owned(), Value::String("command".to_owned()));
                if let Some(pattern) = rule.match_pattern() {
                    entry.insert("matcher".to_owned(), Value::String(pattern.to_owned()));
                }
                entry.insert(
                    "command".to_owned(),
                    Value::String(format!(
                        "{} --event {} {MANAGED_MARKER}",
                        self.command,
                        kind.as_str()
                    )),
                );
                entry.insert("timeout".to_owned(), json!(self.timeout_secs));
                Value::Object(entry)
            })
            .collect()
    }

    async fn read_document(&self) -> HookResult<Value> {
        match fs::read(&self.settings_path).await {
            Ok(bytes) => match serde_json::from_slice(&bytes) {
                Ok(value) => Ok(value),
                Err(err) => {
                    warn!(
                        path = %self.settings_path.display(),
                        error = %err,
                        "hook document unparseable, treating as empty"
                    );
                    Ok(json!({}))
                }
            },
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(json!({})),
            Err(err) => Err(HookError::Io { source: err }),
        }
    }

    async fn write_document(&self, document: &Value) -> HookResult<()> {
        let mut bytes = serde_json::to_vec_pretty(document)?;
        bytes.push(b'\n');

        if let Ok(existing) = fs::read(&self.settings_path).await {
            if existing == bytes {
                debug!(path = %self.settings_path.display(), "hook document unchanged");
                return Ok(());
            }
        }

        if let Some(parent) = self.settings_path.parent() {
            fs::create_dir_all(parent).await?;
        }
        fs::write(&self.settings_path, bytes).await?;
        debug!(path = %self.settings_path.display(), "hook document rewritten");
        Ok(())
    }
}

fn is_managed(entry: &Value) -> bool {
    entry
        .get("command")
        .and_then(Value::as_str)
        .is_some_and(|command| command.ends_with(MANAGED_MARKER))
}

/// Removes marked entries from every array-valued key, returning the
/// keys whose arrays changed.
fn strip_managed(hooks: &mut Map<String, Value>) -> Vec<String> {
    let mut touched = Vec::new();
    for (key, value) in hooks.iter_mut() {
        if let Some(array) = value.as_array_mut() {
            let before = array.len();
            array.retain(|entry| !is_managed(entry));
            if array.len() != before {
                touched.push(key.clone());
            }
        }
    }
    touched
}

/// Drops keys we emptied ourselves; arrays that were already empty
/// before synchronization are left alone.
fn drop_emptied(hooks: &mut Map<String, Value>, touched: &[String]) {
    for key in touched {
        if hooks
            .get(key)
            .and_then(Value::as_array)
            .is_some_and(Vec::is_empty)
        {
            hooks.remove(key);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gate_policy::BehaviorKind;
    use tempfile::TempDir;

    fn synchronizer(dir: &TempDir) -> HookSynchronizer {
        HookSynchronizer::new(dir.path().join("settings.json")).with_timeout_secs(20)
    }

    fn rules_with_pattern(pattern: &str) -> RuleSet {
        let mut rules = RuleSet::new();
        rules.register(
            EventKind::PreToolUse,
            HandlerRule::new("pre-tool-evaluate", BehaviorKind::Evaluate)
                .expect("rule")
                .with_pattern(pattern),
        );
        rules.register(
            EventKind::UserPromptSubmit,
            HandlerRule::new(
                "prompt-log",
                BehaviorKind::LogOnly {
                    level: gate_policy::LogLevel::Info,
                },
            )
            .expect("rule"),
        );
        rules
    }

    async fn read_json(sync: &HookSynchronizer) -> Value {
        let bytes = fs::read(sync.settings_path()).await.expect("read");
        serde_json::from_slice(&bytes).expect("parse")
    }

    #[tokio::test]
    async fn install_registers_marked_entries_per_kind() {
        let dir = TempDir::new().expect("temp dir");
        let sync = synchronizer(&dir);
        sync.install(&rules_with_pattern("Bash")).await.expect("install");

        let document = read_json(&sync).await;
        let pre = document["hooks"]["PreToolUse"].as_array().expect("array");
        assert_eq!(pre.len(), 1);
        assert_eq!(pre[0]["type"], "command");
        assert_eq!(pre[0]["matcher"], "Bash");
        assert_eq!(pre[0]["timeout"], 20);
        let command = pre[0]["command"].as_str().expect("command");
        assert!(command.starts_with("toolgate-hook --event PreToolUse"));
        assert!(command.ends_with(MANAGED_MARKER));

        let prompt = document["hooks"]["UserPromptSubmit"]
            .as_array()
            .expect("array");
        assert_eq!(prompt.len(), 1);
        assert!(prompt[0].get("matcher").is_none());
    }

    #[tokio::test]
    async fn repeated_install_is_byte_equivalent() {
        let dir = TempDir::new().expect("temp dir");
        let sync = synchronizer(&dir);
        let rules = rules_with_pattern("Bash");

        sync.install(&rules).await.expect("first install");
        let first = fs::read(sync.settings_path()).await.expect("read");
        sync.install(&rules).await.expect("second install");
        let second = fs::read(sync.settings_path()).await.expect("read");

        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn install_preserves_foreign_entries_and_keys() {
        let dir = TempDir::new().expect("temp dir");
        let sync = synchronizer(&dir);
        let existing = json!({
            "model": "opus",
            "hooks": {
                "PreToolUse": [
                    {"type": "command", "command": "echo before"}
                ]
            }
        });
        fs::write(sync.settings_path(), serde_json::to_vec_pretty(&existing).expect("serialize"))
            .await
            .expect("seed");

        sync.install(&rules_with_pattern("Bash")).await.expect("install");

        let document = read_json(&sync).await;
        assert_eq!(document["model"], "opus");
        let pre = document["hooks"]["PreToolUse"].as_array().expect("array");
        assert_eq!(pre.len(), 2);
        assert_eq!(pre[0]["command"], "echo before");
        assert!(is_managed(&pre[1]));
    }

    #[tokio::test]
    async fn reinstall_replaces_the_managed_set() {
        let dir = TempDir::new().expect("temp dir");
        let sync = synchronizer(&dir);

        sync.install(&rules_with_pattern("Bash")).await.expect("install");
        sync.install(&rules_with_pattern("Write|Edit"))
            .await
            .expect("reinstall");

        let document = read_json(&sync).await;
        let pre = document["hooks"]["PreToolUse"].as_array().expect("array");
        assert_eq!(pre.len(), 1);
        assert_eq!(pre[0]["matcher"], "Write|Edit");
    }

    #[tokio::test]
    async fn disabled_rules_synchronize_to_removal() {
        let dir = TempDir::new().expect("temp dir");
        let sync = synchronizer(&dir);

        sync.install(&rules_with_pattern("Bash")).await.expect("install");
        assert!(sync.is_installed().await.expect("query"));

        sync.install(&rules_with_pattern("Bash").disabled())
            .await
            .expect("sync disabled");
        assert!(!sync.is_installed().await.expect("query"));
    }

    #[tokio::test]
    async fn uninstall_removes_only_managed_entries() {
        let dir = TempDir::new().expect("temp dir");
        let sync = synchronizer(&dir);
        let existing = json!({
            "hooks": {
                "PreToolUse": [
                    {"type": "command", "command": "echo before"}
                ]
            }
        });
        fs::write(sync.settings_path(), serde_json::to_vec_pretty(&existing).expect("serialize"))
            .await
            .expect("seed");

        sync.install(&rules_with_pattern("Bash")).await.expect("install");
        sync.uninstall().await.expect("uninstall");

        let document = read_json(&sync).await;
        let pre = document["hooks"]["PreToolUse"].as_array().expect("array");
        assert_eq!(pre.len(), 1);
        assert_eq!(pre[0]["command"], "echo before");
        // UserPromptSubmit held only a managed entry, so the key is gone.
        assert!(document["hooks"].get("UserPromptSubmit").is_none());
    }

    #[tokio::test]
    async fn uninstall_drops_an_emptied_hooks_section() {
        let dir = TempDir::new().expect("temp dir");
        let sync = synchronizer(&dir);

        sync.install(&rules_with_pattern("Bash")).await.expect("install");
        sync.uninstall().await.expect("uninstall");

        let document = read_json(&sync).await;
        assert!(document.get(HOOKS_KEY).is_none());
    }

    #[tokio::test]
    async fn uninstall_without_a_document_writes_nothing() {
        let dir = TempDir::new().expect("temp dir");
        let sync = synchronizer(&dir);

        sync.uninstall().await.expect("uninstall");
        assert!(!sync.settings_path().exists());
    }

    #[tokio::test]
    async fn is_installed_tracks_lifecycle() {
        let dir = TempDir::new().expect("temp dir");
        let sync = synchronizer(&dir);

        assert!(!sync.is_installed().await.expect("query"));
        sync.install(&rules_with_pattern("Bash")).await.expect("install");
        assert!(sync.is_installed().await.expect("query"));
        sync.uninstall().await.expect("uninstall");
        assert!(!sync.is_installed().await.expect("query"));
    }

    #[tokio::test]
    async fn non_object_root_is_rejected() {
        let dir = TempDir::new().expect("temp dir");
        let sync = synchronizer(&dir);
        fs::write(sync.settings_path(), b"[1, 2, 3]").await.expect("seed");

        assert!(matches!(
            sync.install(&rules_with_pattern("Bash")).await,
            Err(HookError::Document(_))
        ));
    }

    #[tokio::test]
    async fn pre_existing_empty_kind_array_is_left_alone() {
        let dir = TempDir::new().expect("temp dir");
        let sync = synchronizer(&dir);
        let existing = json!({"hooks": {"Stop": []}});
        fs::write(sync.settings_path(), serde_json::to_vec_pretty(&existing).expect("serialize"))
            .await
            .expect("seed");

        sync.install(&rules_with_pattern("Bash")).await.expect("install");

        let document = read_json(&sync).await;
        assert!(document["hooks"]["Stop"].as_array().expect("array").is_empty());
    }
}
