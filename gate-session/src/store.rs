//! Durable session store keyed by conversation.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::fs;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, warn};

use gate_primitives::ConversationId;

use crate::error::{SessionError, SessionResult};
use crate::record::{ConversationRecord, EventRecord};

/// Configuration for [`SessionStore`].
#[derive(Clone, Debug)]
pub struct SessionStoreConfig {
    root_dir: PathBuf,
    max_events_per_conversation: usize,
}

impl SessionStoreConfig {
    /// Creates a configuration persisting under the supplied directory.
    #[must_use]
    pub fn new(root_dir: impl Into<PathBuf>) -> Self {
        Self {
            root_dir: root_dir.into(),
            max_events_per_conversation: 500,
        }
    }

    /// Caps the number of retained events per conversation.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::InvalidConfig`] when the cap is zero.
    pub fn with_max_events(mut self, max_events: usize) -> SessionResult<Self> {
        if max_events == 0 {
            return Err(SessionError::InvalidConfig(
                "max events per conversation must be at least 1",
            ));
        }
        self.max_events_per_conversation = max_events;
        Ok(self)
    }

    /// Directory conversation files are written to.
    #[must_use]
    pub fn root_dir(&self) -> &Path {
        &self.root_dir
    }

    /// Retention cap per conversation.
    #[must_use]
    pub const fn max_events(&self) -> usize {
        self.max_events_per_conversation
    }
}

/// Durable, per-conversation append-only event log.
///
/// Conversations are held behind individual async mutexes inside a shared
/// read-write map: operations on distinct conversations proceed in
/// parallel while operations on one conversation are serialized. Every
/// acknowledged append has already been written to disk.
pub struct SessionStore {
    config: SessionStoreConfig,
    conversations: RwLock<HashMap<ConversationId, Arc<Mutex<ConversationRecord>>>>,
}

impl SessionStore {
    /// Opens the store, creating its directory when missing.
    ///
    /// # Errors
    ///
    /// Propagates I/O errors encountered while preparing the directory.
    pub async fn open(config: SessionStoreConfig) -> SessionResult<Self> {
        fs::create_dir_all(&config.root_dir).await?;
        Ok(Self {
            config,
            conversations: RwLock::new(HashMap::new()),
        })
    }

    /// Returns a snapshot of the conversation, creating (and persisting)
    /// an empty record on first access.
    ///
    /// # Errors
    ///
    /// Propagates persistence errors for newly created conversations.
    pub async fn get_or_create(
        &self,
        conversation_id: &ConversationId,
    ) -> SessionResult<ConversationRecord> {
        let entry = self.entry(conversation_id).await?;
        let guard = entry.lock().await;
        Ok(guard.clone())
    }

    /// Appends a record to the conversation log, trimming to the retention
    /// cap and persisting before returning.
    ///
    /// The in-memory log reflects the append even when persistence fails,
    /// so decisions remain consistent while the failure is surfaced.
    ///
    /// # Errors
    ///
    /// Returns the persistence error, if any.
    pub async fn append(
        &self,
        conversation_id: &ConversationId,
        record: EventRecord,
    ) -> SessionResult<()> {
        let entry = self.entry(conversation_id).await?;
        let mut guard = entry.lock().await;
        guard.append(record, self.config.max_events_per_conversation);
        self.persist(&guard).await
    }

    /// Renders the most recent `max_events` log entries chronologically.
    ///
    /// # Errors
    ///
    /// Propagates persistence errors for newly created conversations.
    pub async fn build_context(
        &self,
        conversation_id: &ConversationId,
        max_events: usize,
    ) -> SessionResult<String> {
        let entry = self.entry(conversation_id).await?;
        let guard = entry.lock().await;
        Ok(guard.render_context(max_events))
    }

    /// Number of conversations currently resident in memory.
    pub async fn conversation_count(&self) -> usize {
        self.conversations.read().await.len()
    }

    /// Deletes every conversation, in memory and on disk.
    ///
    /// # Errors
    ///
    /// Propagates I/O errors; this is an explicit operator action where
    /// silent failure would mislead.
    pub async fn clear_all(&self) -> SessionResult<()> {
        let mut map = self.conversations.write().await;
        map.clear();
        let mut entries = fs::read_dir(&self.config.root_dir).await?;
        while let Some(dir_entry) = entries.next_entry().await? {
            let path = dir_entry.path();
            if path.extension().is_some_and(|ext| ext == "json") {
                fs::remove_file(&path).await?;
            }
        }
        Ok(())
    }

    /// Resolves the shared handle for a conversation, creating it on
    /// first access. Creation persists the empty record while holding the
    /// map write lock, so concurrent first access yields exactly one
    /// persisted record.
    async fn entry(
        &self,
        conversation_id: &ConversationId,
    ) -> SessionResult<Arc<Mutex<ConversationRecord>>> {
        {
            let map = self.conversations.read().await;
            if let Some(entry) = map.get(conversation_id) {
                return Ok(Arc::clone(entry));
            }
        }

        let mut map = self.conversations.write().await;
        if let Some(entry) = map.get(conversation_id) {
            return Ok(Arc::clone(entry));
        }

        let record = match self.load(conversation_id).await {
            Some(record) => {
                debug!(conversation = %conversation_id, "reloaded persisted conversation");
                record
            }
            None => {
                let record = ConversationRecord::new(conversation_id.clone());
                self.persist(&record).await?;
                record
            }
        };

        let entry = Arc::new(Mutex::new(record));
        map.insert(conversation_id.clone(), Arc::clone(&entry));
        Ok(entry)
    }

    async fn load(&self, conversation_id: &ConversationId) -> Option<ConversationRecord> {
        let path = self.conversation_path(conversation_id);
        let data = match fs::read(&path).await {
            Ok(data) => data,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return None,
            Err(err) => {
                warn!(conversation = %conversation_id, error = %err, "failed to read conversation file");
                return None;
            }
        };
        match serde_json::from_slice(&data) {
            Ok(record) => Some(record),
            Err(err) => {
                warn!(conversation = %conversation_id, error = %err, "corrupt conversation file, starting fresh");
                None
            }
        }
    }

    async fn persist(&self, record: &ConversationRecord) -> SessionResult<()> {
        let path = self.conversation_path(record.conversation_id());
        let data = serde_json::to_vec_pretty(record)?;
        fs::write(&path, data).await?;
        Ok(())
    }

    fn conversation_path(&self, conversation_id: &ConversationId) -> PathBuf {
        // ConversationId validation forbids path separators, so the id is
        // safe to use as a file stem.
        self.config
            .root_dir
            .join(format!("{}.json", conversation_id.as_str()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::future::join_all;
    use gate_primitives::{DecisionLabel, EventKind, ToolEvent};
    use serde_json::json;
    use tempfile::TempDir;

    fn cid(text: &str) -> ConversationId {
        ConversationId::new(text).expect("id")
    }

    fn record(conversation: &ConversationId, command: &str) -> EventRecord {
        let event = ToolEvent::builder(EventKind::PreToolUse, conversation.clone())
            .tool_name("Bash")
            .expect("name")
            .tool_arguments(json!({"command": command}))
            .build();
        EventRecord::builder(event)
            .decision(DecisionLabel::Approved)
            .build()
    }

    async fn open_store(dir: &TempDir) -> SessionStore {
        SessionStore::open(SessionStoreConfig::new(dir.path()))
            .await
            .expect("open")
    }

    #[tokio::test]
    async fn creates_and_persists_fresh_conversation() {
        let dir = TempDir::new().expect("tempdir");
        let store = open_store(&dir).await;
        let id = cid("conv-fresh");

        let snapshot = store.get_or_create(&id).await.expect("create");
        assert!(snapshot.log().is_empty());
        assert!(dir.path().join("conv-fresh.json").exists());
    }

    #[tokio::test]
    async fn concurrent_first_access_creates_one_record() {
        let dir = TempDir::new().expect("tempdir");
        let store = Arc::new(open_store(&dir).await);
        let id = cid("conv-racy");

        let tasks: Vec<_> = (0..16)
            .map(|_| {
                let store = Arc::clone(&store);
                let id = id.clone();
                tokio::spawn(async move { store.get_or_create(&id).await })
            })
            .collect();
        for result in join_all(tasks).await {
            result.expect("join").expect("create");
        }

        assert_eq!(store.conversation_count().await, 1);
        let files: Vec<_> = std::fs::read_dir(dir.path())
            .expect("read dir")
            .filter_map(Result::ok)
            .collect();
        assert_eq!(files.len(), 1);
    }

    #[tokio::test]
    async fn concurrent_appends_lose_nothing() {
        let dir = TempDir::new().expect("tempdir");
        let store = Arc::new(open_store(&dir).await);
        let id = cid("conv-appends");

        let tasks: Vec<_> = (0..8)
            .map(|index| {
                let store = Arc::clone(&store);
                let id = id.clone();
                tokio::spawn(async move {
                    store.append(&id, record(&id, &format!("cmd-{index}"))).await
                })
            })
            .collect();
        for result in join_all(tasks).await {
            result.expect("join").expect("append");
        }

        let snapshot = store.get_or_create(&id).await.expect("get");
        assert_eq!(snapshot.log().len(), 8);
    }

    #[tokio::test]
    async fn append_trims_to_configured_max() {
        let dir = TempDir::new().expect("tempdir");
        let config = SessionStoreConfig::new(dir.path())
            .with_max_events(3)
            .expect("config");
        let store = SessionStore::open(config).await.expect("open");
        let id = cid("conv-trim");

        for index in 0..6 {
            store
                .append(&id, record(&id, &format!("cmd-{index}")))
                .await
                .expect("append");
        }

        let snapshot = store.get_or_create(&id).await.expect("get");
        assert_eq!(snapshot.log().len(), 3);
        let context = snapshot.render_context(10);
        assert!(context.contains("cmd-5"));
        assert!(!context.contains("cmd-0"));
    }

    #[tokio::test]
    async fn reloads_conversation_from_previous_instance() {
        let dir = TempDir::new().expect("tempdir");
        let id = cid("conv-restart");
        {
            let store = open_store(&dir).await;
            store.append(&id, record(&id, "before restart")).await.expect("append");
        }

        let store = open_store(&dir).await;
        let snapshot = store.get_or_create(&id).await.expect("reload");
        assert_eq!(snapshot.log().len(), 1);
        assert!(snapshot.render_context(5).contains("before restart"));
    }

    #[tokio::test]
    async fn clear_all_removes_memory_and_files() {
        let dir = TempDir::new().expect("tempdir");
        let store = open_store(&dir).await;
        for name in ["conv-a", "conv-b"] {
            let id = cid(name);
            store.append(&id, record(&id, "ls")).await.expect("append");
        }

        store.clear_all().await.expect("clear");
        assert_eq!(store.conversation_count().await, 0);
        let remaining = std::fs::read_dir(dir.path())
            .expect("read dir")
            .filter_map(Result::ok)
            .count();
        assert_eq!(remaining, 0);
    }

    #[tokio::test]
    async fn build_context_renders_recent_events() {
        let dir = TempDir::new().expect("tempdir");
        let store = open_store(&dir).await;
        let id = cid("conv-context");

        for command in ["first", "second", "third"] {
            store.append(&id, record(&id, command)).await.expect("append");
        }

        let context = store.build_context(&id, 2).await.expect("context");
        assert!(!context.contains("first"));
        assert!(context.contains("second"));
        assert!(context.contains("third"));
    }

    #[test]
    fn zero_retention_cap_is_rejected() {
        let err = SessionStoreConfig::new("/tmp/unused")
            .with_max_events(0)
            .expect_err("zero cap");
        assert!(matches!(err, SessionError::InvalidConfig(_)));
    }
}
