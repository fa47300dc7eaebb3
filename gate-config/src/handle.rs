//! Shared, hot-swappable view of the loaded configuration.

use std::path::Path;
use std::sync::{Arc, RwLock};

use tracing::debug;

use crate::document::GateConfig;
use crate::error::ConfigResult;

/// Process-wide handle to the current configuration.
///
/// Readers take an [`Arc`] snapshot and keep using it for the length of
/// one request; a reload swaps the shared pointer so in-flight requests
/// finish against the configuration they started with.
#[derive(Debug)]
pub struct ConfigHandle {
    inner: RwLock<Arc<GateConfig>>,
}

impl ConfigHandle {
    /// Wraps an already-loaded configuration.
    #[must_use]
    pub fn new(config: GateConfig) -> Self {
        Self {
            inner: RwLock::new(Arc::new(config)),
        }
    }

    /// Snapshot of the current configuration.
    ///
    /// # Panics
    ///
    /// Panics if the internal lock has been poisoned.
    #[must_use]
    pub fn current(&self) -> Arc<GateConfig> {
        Arc::clone(&self.inner.read().expect("config handle poisoned"))
    }

    /// Swaps in a new configuration and returns the installed snapshot.
    ///
    /// # Panics
    ///
    /// Panics if the internal lock has been poisoned.
    pub fn replace(&self, config: GateConfig) -> Arc<GateConfig> {
        let installed = Arc::new(config);
        let mut guard = self.inner.write().expect("config handle poisoned");
        *guard = Arc::clone(&installed);
        drop(guard);
        debug!("configuration replaced");
        installed
    }

    /// Reloads the document at `path` and swaps it in.
    ///
    /// The previous configuration stays installed when loading or
    /// validation fails.
    ///
    /// # Errors
    ///
    /// Returns an error when the document cannot be read, parsed, or
    /// validated.
    pub async fn reload(&self, path: impl AsRef<Path>) -> ConfigResult<Arc<GateConfig>> {
        let config = GateConfig::load(path).await?;
        Ok(self.replace(config))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gate_policy::EnforcementMode;
    use tempfile::TempDir;

    #[test]
    fn current_returns_the_installed_snapshot() {
        let handle = ConfigHandle::new(
            GateConfig::default().with_enforcement_mode(EnforcementMode::Enforce),
        );
        assert_eq!(
            handle.current().enforcement_mode(),
            EnforcementMode::Enforce
        );
    }

    #[test]
    fn replace_swaps_but_existing_snapshots_survive() {
        let handle = ConfigHandle::new(GateConfig::default());
        let before = handle.current();

        handle.replace(GateConfig::default().with_enforcement_mode(EnforcementMode::Enforce));

        assert_eq!(before.enforcement_mode(), EnforcementMode::Observe);
        assert_eq!(
            handle.current().enforcement_mode(),
            EnforcementMode::Enforce
        );
    }

    #[tokio::test]
    async fn failed_reload_keeps_the_previous_configuration() {
        let dir = TempDir::new().expect("temp dir");
        let path = dir.path().join("config.json");
        tokio::fs::write(&path, b"broken").await.expect("write");

        let handle = ConfigHandle::new(
            GateConfig::default().with_enforcement_mode(EnforcementMode::ApproveOnly),
        );
        assert!(handle.reload(&path).await.is_err());
        assert_eq!(
            handle.current().enforcement_mode(),
            EnforcementMode::ApproveOnly
        );
    }

    #[tokio::test]
    async fn successful_reload_installs_the_document() {
        let dir = TempDir::new().expect("temp dir");
        let path = dir.path().join("config.json");
        let document = GateConfig::standard().with_enforcement_mode(EnforcementMode::Enforce);
        tokio::fs::write(&path, serde_json::to_vec_pretty(&document).expect("serialize"))
            .await
            .expect("write");

        let handle = ConfigHandle::new(GateConfig::default());
        let installed = handle.reload(&path).await.expect("reload");
        assert_eq!(installed.enforcement_mode(), EnforcementMode::Enforce);
    }
}
