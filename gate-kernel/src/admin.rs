//! Explicit operator actions, off the hot dispatch path.
//!
//! Unlike [`Dispatcher::dispatch`](crate::Dispatcher::dispatch), every
//! operation here returns a real error: an operator who asked for a
//! mode change or an install must learn when it did not take effect.

use std::path::Path;
use std::sync::Arc;

use tracing::info;

use gate_config::{ConfigHandle, GateConfig};
use gate_hooks::HookSynchronizer;
use gate_policy::{
    CalibrationEngine, EnforcementMode, EnforcementState, OverrideRecord, PatternMatcher,
    ToolStats,
};
use gate_primitives::{ConversationId, DecisionLabel};
use gate_session::SessionStore;

use crate::error::KernelResult;

/// Administrative surface over the shared service state.
pub struct GateAdmin {
    config: Arc<ConfigHandle>,
    enforcement: Arc<EnforcementState>,
    sessions: Arc<SessionStore>,
    calibration: Arc<CalibrationEngine>,
    matcher: Arc<PatternMatcher>,
    hooks: HookSynchronizer,
}

impl GateAdmin {
    /// Wraps the shared components behind the administrative surface.
    ///
    /// The components are the same instances the dispatcher uses, so a
    /// mode change or config reload is visible to the next dispatched
    /// event.
    #[must_use]
    pub fn new(
        config: Arc<ConfigHandle>,
        enforcement: Arc<EnforcementState>,
        sessions: Arc<SessionStore>,
        calibration: Arc<CalibrationEngine>,
        matcher: Arc<PatternMatcher>,
        hooks: HookSynchronizer,
    ) -> Self {
        Self {
            config,
            enforcement,
            sessions,
            calibration,
            matcher,
            hooks,
        }
    }

    /// Current enforcement mode.
    #[must_use]
    pub fn mode(&self) -> EnforcementMode {
        self.enforcement.mode()
    }

    /// Sets the enforcement mode.
    ///
    /// # Errors
    ///
    /// Returns an error when the new mode cannot be persisted.
    pub async fn set_mode(&self, mode: EnforcementMode) -> KernelResult<()> {
        self.enforcement.set_mode(mode).await?;
        info!(mode = %mode, "enforcement mode set by operator");
        Ok(())
    }

    /// Advances the enforcement mode one step through the cycle and
    /// returns the new mode.
    ///
    /// # Errors
    ///
    /// Returns an error when the new mode cannot be persisted.
    pub async fn toggle_mode(&self) -> KernelResult<EnforcementMode> {
        let mode = self.enforcement.toggle().await?;
        info!(mode = %mode, "enforcement mode toggled by operator");
        Ok(mode)
    }

    /// Mirrors the active rule configuration into the external hook
    /// document.
    ///
    /// # Errors
    ///
    /// Returns an error when the document cannot be read or rewritten.
    pub async fn install_hooks(&self) -> KernelResult<()> {
        let config = self.config.current();
        self.hooks.install(config.rules()).await?;
        info!(path = %self.hooks.settings_path().display(), "hooks installed");
        Ok(())
    }

    /// Removes every service-owned entry from the hook document.
    ///
    /// # Errors
    ///
    /// Returns an error when the document cannot be read or rewritten.
    pub async fn uninstall_hooks(&self) -> KernelResult<()> {
        self.hooks.uninstall().await?;
        info!(path = %self.hooks.settings_path().display(), "hooks uninstalled");
        Ok(())
    }

    /// Whether any service-owned hook entry is currently registered.
    ///
    /// # Errors
    ///
    /// Returns an error when the document exists but cannot be read.
    pub async fn hooks_installed(&self) -> KernelResult<bool> {
        Ok(self.hooks.is_installed().await?)
    }

    /// Deletes every conversation record, in memory and on disk.
    ///
    /// # Errors
    ///
    /// Returns an error when any record file cannot be removed.
    pub async fn clear_sessions(&self) -> KernelResult<()> {
        self.sessions.clear_all().await?;
        info!("all conversation records cleared by operator");
        Ok(())
    }

    /// Reloads the configuration document, resyncs the matcher cache to
    /// the new pattern set, and refreshes the hook document when it is
    /// currently installed.
    ///
    /// # Errors
    ///
    /// Returns an error when the document cannot be read, parsed, or
    /// validated, or when refreshing the hook document fails. The
    /// previous configuration stays active on load failure.
    pub async fn reload_config(&self, path: impl AsRef<Path>) -> KernelResult<Arc<GateConfig>> {
        let installed = self.config.reload(path).await?;
        self.matcher.sync(&installed.rules().pattern_texts());
        if self.hooks.is_installed().await? {
            self.hooks.install(installed.rules()).await?;
        }
        info!("configuration reloaded");
        Ok(installed)
    }

    /// Records a human decision that disagreed with the system verdict.
    ///
    /// # Errors
    ///
    /// Returns an error when the calibration snapshot cannot be
    /// persisted.
    pub async fn record_override(
        &self,
        tool_name: &str,
        original_decision: DecisionLabel,
        human_decision: DecisionLabel,
        score: u8,
        threshold: u8,
        conversation_id: ConversationId,
    ) -> KernelResult<()> {
        let record = OverrideRecord::new(
            tool_name,
            original_decision,
            human_decision,
            score,
            threshold,
            conversation_id,
        );
        self.calibration.record_override(record).await?;
        Ok(())
    }

    /// Statistics for every tool that has seen a decision.
    pub async fn tool_stats(&self) -> Vec<ToolStats> {
        self.calibration.tool_stats().await
    }

    /// Suggested approval threshold for one tool, once evidence
    /// suffices.
    pub async fn suggested_threshold(&self, tool_name: &str) -> Option<u8> {
        self.calibration.suggested_threshold(tool_name).await
    }
}
