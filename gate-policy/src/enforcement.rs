//! Process-wide enforcement mode and the decision gate.

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::atomic::{AtomicU8, Ordering};

use gate_primitives::DecisionLabel;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{PolicyError, PolicyResult};

/// How much authority surfaced decisions carry.
///
/// Transitions happen only through explicit operator action; there are
/// no automatic mode changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EnforcementMode {
    /// Decisions are computed and recorded but never surfaced.
    #[default]
    Observe,
    /// Approvals surface; denials and escalations are withheld.
    ApproveOnly,
    /// Decisions surface exactly as computed.
    Enforce,
}

impl EnforcementMode {
    /// Stable lowercase label for logs and persistence.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Observe => "observe",
            Self::ApproveOnly => "approve-only",
            Self::Enforce => "enforce",
        }
    }

    /// Next mode in the operator toggle cycle.
    #[must_use]
    pub const fn next(self) -> Self {
        match self {
            Self::Observe => Self::ApproveOnly,
            Self::ApproveOnly => Self::Enforce,
            Self::Enforce => Self::Observe,
        }
    }

    const fn as_u8(self) -> u8 {
        match self {
            Self::Observe => 0,
            Self::ApproveOnly => 1,
            Self::Enforce => 2,
        }
    }

    const fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::ApproveOnly,
            2 => Self::Enforce,
            _ => Self::Observe,
        }
    }
}

impl std::fmt::Display for EnforcementMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EnforcementMode {
    type Err = PolicyError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        match input.trim().to_ascii_lowercase().replace('_', "-").as_str() {
            "observe" => Ok(Self::Observe),
            "approve-only" => Ok(Self::ApproveOnly),
            "enforce" => Ok(Self::Enforce),
            _ => Err(PolicyError::InvalidRule(
                "enforcement mode must be observe, approve-only, or enforce",
            )),
        }
    }
}

/// Result of passing a decision through the enforcement gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GateOutcome {
    surfaced: DecisionLabel,
    downgraded: bool,
}

impl GateOutcome {
    /// Label the caller may surface externally.
    #[must_use]
    pub const fn surfaced(&self) -> DecisionLabel {
        self.surfaced
    }

    /// Whether the gate withheld a stronger decision.
    #[must_use]
    pub const fn downgraded(&self) -> bool {
        self.downgraded
    }
}

/// Filters a computed decision through the current mode.
///
/// Observe withholds everything. Approve-only lets approvals through
/// and withholds denials and escalations, so the caller only ever
/// surfaces an approval or no opinion. Enforce passes the decision
/// unchanged.
#[must_use]
pub fn gate(mode: EnforcementMode, decision: DecisionLabel) -> GateOutcome {
    let surfaced = match (mode, decision) {
        (EnforcementMode::Enforce, label) => label,
        (EnforcementMode::ApproveOnly, DecisionLabel::Approved) => DecisionLabel::Approved,
        (EnforcementMode::Observe | EnforcementMode::ApproveOnly, _) => DecisionLabel::NoOpinion,
    };
    GateOutcome {
        surfaced,
        downgraded: surfaced != decision,
    }
}

/// Single process-wide enforcement mode, readable without locking.
///
/// Reads happen on every dispatched event; writes happen only on
/// operator action, optionally persisted to a small JSON file so the
/// mode survives restarts.
#[derive(Debug)]
pub struct EnforcementState {
    mode: AtomicU8,
    persist_path: Option<PathBuf>,
}

impl EnforcementState {
    /// Creates an in-memory state starting in the given mode.
    #[must_use]
    pub fn new(mode: EnforcementMode) -> Self {
        Self {
            mode: AtomicU8::new(mode.as_u8()),
            persist_path: None,
        }
    }

    /// Loads persisted state from `path`, falling back to `default`
    /// when the file does not exist or cannot be read as a mode.
    ///
    /// # Errors
    ///
    /// Returns an error when the file exists but cannot be read.
    pub async fn load(
        path: impl AsRef<Path>,
        default: EnforcementMode,
    ) -> PolicyResult<Self> {
        let path = path.as_ref();
        let mode = match tokio::fs::read(path).await {
            Ok(bytes) => match serde_json::from_slice::<ModeDocument>(&bytes) {
                Ok(document) => document.mode,
                Err(err) => {
                    warn!(path = %path.display(), error = %err, "enforcement state unreadable, using default");
                    default
                }
            },
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => default,
            Err(err) => return Err(PolicyError::Io { source: err }),
        };

        Ok(Self {
            mode: AtomicU8::new(mode.as_u8()),
            persist_path: Some(path.to_path_buf()),
        })
    }

    /// Current mode.
    #[must_use]
    pub fn mode(&self) -> EnforcementMode {
        EnforcementMode::from_u8(self.mode.load(Ordering::Acquire))
    }

    /// Sets the mode, persisting before returning when a path is
    /// configured.
    ///
    /// # Errors
    ///
    /// Returns an error when persisting the new mode fails. The
    /// in-memory mode is updated regardless, so the running service
    /// reflects the operator's intent even if the disk write failed.
    pub async fn set_mode(&self, mode: EnforcementMode) -> PolicyResult<()> {
        self.mode.store(mode.as_u8(), Ordering::Release);
        debug!(mode = %mode, "enforcement mode set");
        self.persist(mode).await
    }

    /// Advances to the next mode in the cycle and returns it.
    ///
    /// # Errors
    ///
    /// Returns an error when persisting the new mode fails.
    pub async fn toggle(&self) -> PolicyResult<EnforcementMode> {
        let next = self.mode().next();
        self.set_mode(next).await?;
        Ok(next)
    }

    async fn persist(&self, mode: EnforcementMode) -> PolicyResult<()> {
        let Some(path) = &self.persist_path else {
            return Ok(());
        };
        let bytes = serde_json::to_vec_pretty(&ModeDocument { mode })?;
        tokio::fs::write(path, bytes).await?;
        Ok(())
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct ModeDocument {
    mode: EnforcementMode,
}
