//! Error types for the administrative surface.

use thiserror::Error;

/// Errors surfaced by explicit operator actions.
///
/// The automated dispatch path never returns these; it degrades to "no
/// opinion" instead. Administrative operations are different: an
/// operator who asked for an install or a mode change must learn when
/// it did not happen.
#[derive(Debug, Error)]
pub enum KernelError {
    /// A required dispatcher component was not supplied.
    #[error("dispatcher misconfigured: {0}")]
    Misconfigured(&'static str),

    /// Policy state (enforcement mode, calibration) failed to mutate.
    #[error(transparent)]
    Policy(#[from] gate_policy::PolicyError),

    /// The hook document could not be synchronized.
    #[error(transparent)]
    Hooks(#[from] gate_hooks::HookError),

    /// A session store administrative operation failed.
    #[error(transparent)]
    Session(#[from] gate_session::SessionError),

    /// The configuration document could not be reloaded.
    #[error(transparent)]
    Config(#[from] gate_config::ConfigError),
}

/// Result alias for kernel operations.
pub type KernelResult<T> = Result<T, KernelError>;
