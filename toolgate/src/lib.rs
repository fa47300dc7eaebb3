//! Local policy-decision service for AI coding agent tool use.
//!
//! Depend on this crate via `cargo add toolgate`. It bundles the
//! internal service crates behind feature flags so embedders can enable
//! only the components they wire up: the dispatcher that answers hook
//! events, the stores it records into, and the synchronizer that keeps
//! the agent's hook document pointing back at the service.

#![warn(missing_docs, clippy::pedantic)]

/// Re-export shared primitives for convenience.
pub use gate_primitives as primitives;

/// Decision dispatcher and wire protocol (enabled by `kernel` feature).
#[cfg(feature = "kernel")]
pub use gate_kernel as kernel;

/// Operator configuration document (enabled by `config` feature).
#[cfg(feature = "config")]
pub use gate_config as config;

/// Safety-oracle adapters (enabled by `evaluator` feature).
#[cfg(feature = "evaluator")]
pub use gate_evaluator as evaluator;

/// External hook document synchronization (enabled by `hooks` feature).
#[cfg(feature = "hooks")]
pub use gate_hooks as hooks;

/// Rule matching, enforcement, calibration (enabled by `policy` feature).
#[cfg(feature = "policy")]
pub use gate_policy as policy;

/// Prompt templating (enabled by `prompts` feature).
#[cfg(feature = "prompts")]
pub use gate_prompts as prompts;

/// Durable conversation logs (enabled by `session` feature).
#[cfg(feature = "session")]
pub use gate_session as session;
