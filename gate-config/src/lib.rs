//! Operator configuration for toolgate.
//!
//! One JSON document carries the handler rules, pass-through list,
//! startup enforcement mode, and per-component settings. The
//! [`ConfigHandle`] serves immutable snapshots to request handlers and
//! swaps in reloaded documents atomically.

#![warn(missing_docs, clippy::pedantic)]

mod document;
mod error;
mod handle;
mod settings;

pub use document::GateConfig;
pub use error::{ConfigError, ConfigResult};
pub use handle::ConfigHandle;
pub use settings::{DispatchSettings, EvaluatorBackend, EvaluatorSettings, SessionSettings};
