//! Synchronization between configured handler rules and the external
//! hook registration document.
//!
//! The agent decides which hooks to run from a JSON settings file it
//! owns. This crate rewrites the marked portion of that file to mirror
//! the active rule configuration, so enabling a rule here is enough to
//! make the agent start sending the matching events.

#![warn(missing_docs, clippy::pedantic)]

mod error;
mod sync;

pub use error::{HookError, HookResult};
pub use sync::{HookSynchronizer, MANAGED_MARKER};
