//! Durable per-conversation event log for toolgate.
//!
//! The store keeps one bounded, append-only log per conversation, persists
//! every mutation before acknowledging it, and renders a recent-context
//! view for the evaluator prompt.

#![warn(missing_docs, clippy::pedantic)]

mod error;
mod record;
mod store;

pub use error::{SessionError, SessionResult};
pub use record::{ConversationRecord, EventRecord, EventRecordBuilder};
pub use store::{SessionStore, SessionStoreConfig};
