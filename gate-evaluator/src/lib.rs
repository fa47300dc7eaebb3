//! Safety-oracle adapters used by the toolgate dispatcher.
//!
//! Each module exposes one transport for reaching an analyzer while
//! sharing the trait-based interface defined in [`traits`].

#![warn(missing_docs, clippy::pedantic)]

pub mod command;
pub mod http;
pub mod traits;

mod http_client;

pub use command::CommandEvaluator;
pub use http::{HttpEvaluator, HttpEvaluatorConfig};
pub use traits::{EvaluatorError, EvaluatorResult, SafetyEvaluator, SafetyJudgment};
