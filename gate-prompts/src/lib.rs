//! Prompt templating and judgment-prompt assembly for toolgate.

#![warn(missing_docs, clippy::pedantic)]

pub mod judgment;
pub mod template;

pub use judgment::{DEFAULT_JUDGMENT_TEMPLATE, JudgmentPrompt, sanitize_untrusted};
pub use template::{PromptTemplate, TemplateError, TemplateResult};
