//! Policy machinery for toolgate: rule matching, enforcement gating,
//! and adaptive threshold calibration.
//!
//! A [`RuleSet`] maps event kinds to ordered handler rules, resolved
//! through a cached [`PatternMatcher`]. The process-wide
//! [`EnforcementState`] decides how much authority resolved decisions
//! carry, and the [`CalibrationEngine`] turns decisions and human
//! overrides into per-tool threshold suggestions.

#![warn(missing_docs, clippy::pedantic)]

mod calibration;
mod enforcement;
mod error;
mod matcher;
mod rules;

pub use calibration::{CalibrationEngine, CalibrationSettings, OverrideRecord, ToolStats};
pub use enforcement::{gate, EnforcementMode, EnforcementState, GateOutcome};
pub use error::{PolicyError, PolicyResult};
pub use matcher::PatternMatcher;
pub use rules::{BehaviorKind, HandlerRule, LogLevel, RuleSet};
