//! Decision dispatcher and wire protocol for toolgate.
//!
//! The [`Dispatcher`] turns one inbound hook document into one protocol
//! response, running the configured behavior for the matched rule and
//! filtering the result through the enforcement gate. Every fault on
//! that path degrades to the empty "no opinion" response. The
//! [`GateAdmin`] surface carries the explicit operator actions — mode
//! changes, hook installation, session clearing — and those do return
//! real errors.

#![warn(missing_docs, clippy::pedantic)]

mod admin;
mod dispatcher;
mod error;
mod wire;

pub use admin::GateAdmin;
pub use dispatcher::{Dispatcher, DispatcherBuilder};
pub use error::{KernelError, KernelResult};
pub use wire::{HookRequest, HookResponse};
