//! Delimited continuations for Rust.
//!
//! This crate implements `shift`/`reset` without native continuations:
//!
//! - A `reset` body is a re-runnable closure that receives the active
//!   [`Scope`]. [`Scope::shift`] captures the rest of the body as a
//!   [`Continuation`] by recording the values delivered to earlier shift
//!   points and replaying the body against them.
//! - Handlers return [`Control`] descriptions instead of calling continuations
//!   directly. An explicit trampoline interprets them with a
//!   [`ContinuationStack`] of [`Frame`]s, so neither long shift sequences nor
//!   thousands of resumptions grow the native stack.
//! - Scopes come in three kinds ([`ScopeKind`]): single-shot, multi-shot and
//!   nested. The kind is fixed on entry and can be queried through
//!   [`Scope::capabilities`].
//! - [`ResetFuture`] runs the same machinery under an async scheduler, yielding
//!   between batches of steps and honouring a [`CancelToken`].

mod cancel;
mod config;
mod control;
mod error;
mod frame;
pub mod nondet;
mod reset;
mod scope;
mod suspend;
mod token;
mod trampoline;

pub use cancel::CancelToken;
pub use config::ScopeConfig;
pub use control::Control;
pub use error::{ContError, ContErrorKind, ContResult, IllegalUse};
pub use frame::{ContinuationStack, Frame, FrameId};
pub use reset::{reset, reset_multishot, reset_with};
pub use scope::{Capabilities, Continuation, Scope, ScopeKind, ScopeRef};
pub use suspend::{ResetFuture, Suspension, reset_async, reset_async_with};
pub use token::Token;
