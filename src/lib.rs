//! Delimited continuations and typed short-circuiting computations.
//!
//! The `shift`/`reset` engine comes from `rewind-core` and `Cont<R, A>` from
//! `rewind-effect`; both are re-exported here. Most programs only need the
//! [`prelude`].

pub use rewind_core::nondet;
pub use rewind_core::{
    CancelToken, Capabilities, ContError, ContErrorKind, ContResult, Continuation, Control,
    IllegalUse, ResetFuture, Scope, ScopeConfig, ScopeKind, ScopeRef, Suspension, Token, reset,
    reset_async, reset_async_with, reset_multishot, reset_with,
};
pub use rewind_effect::{
    Child, Cont, ContEffect, EagerCont, EagerEffect, cont, eager_cont, sequence, traverse,
};

pub mod prelude {
    pub use rewind_core::nondet::{choose, guard};
    pub use rewind_core::{
        ContError, Continuation, Control, Scope, reset, reset_async, reset_multishot,
    };
    pub use rewind_effect::{Cont, ContEffect, EagerCont, EagerEffect, cont, eager_cont};
}
