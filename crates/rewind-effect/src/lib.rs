//! Typed short-circuiting computations built on `rewind-core`.
//!
//! A [`Cont<R, A>`](Cont) either produces an `A` or shifts with an `R`. Bodies
//! receive a [`ContEffect`] through which they shift, bind fallible values,
//! compose other computations and spawn child tasks. Folding a `Cont` runs it
//! on the current tokio runtime inside its own cancellation scope; when the
//! fold finishes, every child it spawned has been stopped.
//!
//! [`EagerCont`] offers the same vocabulary for blocking code and is folded
//! directly on the calling thread.

mod cont;
mod eager;
mod effect;
mod task;

pub use cont::{Cont, cont, sequence, traverse};
pub use eager::{EagerCont, EagerEffect, eager_cont};
pub use effect::ContEffect;
pub use task::Child;
