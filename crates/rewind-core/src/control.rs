//! Descriptions of what a handler wants to happen next.
//!
//! A shift handler does not call its continuation directly. It returns a
//! [`Control`] value describing the computation, and the trampoline interprets
//! that description iteratively. This keeps resumptions, `map` chains and
//! handler-level resets off the native stack.

use std::fmt;
use std::rc::Rc;

use crate::error::ContError;
use crate::frame::Resumption;
use crate::scope::{Body, Run};

pub struct Control<'a, R> {
    repr: Repr<'a, R>,
}

pub(crate) enum Repr<'a, R> {
    Done(R),
    Fail(ContError),
    /// Replay a body against a replay log.
    Resume(Run<'a, R>),
    /// Run a body under a fresh, implicit reset.
    Delimit(Rc<Body<'a, R>>),
    Defer(Box<dyn FnOnce() -> Control<'a, R> + 'a>),
    Then(Box<Control<'a, R>>, Resumption<'a, R>),
    Taken,
}

impl<'a, R> Control<'a, R> {
    pub(crate) fn from_repr(repr: Repr<'a, R>) -> Self {
        Self { repr }
    }

    pub(crate) fn into_repr(mut self) -> Repr<'a, R> {
        std::mem::replace(&mut self.repr, Repr::Taken)
    }

    /// A finished computation.
    pub fn done(value: R) -> Self {
        Self::from_repr(Repr::Done(value))
    }

    /// A computation that stops the whole evaluation with `error`.
    pub fn fail(error: ContError) -> Self {
        Self::from_repr(Repr::Fail(error))
    }

    pub fn from_result(result: Result<R, ContError>) -> Self {
        match result {
            Ok(value) => Self::done(value),
            Err(error) => Self::fail(error),
        }
    }

    /// Builds the description lazily, once the trampoline reaches it.
    ///
    /// Handlers that recurse (for instance a continuation resuming itself
    /// thousands of times) should wrap the recursive step in `defer` so the
    /// description is produced one step at a time.
    pub fn defer(thunk: impl FnOnce() -> Control<'a, R> + 'a) -> Self {
        Self::from_repr(Repr::Defer(Box::new(thunk)))
    }

    /// Runs `body` under an implicit reset.
    ///
    /// A shift performed inside `body` captures only up to this boundary, not
    /// up to the reset whose handler built the description.
    pub fn reset(body: impl Fn(&crate::Scope<'a, R>) -> Result<R, ContError> + 'a) -> Self {
        Self::from_repr(Repr::Delimit(Rc::new(body)))
    }

    pub fn and_then(self, f: impl FnOnce(R) -> Control<'a, R> + 'a) -> Self {
        Self::from_repr(Repr::Then(Box::new(self), Box::new(f)))
    }

    pub fn map(self, f: impl FnOnce(R) -> R + 'a) -> Self {
        self.and_then(move |value| Control::done(f(value)))
    }

    pub(crate) fn describe(&self) -> &'static str {
        match &self.repr {
            Repr::Done(_) => "Done",
            Repr::Fail(_) => "Fail",
            Repr::Resume(_) => "Resume",
            Repr::Delimit(_) => "Delimit",
            Repr::Defer(_) => "Defer",
            Repr::Then(..) => "Then",
            Repr::Taken => "Taken",
        }
    }
}

impl<R> Drop for Control<'_, R> {
    fn drop(&mut self) {
        // Long `and_then` chains nest through `Then`; unlink them iteratively.
        let mut next = match std::mem::replace(&mut self.repr, Repr::Taken) {
            Repr::Then(inner, _) => Some(inner),
            _ => None,
        };
        while let Some(mut control) = next {
            next = match std::mem::replace(&mut control.repr, Repr::Taken) {
                Repr::Then(inner, _) => Some(inner),
                _ => None,
            };
        }
    }
}

impl<R: fmt::Debug> fmt::Debug for Control<'_, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.repr {
            Repr::Done(value) => f.debug_tuple("Done").field(value).finish(),
            Repr::Fail(error) => f.debug_tuple("Fail").field(error).finish(),
            Repr::Then(inner, _) => f.debug_tuple("Then").field(inner).finish(),
            _ => f.write_str(self.describe()),
        }
    }
}
