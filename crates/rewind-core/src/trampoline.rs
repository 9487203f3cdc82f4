//! Iterative interpreter for [`Control`] descriptions.
//!
//! Each step consumes the current description:
//!
//! - `Done` pops the innermost [`Frame`](crate::Frame) and feeds it the value,
//!   or finishes when the stack is empty.
//! - `Then` pushes its continuation and descends into the inner description.
//! - `Resume` and `Delimit` run a body once and continue with whatever it
//!   produced (its value, or its handler's description).
//! - `Fail` discards every pending frame and finishes with the error.

use std::rc::Rc;
use std::task::Poll;

use tracing::{debug, trace};

use crate::control::{Control, Repr};
use crate::error::{ContError, IllegalUse};
use crate::frame::ContinuationStack;
use crate::scope::{Run, ScopeShared};
use crate::token::Token;

pub(crate) struct Trampoline<'a, R> {
    context: Rc<ScopeShared<'a, R>>,
    stack: ContinuationStack<'a, R>,
    current: Option<Control<'a, R>>,
    /// Token of the scope that owns the description being interpreted.
    active: Token,
    steps: usize,
}

impl<'a, R> Trampoline<'a, R> {
    /// A trampoline whose first step runs the scope's body from scratch.
    pub(crate) fn new(shared: Rc<ScopeShared<'a, R>>) -> Self {
        let start = Control::from_repr(Repr::Resume(Run::fresh(shared.clone())));
        Self::with_control(shared, start)
    }

    pub(crate) fn with_control(context: Rc<ScopeShared<'a, R>>, control: Control<'a, R>) -> Self {
        let active = context.token();
        Self {
            context,
            stack: ContinuationStack::new(),
            current: Some(control),
            active,
            steps: 0,
        }
    }

    pub(crate) fn steps(&self) -> usize {
        self.steps
    }

    pub(crate) fn pending_frames(&self) -> usize {
        self.stack.len()
    }

    pub(crate) fn run(mut self) -> Result<R, ContError> {
        loop {
            if let Poll::Ready(result) = self.step() {
                return result;
            }
        }
    }

    pub(crate) fn run_for(&mut self, budget: usize) -> Poll<Result<R, ContError>> {
        for _ in 0..budget {
            if let Poll::Ready(result) = self.step() {
                return Poll::Ready(result);
            }
        }
        Poll::Pending
    }

    /// Abandons the evaluation, returning how many frames were discarded.
    pub(crate) fn cancel(&mut self) -> usize {
        self.current = None;
        self.stack.clear()
    }

    pub(crate) fn step(&mut self) -> Poll<Result<R, ContError>> {
        let Some(control) = self.current.take() else {
            return Poll::Ready(Err(ContError::illegal(IllegalUse::InactiveScope)));
        };

        if let Some(limit) = self.context.config().max_steps {
            if self.steps >= limit {
                let discarded = self.stack.clear();
                debug!(token = %self.context.token(), limit, discarded, "step limit reached");
                return Poll::Ready(Err(ContError::step_limit(limit)));
            }
        }
        self.steps += 1;

        let next = match control.into_repr() {
            Repr::Done(value) => match self.stack.pop() {
                Some(frame) => {
                    self.active = frame.token();
                    frame.resume(value)
                }
                None => {
                    trace!(token = %self.context.token(), steps = self.steps, "reset completed");
                    return Poll::Ready(Ok(value));
                }
            },
            Repr::Then(inner, continuation) => {
                self.stack.push(self.active, continuation);
                *inner
            }
            Repr::Resume(run) => {
                self.active = run.token();
                run.execute()
            }
            Repr::Delimit(body) => {
                let run = Run::fresh(self.context.delimited(body));
                self.active = run.token();
                run.execute()
            }
            Repr::Defer(thunk) => thunk(),
            Repr::Fail(error) => {
                let discarded = self.stack.clear();
                trace!(token = %self.context.token(), discarded, %error, "reset failed");
                return Poll::Ready(Err(error));
            }
            Repr::Taken => unreachable!("ICE: control description consumed twice"),
        };
        self.current = Some(next);
        Poll::Pending
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ScopeConfig;
    use crate::scope::{Scope, ScopeKind};

    fn trampoline<'a>(
        config: ScopeConfig,
        body: impl Fn(&Scope<'a, u64>) -> Result<u64, ContError> + 'a,
    ) -> Trampoline<'a, u64> {
        Trampoline::new(ScopeShared::new(
            ScopeKind::SingleShot,
            config,
            None,
            Rc::new(body),
        ))
    }

    #[test]
    fn test_frames_run_innermost_first() {
        let mut tramp = trampoline(ScopeConfig::default(), |s| {
            s.shift(|k| k.resume(1).map(|x| x * 10).and_then(|x| Control::done(x + 2)))
        });
        // Resume the body, then hit the handler's description.
        assert!(tramp.step().is_pending());
        assert!(tramp.step().is_pending());
        assert_eq!(tramp.pending_frames(), 1);
        assert_eq!(tramp.run(), Ok(12));
    }

    #[test]
    fn test_long_defer_chain_is_iterative() {
        fn count_down<'a>(n: u64, acc: u64) -> Control<'a, u64> {
            if n == 0 {
                Control::done(acc)
            } else {
                Control::defer(move || count_down(n - 1, acc + n))
            }
        }
        let tramp = trampoline(ScopeConfig::default(), |s| {
            s.shift::<u64, _>(|_| count_down(100_000, 0))
        });
        assert_eq!(tramp.run(), Ok(5_000_050_000));
    }

    #[test]
    fn test_step_limit() {
        let tramp = trampoline(ScopeConfig::new().with_max_steps(10), |s| {
            s.shift::<u64, _>(|_| {
                (0..100).fold(Control::done(0), |acc, _| acc.map(|x| x + 1))
            })
        });
        let err = tramp.run().unwrap_err();
        insta::assert_snapshot!(err, @"trampoline exceeded the limit of 10 steps");
    }

    #[test]
    fn test_frames_after_delimited_block_keep_enclosing_token() {
        let mut tramp = trampoline(ScopeConfig::default(), |s| {
            s.shift::<u64, _>(|_| {
                Control::reset(|_| Ok(1)).and_then(|x| Control::done(x).map(|y| y + 1))
            })
        });
        let outer = tramp.context.token();
        // Body, outer `and_then`, block, popped frame, inner `map`.
        for _ in 0..5 {
            assert!(tramp.step().is_pending());
        }
        assert_eq!(tramp.pending_frames(), 1);
        assert_eq!(tramp.stack.top().map(|frame| frame.token()), Some(outer));
        assert_eq!(tramp.run(), Ok(2));
    }

    #[test]
    fn test_cancel_discards_frames() {
        let mut tramp = trampoline(ScopeConfig::default(), |s| {
            s.shift(|k| k.resume(1).map(|x| x + 1).map(|x| x + 1))
        });
        while tramp.pending_frames() < 2 {
            assert!(tramp.step().is_pending());
        }
        assert_eq!(tramp.cancel(), 2);
        assert!(tramp.step().is_ready());
    }
}
