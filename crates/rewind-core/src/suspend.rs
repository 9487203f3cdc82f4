//! Resets that cooperate with an async scheduler.
//!
//! A [`ResetFuture`] drives the trampoline a bounded number of steps per poll
//! and then yields, so long-running delimited computations share the executor
//! with other tasks. Between batches it checks its [`CancelToken`]; once the
//! token is cancelled the pending frames are discarded and no further body code
//! runs.

use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;
use std::task::{Context, Poll};

use tracing::debug;

use crate::cancel::CancelToken;
use crate::config::ScopeConfig;
use crate::error::{ContError, IllegalUse};
use crate::scope::{Scope, ScopeKind, ScopeShared, settle};
use crate::trampoline::Trampoline;

/// Where a [`ResetFuture`] is in its life cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Suspension {
    /// Not polled yet, or currently running a batch of steps.
    Running,
    /// Yielded to the scheduler with work left.
    Suspended,
    Finished,
    Cancelled,
}

pub struct ResetFuture<'a, R> {
    trampoline: Trampoline<'a, R>,
    cancel: CancelToken,
    budget: usize,
    state: Suspension,
}

/// Single-shot reset evaluated as a future with the default configuration.
pub fn reset_async<'a, R, F>(body: F) -> ResetFuture<'a, R>
where
    F: Fn(&Scope<'a, R>) -> Result<R, ContError> + 'a,
{
    reset_async_with(
        ScopeKind::SingleShot,
        ScopeConfig::default(),
        CancelToken::new(),
        body,
    )
}

pub fn reset_async_with<'a, R, F>(
    kind: ScopeKind,
    config: ScopeConfig,
    cancel: CancelToken,
    body: F,
) -> ResetFuture<'a, R>
where
    F: Fn(&Scope<'a, R>) -> Result<R, ContError> + 'a,
{
    let shared = ScopeShared::new(kind, config, None, Rc::new(body));
    ResetFuture {
        trampoline: Trampoline::new(shared),
        cancel,
        budget: config.poll_budget.max(1),
        state: Suspension::Running,
    }
}

impl<R> ResetFuture<'_, R> {
    pub fn state(&self) -> Suspension {
        self.state
    }

    pub fn steps(&self) -> usize {
        self.trampoline.steps()
    }

    pub fn pending_frames(&self) -> usize {
        self.trampoline.pending_frames()
    }

    pub fn cancel_token(&self) -> &CancelToken {
        &self.cancel
    }

    /// Cancels the evaluation in place, returning how many frames were discarded.
    pub fn cancel(&mut self) -> usize {
        let discarded = self.trampoline.cancel();
        self.state = Suspension::Cancelled;
        debug!(discarded, steps = self.trampoline.steps(), "reset cancelled");
        discarded
    }
}

// Nothing in the future is structurally pinned.
impl<R> Unpin for ResetFuture<'_, R> {}

impl<R> Future for ResetFuture<'_, R> {
    type Output = Result<R, ContError>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        match this.state {
            Suspension::Cancelled => return Poll::Ready(Err(ContError::cancelled())),
            Suspension::Finished => {
                return Poll::Ready(Err(ContError::illegal(IllegalUse::InactiveScope)));
            }
            Suspension::Running | Suspension::Suspended => {}
        }
        if this.cancel.is_cancelled() {
            this.cancel();
            return Poll::Ready(Err(ContError::cancelled()));
        }

        this.state = Suspension::Running;
        match this.trampoline.run_for(this.budget) {
            Poll::Ready(result) => {
                this.state = Suspension::Finished;
                Poll::Ready(settle(result, None))
            }
            Poll::Pending => {
                this.state = Suspension::Suspended;
                cx.waker().wake_by_ref();
                Poll::Pending
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sum_of_shifts<'a>(n: u64) -> impl Fn(&Scope<'a, u64>) -> Result<u64, ContError> + 'a {
        move |s| {
            let mut total = 0;
            for i in 0..n {
                let value: u64 = s.shift(move |k| k.resume(i))?;
                total += value;
            }
            Ok(total)
        }
    }

    fn two_pending_frames<'a>() -> impl Fn(&Scope<'a, u64>) -> Result<u64, ContError> + 'a {
        |s| {
            let x: u64 = s.shift(|k| k.resume(1).map(|r| r + 1).map(|r| r + 1))?;
            Ok(x)
        }
    }

    #[tokio::test]
    async fn test_reset_future_yields_between_batches() {
        let config = ScopeConfig::new().with_poll_budget(4);
        let future = reset_async_with(
            ScopeKind::SingleShot,
            config,
            CancelToken::new(),
            sum_of_shifts(50),
        );
        assert_eq!(future.await, Ok((0..50).sum()));
    }

    #[tokio::test]
    async fn test_cancel_before_completion() {
        let token = CancelToken::new();
        let mut future = reset_async_with(
            ScopeKind::SingleShot,
            ScopeConfig::new().with_poll_budget(1),
            token.clone(),
            sum_of_shifts(1_000),
        );

        // Drive a few batches by hand, then cancel from the outside.
        let waker = std::task::Waker::noop();
        let mut cx = Context::from_waker(waker);
        for _ in 0..5 {
            assert!(Pin::new(&mut future).poll(&mut cx).is_pending());
        }
        assert_eq!(future.state(), Suspension::Suspended);

        token.cancel();
        let result = future.await;
        assert!(result.unwrap_err().is_cancelled());
    }

    #[tokio::test]
    async fn test_manual_cancel_reports_frames() {
        let mut future = reset_async_with(
            ScopeKind::SingleShot,
            ScopeConfig::new().with_poll_budget(1),
            CancelToken::new(),
            two_pending_frames(),
        );
        let waker = std::task::Waker::noop();
        let mut cx = Context::from_waker(waker);
        while future.pending_frames() < 2 {
            assert!(Pin::new(&mut future).poll(&mut cx).is_pending());
        }
        assert_eq!(future.cancel(), 2);
        assert_eq!(future.state(), Suspension::Cancelled);
        assert!(future.await.unwrap_err().is_cancelled());
    }

    #[tokio::test]
    async fn test_answer_need_not_be_unpin() {
        use std::marker::PhantomPinned;

        let mut future = reset_async_with(
            ScopeKind::SingleShot,
            ScopeConfig::new().with_poll_budget(1),
            CancelToken::new(),
            |s| s.shift(|k| k.resume(PhantomPinned)),
        );
        let waker = std::task::Waker::noop();
        let mut cx = Context::from_waker(waker);
        assert!(Pin::new(&mut future).poll(&mut cx).is_pending());
        assert_eq!(future.await, Ok(PhantomPinned));
    }

    #[test]
    fn test_shift_result_matches_sync_reset() {
        let sync = crate::reset(|s| {
            let x: u64 = s.shift(|k| k.resume(2).map(|r: u64| r * 3))?;
            Ok(x + 1)
        });
        let runtime = tokio::runtime::Builder::new_current_thread().build().unwrap();
        let async_result = runtime.block_on(reset_async(|s| {
            let x: u64 = s.shift(|k| k.resume(2).map(|r: u64| r * 3))?;
            Ok(x + 1)
        }));
        assert_eq!(sync, async_result);
        assert_eq!(sync, Ok(9));
    }
}
