//! `Cont<R, A>`: a computation that produces an `A` or shifts with an `R`.
//!
//! A `Cont` is only a description. Nothing runs until it is folded, and every
//! fold evaluates the body afresh with its own token, cancellation scope and
//! set of child tasks.

use std::any::Any;
use std::convert::Infallible;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures_util::FutureExt;
use futures_util::future::BoxFuture;
use tracing::{debug, trace};

use rewind_core::{CancelToken, ContError};

use crate::effect::{ContEffect, FoldState, Interrupt};

type ContBody<R, A> =
    dyn Fn(ContEffect<R>) -> BoxFuture<'static, Result<A, ContError>> + Send + Sync;

pub struct Cont<R, A> {
    body: Arc<ContBody<R, A>>,
}

impl<R, A> Clone for Cont<R, A> {
    fn clone(&self) -> Self {
        Self {
            body: self.body.clone(),
        }
    }
}

impl<R, A> std::fmt::Debug for Cont<R, A> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cont").finish_non_exhaustive()
    }
}

/// Builds a [`Cont`] from an async body.
///
/// ```
/// # tokio::runtime::Builder::new_current_thread().build().unwrap().block_on(async {
/// use rewind_effect::cont;
///
/// let parsed = cont(|eff| async move {
///     let n: i32 = eff.bind("42".parse::<i32>().map_err(|e| e.to_string())).await?;
///     Ok(n + 1)
/// });
/// assert_eq!(parsed.to_result().await, Ok(Ok(43)));
/// # });
/// ```
pub fn cont<R, A, F, Fut>(body: F) -> Cont<R, A>
where
    F: Fn(ContEffect<R>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<A, ContError>> + Send + 'static,
{
    Cont {
        body: Arc::new(move |effect| body(effect).boxed()),
    }
}

enum Outcome<A> {
    Finished(Result<A, ContError>),
    Interrupted,
    Cancelled,
}

/// Aborts the fold's children if the fold future is dropped early.
struct AbortChildren<'s, R>(&'s FoldState<R>);

impl<R> Drop for AbortChildren<'_, R> {
    fn drop(&mut self) {
        self.0.tasks.abort_all();
    }
}

fn settle_interrupt<R, B>(interrupt: Interrupt<R>, recover: impl FnOnce(R) -> B) -> B {
    match interrupt {
        Interrupt::Shift(value) => recover(value),
        Interrupt::Panic(payload) => std::panic::resume_unwind(payload),
    }
}

impl<R: Send + 'static, A: Send + 'static> Cont<R, A> {
    /// Runs the computation and hands its outcome to exactly one of the two
    /// functions.
    ///
    /// Panics in the body or in a child propagate to the caller. Cancellation
    /// calls neither function and is reported as
    /// [`ContErrorKind::Cancelled`](rewind_core::ContErrorKind::Cancelled).
    pub async fn fold<B>(
        &self,
        recover: impl FnOnce(R) -> B,
        transform: impl FnOnce(A) -> B,
    ) -> Result<B, ContError> {
        self.fold_with(&CancelToken::new(), recover, transform).await
    }

    /// [`fold`](Self::fold) inside the cancellation scope of `cancel`.
    pub async fn fold_with<B>(
        &self,
        cancel: &CancelToken,
        recover: impl FnOnce(R) -> B,
        transform: impl FnOnce(A) -> B,
    ) -> Result<B, ContError> {
        let state = Arc::new(FoldState::new(cancel.child()));
        let _abort = AbortChildren(&state);
        let body = (self.body)(ContEffect::new(state.clone()));

        let outcome = tokio::select! {
            biased;
            () = state.cancel.cancelled() => Outcome::Cancelled,
            () = state.interrupted.notified() => Outcome::Interrupted,
            result = body => Outcome::Finished(result),
        };

        state.cancel.cancel();
        let stopped = state.tasks.shutdown().await;
        if stopped > 0 {
            trace!(token = %state.token, stopped, "children stopped");
        }

        match outcome {
            Outcome::Cancelled => {
                debug!(token = %state.token, "fold cancelled");
                Err(ContError::cancelled())
            }
            Outcome::Interrupted => match state.take_interrupt() {
                Some(interrupt) => Ok(settle_interrupt(interrupt, recover)),
                None => Err(ContError::cancelled()),
            },
            Outcome::Finished(Ok(value)) => Ok(transform(value)),
            Outcome::Finished(Err(error)) if error.is_shift_of(state.token) => {
                match state.take_shift() {
                    Some(interrupt) => Ok(settle_interrupt(interrupt, recover)),
                    None => Err(error),
                }
            }
            Outcome::Finished(Err(error)) => match state.take_interrupt() {
                // The body saw a child's failure before the fold did.
                Some(interrupt) => Ok(settle_interrupt(interrupt, recover)),
                None => Err(error),
            },
        }
    }

    /// Like [`fold`](Self::fold), but a panic is handed to `on_panic` instead
    /// of propagating.
    pub async fn fold_catching<B>(
        &self,
        on_panic: impl FnOnce(Box<dyn Any + Send>) -> B,
        recover: impl FnOnce(R) -> B,
        transform: impl FnOnce(A) -> B,
    ) -> Result<B, ContError> {
        match AssertUnwindSafe(self.fold(recover, transform)).catch_unwind().await {
            Ok(result) => result,
            Err(payload) => Ok(on_panic(payload)),
        }
    }

    /// `Ok` with the produced value or `Err` with the shifted one.
    pub async fn to_result(&self) -> Result<Result<A, R>, ContError> {
        self.fold(Err, Ok).await
    }

    /// `Some` with the produced value, or whatever `or_else` makes of the
    /// shifted one.
    pub async fn to_option(
        &self,
        or_else: impl FnOnce(R) -> Option<A>,
    ) -> Result<Option<A>, ContError> {
        self.fold(or_else, Some).await
    }

    pub fn map<B, F>(&self, f: F) -> Cont<R, B>
    where
        B: Send + 'static,
        F: Fn(A) -> B + Send + Sync + 'static,
    {
        let this = self.clone();
        let f = Arc::new(f);
        cont(move |eff: ContEffect<R>| {
            let this = this.clone();
            let f = f.clone();
            async move { eff.bind_cont(&this).await.map(|value| f(value)) }
        })
    }

    /// Continues with the computation `f` builds from the produced value.
    pub fn and_then<B, F>(&self, f: F) -> Cont<R, B>
    where
        B: Send + 'static,
        F: Fn(A) -> Cont<R, B> + Send + Sync + 'static,
    {
        let this = self.clone();
        let f = Arc::new(f);
        cont(move |eff: ContEffect<R>| {
            let this = this.clone();
            let f = f.clone();
            async move {
                let value = eff.bind_cont(&this).await?;
                eff.bind_cont(&f(value)).await
            }
        })
    }

    /// Turns a shift into a produced value.
    pub fn handle_error<F>(&self, f: F) -> Cont<Infallible, A>
    where
        F: Fn(R) -> A + Send + Sync + 'static,
    {
        self.redeem(f, |value| value)
    }

    /// Replaces a shift with another computation, which may shift in turn.
    pub fn handle_error_with<R2, F>(&self, f: F) -> Cont<R2, A>
    where
        R2: Send + 'static,
        F: Fn(R) -> Cont<R2, A> + Send + Sync + 'static,
    {
        let this = self.clone();
        let f = Arc::new(f);
        cont(move |eff: ContEffect<R2>| {
            let this = this.clone();
            let f = f.clone();
            async move {
                match this.fold_with(eff.cancel_token(), Err, Ok).await? {
                    Ok(value) => Ok(value),
                    Err(shifted) => eff.bind_cont(&f(shifted)).await,
                }
            }
        })
    }

    pub fn redeem<B, F, G>(&self, recover: F, transform: G) -> Cont<Infallible, B>
    where
        B: Send + 'static,
        F: Fn(R) -> B + Send + Sync + 'static,
        G: Fn(A) -> B + Send + Sync + 'static,
    {
        let this = self.clone();
        let handlers = Arc::new((recover, transform));
        cont(move |eff: ContEffect<Infallible>| {
            let this = this.clone();
            let handlers = handlers.clone();
            async move {
                this.fold_with(eff.cancel_token(), |r| (handlers.0)(r), |a| (handlers.1)(a))
                    .await
            }
        })
    }

    pub fn redeem_with<R2, B, F, G>(&self, recover: F, transform: G) -> Cont<R2, B>
    where
        R2: Send + 'static,
        B: Send + 'static,
        F: Fn(R) -> Cont<R2, B> + Send + Sync + 'static,
        G: Fn(A) -> Cont<R2, B> + Send + Sync + 'static,
    {
        let this = self.clone();
        let handlers = Arc::new((recover, transform));
        cont(move |eff: ContEffect<R2>| {
            let this = this.clone();
            let handlers = handlers.clone();
            async move {
                let next = this
                    .fold_with(eff.cancel_token(), |r| (handlers.0)(r), |a| (handlers.1)(a))
                    .await?;
                eff.bind_cont(&next).await
            }
        })
    }

    /// Captures a panic of the computation as an `Err` produced value.
    pub fn attempt(&self) -> Cont<R, std::thread::Result<A>> {
        let this = self.clone();
        cont(move |eff: ContEffect<R>| {
            let this = this.clone();
            async move {
                match AssertUnwindSafe(eff.bind_cont(&this)).catch_unwind().await {
                    Ok(Ok(value)) => Ok(Ok(value)),
                    Ok(Err(error)) => Err(error),
                    Err(payload) => Ok(Err(payload)),
                }
            }
        })
    }
}

impl<A: Send + 'static> Cont<Infallible, A> {
    /// Runs a computation that cannot shift.
    pub async fn value(&self) -> Result<A, ContError> {
        self.fold(|never| match never {}, |value| value).await
    }
}

/// Runs `f` on each item in order, stopping at the first shift.
pub fn traverse<R, T, B, F>(items: impl IntoIterator<Item = T>, f: F) -> Cont<R, Vec<B>>
where
    R: Send + 'static,
    T: Clone + Send + Sync + 'static,
    B: Send + 'static,
    F: Fn(T) -> Cont<R, B> + Send + Sync + 'static,
{
    let items: Arc<[T]> = items.into_iter().collect();
    let f = Arc::new(f);
    cont(move |eff: ContEffect<R>| {
        let items = items.clone();
        let f = f.clone();
        async move {
            let mut values = Vec::with_capacity(items.len());
            for item in items.iter() {
                values.push(eff.bind_cont(&f(item.clone())).await?);
            }
            Ok(values)
        }
    })
}

pub fn sequence<R, A>(conts: impl IntoIterator<Item = Cont<R, A>>) -> Cont<R, Vec<A>>
where
    R: Send + 'static,
    A: Send + 'static,
{
    traverse(conts, |cont| cont)
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};

    use super::*;

    #[tokio::test]
    async fn test_shift_short_circuits() {
        let polite: Cont<String, i32> = cont(|eff| async move {
            let _: i32 = eff.shift("No thank you".to_string()).await?;
            Ok(1)
        });
        assert_eq!(polite.to_result().await, Ok(Err("No thank you".to_string())));
    }

    #[tokio::test]
    async fn test_produces_after_suspending() {
        let immediate: Cont<String, i32> = cont(|_| async { Ok(5) });
        let suspended: Cont<String, i32> = cont(|eff| async move {
            eff.suspend().await?;
            Ok(5)
        });
        assert_eq!(immediate.to_option(|_| None).await, Ok(Some(5)));
        assert_eq!(suspended.to_option(|_| None).await, Ok(Some(5)));

        let refused: Cont<String, i32> =
            cont(|eff| async move { eff.shift("none".to_string()).await });
        assert_eq!(refused.to_option(|_| None).await, Ok(None));
        assert_eq!(refused.to_option(|r| Some(r.len() as i32)).await, Ok(Some(4)));
    }

    #[tokio::test]
    async fn test_bind_variants() {
        let parsed: Cont<String, i32> = cont(|eff| async move {
            let n = eff.bind_with("12".parse::<i32>(), |e| e.to_string()).await?;
            let m = eff.bind_some(Some(3), || "missing".to_string()).await?;
            let k = eff.ensure_some(Some(4), || "missing".to_string()).await?;
            Ok(n + m + k)
        });
        assert_eq!(parsed.to_result().await, Ok(Ok(19)));

        let not_a_number: Cont<String, i32> = cont(|eff| async move {
            let parsed = "twelve".parse::<i32>();
            eff.bind_with(parsed, |_| "not a number".to_string()).await
        });
        assert_eq!(
            not_a_number.to_result().await,
            Ok(Err("not a number".to_string()))
        );

        let missing: Cont<String, i32> = cont(|eff| async move {
            eff.ensure_some(None, || "missing".to_string()).await
        });
        assert_eq!(missing.to_result().await, Ok(Err("missing".to_string())));
    }

    #[tokio::test]
    async fn test_latest_body_shift_wins() {
        let twice: Cont<i32, ()> = cont(|eff| async move {
            let _ = eff.shift::<()>(1).await;
            eff.shift(2).await
        });
        assert_eq!(twice.to_result().await, Ok(Err(2)));
    }

    #[tokio::test]
    async fn test_swallowed_shift_is_forgotten() {
        let swallowed: Cont<i32, i32> = cont(|eff| async move {
            let _ = eff.shift::<()>(1).await;
            Ok(3)
        });
        assert_eq!(swallowed.to_result().await, Ok(Ok(3)));
    }

    #[tokio::test]
    async fn test_handle_error_recovers() {
        let failing: Cont<String, usize> =
            cont(|eff| async move { eff.shift("four".to_string()).await });
        assert_eq!(failing.handle_error(|message| message.len()).value().await, Ok(4));
    }

    #[tokio::test]
    async fn test_handle_error_with_can_shift_again() {
        let failing: Cont<String, usize> =
            cont(|eff| async move { eff.shift("inner".to_string()).await });
        let rethrown = failing.handle_error_with(|message: String| {
            cont(move |eff| {
                let message = message.clone();
                async move { eff.shift(format!("outer({message})")).await }
            })
        });
        assert_eq!(rethrown.to_result().await, Ok(Err("outer(inner)".to_string())));
    }

    #[tokio::test]
    async fn test_map_and_then() {
        let base: Cont<String, i32> = cont(|_| async { Ok(20) });
        let doubled = base.map(|x| x * 2);
        let checked = doubled.and_then(|x| {
            cont(move |eff| async move {
                eff.ensure(x > 100, || format!("{x} <= 100")).await?;
                Ok(x)
            })
        });
        assert_eq!(doubled.to_result().await, Ok(Ok(40)));
        assert_eq!(checked.to_result().await, Ok(Err("40 <= 100".to_string())));
    }

    #[tokio::test]
    async fn test_redeem_with_continues() {
        let failing: Cont<String, i32> =
            cont(|eff| async move { eff.shift("x".to_string()).await });
        let redeemed: Cont<(), i32> = failing.redeem_with(
            |message| cont(move |_| {
                let len = message.len() as i32;
                async move { Ok(len) }
            }),
            |value| cont(move |_| async move { Ok(value) }),
        );
        assert_eq!(redeemed.to_result().await, Ok(Ok(1)));
    }

    #[tokio::test]
    async fn test_panic_propagates_from_body() {
        let boom: Cont<String, i32> = cont(|_| async {
            let fail = true;
            if fail {
                panic!("boom");
            }
            Ok(1)
        });
        let outcome = AssertUnwindSafe(boom.to_result()).catch_unwind().await;
        assert!(outcome.is_err());

        let caught = boom.fold_catching(|_| -1, |_| 0, |value| value).await;
        assert_eq!(caught, Ok(-1));
    }

    #[tokio::test]
    async fn test_attempt_captures_panic() {
        let boom: Cont<String, i32> = cont(|_| async {
            let fail = true;
            if fail {
                panic!("boom");
            }
            Ok(1)
        });
        let attempted = boom.attempt().to_result().await.unwrap();
        assert!(matches!(attempted, Ok(Err(_))));
    }

    #[tokio::test]
    async fn test_panic_propagates_from_child() {
        let boom: Cont<String, i32> = cont(|eff| async move {
            let _child = eff.spawn(|_| async {
                let fail = true;
                if fail {
                    panic!("child boom");
                }
                Ok(())
            });
            std::future::pending::<()>().await;
            Ok(0)
        });
        let outcome = AssertUnwindSafe(boom.to_result()).catch_unwind().await;
        assert!(outcome.is_err());
    }

    #[tokio::test]
    async fn test_child_result_is_joined() {
        let parent: Cont<String, i32> = cont(|eff| async move {
            let child = eff.spawn(|_| async { Ok(20) });
            let value: i32 = child.join().await?;
            Ok(value + 1)
        });
        assert_eq!(parent.to_result().await, Ok(Ok(21)));
    }

    #[tokio::test]
    async fn test_cancellation_calls_neither_handler() {
        let token = CancelToken::new();
        let stuck: Cont<String, i32> = cont(|_| async {
            std::future::pending::<()>().await;
            Ok(0)
        });
        let canceller = token.clone();
        tokio::spawn(async move {
            tokio::task::yield_now().await;
            canceller.cancel();
        });

        let recovered = AtomicBool::new(false);
        let transformed = AtomicBool::new(false);
        let result = stuck
            .fold_with(
                &token,
                |_| recovered.store(true, Ordering::SeqCst),
                |_| transformed.store(true, Ordering::SeqCst),
            )
            .await;

        assert!(result.unwrap_err().is_cancelled());
        assert!(!recovered.load(Ordering::SeqCst));
        assert!(!transformed.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_traverse_stops_at_first_shift() {
        let checked = traverse(vec![1, 2, 3], |n: i32| {
            cont(move |eff: ContEffect<String>| async move {
                eff.ensure(n != 2, || format!("rejected {n}")).await?;
                Ok(n * 10)
            })
        });
        assert_eq!(checked.to_result().await, Ok(Err("rejected 2".to_string())));

        let all: Cont<String, Vec<i32>> =
            sequence((1..=3).map(|n| cont(move |_| async move { Ok(n) })));
        assert_eq!(all.to_result().await, Ok(Ok(vec![1, 2, 3])));
    }
}
