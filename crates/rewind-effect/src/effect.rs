//! The capabilities a [`Cont`](crate::Cont) body receives.

use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures_util::FutureExt;
use parking_lot::Mutex;
use tokio::sync::{Notify, oneshot};
use tracing::{debug, trace};

use rewind_core::{CancelToken, ContError, Token};

use crate::cont::Cont;
use crate::task::{Child, TaskScope};

// ============================================================================
// Fold state
// ============================================================================

/// Something a child reported that ends the whole fold.
pub(crate) enum Interrupt<R> {
    Shift(R),
    Panic(Box<dyn Any + Send>),
}

/// Everything one evaluation of a `Cont` shares between its body and children.
pub(crate) struct FoldState<R> {
    pub(crate) token: Token,
    pub(crate) cancel: CancelToken,
    /// Latest shift of the body itself.
    shifted: Mutex<Option<R>>,
    /// First shift or panic of a child.
    interrupt: Mutex<Option<Interrupt<R>>>,
    pub(crate) interrupted: Notify,
    pub(crate) tasks: TaskScope,
}

impl<R> FoldState<R> {
    pub(crate) fn new(cancel: CancelToken) -> Self {
        Self {
            token: Token::fresh(),
            cancel,
            shifted: Mutex::new(None),
            interrupt: Mutex::new(None),
            interrupted: Notify::new(),
            tasks: TaskScope::new(),
        }
    }

    /// Records `interrupt` unless another child got there first.
    fn interrupt(&self, interrupt: Interrupt<R>) -> bool {
        let mut slot = self.interrupt.lock();
        if slot.is_some() {
            return false;
        }
        *slot = Some(interrupt);
        drop(slot);
        self.interrupted.notify_one();
        true
    }

    pub(crate) fn take_shift(&self) -> Option<Interrupt<R>> {
        self.shifted
            .lock()
            .take()
            .map(Interrupt::Shift)
            .or_else(|| self.take_interrupt())
    }

    pub(crate) fn take_interrupt(&self) -> Option<Interrupt<R>> {
        self.interrupt.lock().take()
    }
}

// ============================================================================
// ContEffect
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Role {
    Body,
    Child,
}

/// Handle through which a `Cont` body shifts, binds and spawns children.
pub struct ContEffect<R> {
    state: Arc<FoldState<R>>,
    role: Role,
}

impl<R> Clone for ContEffect<R> {
    fn clone(&self) -> Self {
        Self {
            state: self.state.clone(),
            role: self.role,
        }
    }
}

impl<R> std::fmt::Debug for ContEffect<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContEffect")
            .field("token", &self.state.token)
            .field("role", &self.role)
            .finish()
    }
}

impl<R> ContEffect<R> {
    pub(crate) fn new(state: Arc<FoldState<R>>) -> Self {
        Self {
            state,
            role: Role::Body,
        }
    }

    pub fn token(&self) -> Token {
        self.state.token
    }

    /// Cancellation scope of the fold; nested folds should derive from it.
    pub fn cancel_token(&self) -> &CancelToken {
        &self.state.cancel
    }

    /// Ends the computation with `value`.
    ///
    /// The returned error must be propagated out of the body. When the body
    /// swallows it and shifts again, the later value wins; when it returns
    /// normally instead, the shift is forgotten. Inside a spawned child the
    /// first shift across all children wins and the fold stops the rest.
    pub async fn shift<B>(&self, value: R) -> Result<B, ContError> {
        Err(self.raise(value))
    }

    fn raise(&self, value: R) -> ContError {
        if self.state.cancel.is_cancelled() {
            return ContError::cancelled();
        }
        match self.role {
            Role::Body => *self.state.shifted.lock() = Some(value),
            Role::Child => {
                if !self.state.interrupt(Interrupt::Shift(value)) {
                    trace!(token = %self.state.token, "child shift lost the race");
                }
            }
        }
        ContError::shifted(self.state.token)
    }

    /// Unwraps `Ok`, or shifts with the `Err` value.
    pub async fn bind<A>(&self, result: Result<A, R>) -> Result<A, ContError> {
        self.state.cancel.check()?;
        match result {
            Ok(value) => Ok(value),
            Err(value) => Err(self.raise(value)),
        }
    }

    pub async fn bind_with<A, E>(
        &self,
        result: Result<A, E>,
        on_err: impl FnOnce(E) -> R,
    ) -> Result<A, ContError> {
        self.bind(result.map_err(on_err)).await
    }

    pub async fn bind_some<A>(
        &self,
        option: Option<A>,
        on_none: impl FnOnce() -> R,
    ) -> Result<A, ContError> {
        self.bind(option.ok_or_else(on_none)).await
    }

    /// Shifts with `on_false()` unless `condition` holds.
    pub async fn ensure(
        &self,
        condition: bool,
        on_false: impl FnOnce() -> R,
    ) -> Result<(), ContError> {
        if condition {
            self.state.cancel.check()
        } else {
            Err(self.raise(on_false()))
        }
    }

    /// Unwraps `Some`, or shifts with `on_none()`.
    pub async fn ensure_some<A>(
        &self,
        option: Option<A>,
        on_none: impl FnOnce() -> R,
    ) -> Result<A, ContError> {
        self.bind_some(option, on_none).await
    }

    /// Folds `cont` under this fold's cancellation scope and binds its outcome.
    pub async fn bind_cont<A>(&self, cont: &Cont<R, A>) -> Result<A, ContError>
    where
        R: Send + 'static,
        A: Send + 'static,
    {
        let result = cont.fold_with(&self.state.cancel, Err, Ok).await?;
        self.bind(result).await
    }

    /// Yields to the scheduler, observing cancellation before and after.
    pub async fn suspend(&self) -> Result<(), ContError> {
        self.state.cancel.check()?;
        tokio::task::yield_now().await;
        self.state.cancel.check()
    }

    /// Starts a child task on the current tokio runtime.
    ///
    /// The child gets its own effect handle. Its shift ends the whole fold
    /// (first child to shift wins), a panic is re-raised by the fold, and it is
    /// aborted and awaited when the fold finishes.
    pub fn spawn<T, F, Fut>(&self, child: F) -> Child<T>
    where
        F: FnOnce(ContEffect<R>) -> Fut,
        Fut: Future<Output = Result<T, ContError>> + Send + 'static,
        T: Send + 'static,
        R: Send + 'static,
    {
        let (sender, receiver) = oneshot::channel();
        let effect = ContEffect {
            state: self.state.clone(),
            role: Role::Child,
        };
        let future = child(effect);
        let state = self.state.clone();
        let task = async move {
            match AssertUnwindSafe(future).catch_unwind().await {
                Ok(result) => {
                    let _ = sender.send(result);
                }
                Err(payload) => {
                    debug!(token = %state.token, "child panicked");
                    state.interrupt(Interrupt::Panic(payload));
                }
            }
        };
        if !self.state.tasks.spawn(task.boxed()) {
            trace!(token = %self.state.token, "fold already finished; child not started");
        }
        Child::new(receiver, self.state.token)
    }
}
