//! Child tasks of a running fold.
//!
//! Children live in a tokio `JoinSet` owned by the fold. When the fold
//! finishes for any reason the set is closed, every remaining child is
//! aborted, and the fold waits until all of them have stopped.

use std::sync::atomic::{AtomicBool, Ordering};

use futures_util::future::BoxFuture;
use parking_lot::Mutex;
use tokio::sync::oneshot;
use tokio::task::JoinSet;
use tracing::trace;

use rewind_core::{ContError, Token};

pub(crate) struct TaskScope {
    tasks: Mutex<JoinSet<()>>,
    closed: AtomicBool,
}

impl TaskScope {
    pub(crate) fn new() -> Self {
        Self {
            tasks: Mutex::new(JoinSet::new()),
            closed: AtomicBool::new(false),
        }
    }

    /// Starts `task` unless the scope is already closed, in which case the
    /// task is dropped without running.
    pub(crate) fn spawn(&self, task: BoxFuture<'static, ()>) -> bool {
        let mut tasks = self.tasks.lock();
        if self.closed.load(Ordering::SeqCst) {
            return false;
        }
        tasks.spawn(task);
        true
    }

    /// Aborts every child without waiting for it.
    pub(crate) fn abort_all(&self) {
        let mut tasks = self.tasks.lock();
        self.closed.store(true, Ordering::SeqCst);
        tasks.abort_all();
    }

    /// Closes the scope, aborts every child and waits until all have stopped.
    /// Returns how many children were still registered.
    pub(crate) async fn shutdown(&self) -> usize {
        let mut tasks = {
            let mut tasks = self.tasks.lock();
            self.closed.store(true, Ordering::SeqCst);
            std::mem::take(&mut *tasks)
        };
        tasks.abort_all();
        let mut stopped = 0;
        while let Some(result) = tasks.join_next().await {
            stopped += 1;
            if let Err(error) = result {
                trace!(cancelled = error.is_cancelled(), "child stopped");
            }
        }
        stopped
    }
}

/// Handle to a child spawned with [`ContEffect::spawn`](crate::ContEffect::spawn).
#[derive(Debug)]
pub struct Child<T> {
    receiver: oneshot::Receiver<Result<T, ContError>>,
    token: Token,
}

impl<T> Child<T> {
    pub(crate) fn new(receiver: oneshot::Receiver<Result<T, ContError>>, token: Token) -> Self {
        Self { receiver, token }
    }

    /// Token of the fold the child belongs to.
    pub fn token(&self) -> Token {
        self.token
    }

    /// Waits for the child's result.
    ///
    /// A child that was aborted, or that panicked, yields a cancellation
    /// error; the fold itself reports the panic or the sibling's shift.
    pub async fn join(self) -> Result<T, ContError> {
        match self.receiver.await {
            Ok(result) => result,
            Err(_) => Err(ContError::cancelled()),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::AtomicUsize;

    use futures_util::FutureExt;

    use super::*;

    struct CountOnDrop(Arc<AtomicUsize>);

    impl Drop for CountOnDrop {
        fn drop(&mut self) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[tokio::test]
    async fn test_shutdown_aborts_and_awaits() {
        let scope = TaskScope::new();
        let dropped = Arc::new(AtomicUsize::new(0));
        let (started_tx, started_rx) = oneshot::channel();

        let guard = CountOnDrop(dropped.clone());
        scope.spawn(
            async move {
                let _guard = guard;
                let _ = started_tx.send(());
                std::future::pending::<()>().await;
            }
            .boxed(),
        );
        started_rx.await.unwrap();

        assert_eq!(scope.shutdown().await, 1);
        assert_eq!(dropped.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_closed_scope_rejects_tasks() {
        let scope = TaskScope::new();
        scope.abort_all();
        assert!(!scope.spawn(async {}.boxed()));
        assert_eq!(scope.shutdown().await, 0);
    }
}
