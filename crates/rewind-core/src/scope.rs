//! Delimited scopes and the continuations they capture.
//!
//! A `reset` body is an ordinary closure that receives the active [`Scope`].
//! Capture works by replay: [`Scope::shift`] either returns the value a
//! previous resumption recorded for this shift point, or it stores the
//! handler, marks the scope as unwinding and returns a shift error that the
//! body propagates with `?`. The trampoline then runs the handler, and every
//! resumption of the continuation re-runs the body against a replay log that is
//! one value longer.
//!
//! The three [`ScopeKind`]s are fixed when a scope is entered:
//!
//! - `SingleShot`: each continuation may be resumed once; the replay log is
//!   moved into the resumption.
//! - `MultiShot`: continuations may be resumed any number of times; each
//!   resumption gets its own copy of the log.
//! - `Nested`: single-shot scopes created from inside another scope's body.
//!   They keep a reference to their parent, which lets the body shift to any
//!   enclosing scope, and they rewind the replay cursors of their ancestors on
//!   every run so outer shifts performed inside the body are replayed too.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::marker::PhantomData;
use std::rc::Rc;

use derive_more::Display;
use smallvec::SmallVec;
use tracing::{trace, warn};

use crate::config::ScopeConfig;
use crate::control::{Control, Repr};
use crate::error::{ContError, IllegalUse};
use crate::frame::ReplayLog;
use crate::token::Token;
use crate::trampoline::Trampoline;

pub(crate) type Body<'a, R> = dyn Fn(&Scope<'a, R>) -> Result<R, ContError> + 'a;

type Handler<'a, R> = Box<dyn FnOnce() -> Control<'a, R> + 'a>;

type Explicit<'a, A, R> = dyn Fn(&Scope<'a, R>, A) -> Result<R, ContError> + 'a;

// ============================================================================
// Scope variants
// ============================================================================

#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScopeKind {
    #[display("single-shot")]
    SingleShot,
    #[display("multi-shot")]
    MultiShot,
    #[display("nested")]
    Nested,
}

impl ScopeKind {
    pub fn capabilities(self) -> Capabilities {
        match self {
            ScopeKind::SingleShot => Capabilities {
                multishot: false,
                nested: false,
            },
            ScopeKind::MultiShot => Capabilities {
                multishot: true,
                nested: false,
            },
            ScopeKind::Nested => Capabilities {
                multishot: false,
                nested: true,
            },
        }
    }

    pub fn is_multishot(self) -> bool {
        self.capabilities().multishot
    }
}

/// What generic continuation code may rely on inside a scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capabilities {
    /// Captured continuations may be resumed more than once.
    pub multishot: bool,
    /// The scope has a parent, so its body may shift to enclosing scopes.
    pub nested: bool,
}

// ============================================================================
// Scope chain
// ============================================================================

/// The parts of a running scope that inner scopes need to see.
pub(crate) trait Enclosing {
    fn token(&self) -> Token;
    fn config(&self) -> ScopeConfig;
    fn cursor(&self) -> usize;
    fn rewind(&self, cursor: usize);
    fn enclosing(&self) -> Option<&dyn Enclosing>;
}

pub(crate) fn ancestors<'s>(
    first: Option<&'s dyn Enclosing>,
) -> impl Iterator<Item = &'s dyn Enclosing> {
    std::iter::successors(first, |scope: &&'s dyn Enclosing| (*scope).enclosing())
}

/// Turns a shift error that no scope in the chain can answer into an
/// illegal-use error.
pub(crate) fn settle<R>(
    result: Result<R, ContError>,
    parent: Option<&dyn Enclosing>,
) -> Result<R, ContError> {
    match result {
        Err(error) => match error.shift_target() {
            Some(target) if !ancestors(parent).any(|scope| scope.token() == target) => {
                warn!(%target, "shift escaped every enclosing scope");
                Err(ContError::illegal(IllegalUse::UnknownScope(target)))
            }
            _ => Err(error),
        },
        ok => ok,
    }
}

/// State shared by every run of one `reset` activation.
pub(crate) struct ScopeShared<'a, R> {
    token: Token,
    kind: ScopeKind,
    config: ScopeConfig,
    parent: Option<&'a dyn Enclosing>,
    /// Replay cursors of the ancestors when this scope was entered.
    anchors: SmallVec<[usize; 4]>,
    body: Rc<Body<'a, R>>,
}

impl<'a, R> ScopeShared<'a, R> {
    pub(crate) fn new(
        kind: ScopeKind,
        config: ScopeConfig,
        parent: Option<&'a dyn Enclosing>,
        body: Rc<Body<'a, R>>,
    ) -> Rc<Self> {
        let anchors = ancestors(parent).map(|scope| scope.cursor()).collect();
        Rc::new(Self {
            token: Token::fresh(),
            kind,
            config,
            parent,
            anchors,
            body,
        })
    }

    /// A fresh activation for an implicit reset evaluated by the same trampoline.
    pub(crate) fn delimited(&self, body: Rc<Body<'a, R>>) -> Rc<Self> {
        Self::new(self.kind, self.config, self.parent, body)
    }

    pub(crate) fn token(&self) -> Token {
        self.token
    }

    pub(crate) fn config(&self) -> ScopeConfig {
        self.config
    }

    pub(crate) fn parent(&self) -> Option<&'a dyn Enclosing> {
        self.parent
    }

    fn restore_anchors(&self) {
        for (scope, &cursor) in ancestors(self.parent).zip(&self.anchors) {
            scope.rewind(cursor);
        }
    }
}

// ============================================================================
// Run
// ============================================================================

/// One evaluation of a body against a replay log.
pub(crate) struct Run<'a, R> {
    shared: Rc<ScopeShared<'a, R>>,
    log: ReplayLog,
}

impl<'a, R> Run<'a, R> {
    pub(crate) fn fresh(shared: Rc<ScopeShared<'a, R>>) -> Self {
        Self {
            shared,
            log: ReplayLog::default(),
        }
    }

    pub(crate) fn token(&self) -> Token {
        self.shared.token
    }

    pub(crate) fn execute(self) -> Control<'a, R> {
        let Run { shared, log } = self;
        shared.restore_anchors();

        let scope = Scope {
            shared: shared.clone(),
            log,
            cursor: Cell::new(0),
            phase: Cell::new(Phase::Body),
            pending: RefCell::new(None),
        };
        let outcome = (shared.body)(&scope);
        scope.phase.set(Phase::Done);
        let pending = scope.pending.borrow_mut().take();
        drop(scope);

        match outcome {
            Ok(value) => {
                if pending.is_some() {
                    trace!(token = %shared.token, "body recovered from its own shift");
                }
                Control::done(value)
            }
            Err(error) if error.is_shift_of(shared.token) => match pending {
                Some(handler) => handler(),
                None => Control::fail(ContError::illegal(IllegalUse::InactiveScope)),
            },
            Err(error) => Control::fail(error),
        }
    }
}

// ============================================================================
// Scope
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Body,
    Unwinding,
    Done,
}

/// The active delimiter of a running `reset` body.
pub struct Scope<'a, R> {
    shared: Rc<ScopeShared<'a, R>>,
    log: ReplayLog,
    cursor: Cell<usize>,
    phase: Cell<Phase>,
    pending: RefCell<Option<Handler<'a, R>>>,
}

impl<'a, R> Scope<'a, R> {
    pub fn token(&self) -> Token {
        self.shared.token
    }

    pub fn kind(&self) -> ScopeKind {
        self.shared.kind
    }

    pub fn capabilities(&self) -> Capabilities {
        self.shared.kind.capabilities()
    }

    /// Fails fast unless continuations of this scope may be resumed repeatedly.
    pub fn require_multishot(&self) -> Result<(), ContError> {
        if self.capabilities().multishot {
            Ok(())
        } else {
            Err(ContError::illegal(IllegalUse::MultishotUnsupported(
                self.kind(),
            )))
        }
    }

    /// Number of scopes enclosing this one.
    pub fn depth(&self) -> usize {
        ancestors(self.shared.parent).count()
    }

    /// Shift points of this run that were answered from the replay log.
    pub fn replayed(&self) -> usize {
        self.cursor.get()
    }

    /// Captures the rest of the body up to this scope's reset and passes it
    /// to `handler`.
    ///
    /// Returns the resumed value when this shift point is being replayed.
    /// Otherwise returns a shift error that the body must propagate; code after
    /// the `?` does not run, and locals are dropped at that point. The
    /// handler's [`Control`] then becomes the result of the reset.
    pub fn shift<A, F>(&self, handler: F) -> Result<A, ContError>
    where
        A: Clone + 'static,
        R: 'a,
        F: FnOnce(Continuation<'a, A, R>) -> Control<'a, R> + 'a,
    {
        self.check_active()?;
        let position = self.cursor.get();
        if let Some(value) = self.log.get::<A>(position)? {
            self.cursor.set(position + 1);
            return Ok(value);
        }

        trace!(token = %self.shared.token, position, "capturing continuation");
        let continuation = Continuation::new(
            self.shared.clone(),
            Target::Replay {
                log: RefCell::new(Some(self.log.clone())),
                marker: PhantomData,
            },
        );
        Err(self.suspend(Box::new(move || handler(continuation))))
    }

    /// Like [`shift`](Self::shift), but the rest of the computation is given
    /// explicitly as `continuation` instead of being captured by replay.
    ///
    /// Resuming the handed-out continuation evaluates `continuation` under an
    /// implicit reset of its own. This call never returns `Ok`.
    pub fn shift_cps<A, T, F, C>(&self, handler: F, continuation: C) -> Result<T, ContError>
    where
        A: Clone + 'static,
        R: 'a,
        F: FnOnce(Continuation<'a, A, R>) -> Control<'a, R> + 'a,
        C: Fn(&Scope<'a, R>, A) -> Result<R, ContError> + 'a,
    {
        self.check_active()?;
        let continuation = Continuation::new(
            self.shared.clone(),
            Target::Explicit {
                body: Rc::new(continuation),
                used: Cell::new(false),
            },
        );
        Err(self.suspend(Box::new(move || handler(continuation))))
    }

    /// Abandons the rest of the body and makes `value` the result of the reset.
    pub fn escape(&self, value: R) -> ContError
    where
        R: 'a,
    {
        match self.check_active() {
            Ok(()) => self.suspend(Box::new(move || Control::done(value))),
            Err(error) => error,
        }
    }

    /// Enters a nested scope whose body may also shift to this one.
    pub fn reset<'b, T, F>(&'b self, body: F) -> Result<T, ContError>
    where
        F: Fn(&Scope<'b, T>) -> Result<T, ContError> + 'b,
    {
        self.handle().reset(body)
    }

    /// A lifetime-bounded handle for entering nested scopes without naming
    /// this scope's answer type.
    pub fn handle<'s>(&'s self) -> ScopeRef<'s> {
        ScopeRef { scope: self }
    }

    fn check_active(&self) -> Result<(), ContError> {
        match self.phase.get() {
            Phase::Body => Ok(()),
            Phase::Unwinding => Err(ContError::illegal(IllegalUse::ShiftDuringUnwind)),
            Phase::Done => Err(ContError::illegal(IllegalUse::InactiveScope)),
        }
    }

    fn suspend(&self, handler: Handler<'a, R>) -> ContError {
        *self.pending.borrow_mut() = Some(handler);
        self.phase.set(Phase::Unwinding);
        ContError::shifted(self.shared.token)
    }
}

impl<R> Enclosing for Scope<'_, R> {
    fn token(&self) -> Token {
        self.shared.token
    }

    fn config(&self) -> ScopeConfig {
        self.shared.config
    }

    fn cursor(&self) -> usize {
        self.cursor.get()
    }

    fn rewind(&self, cursor: usize) {
        self.cursor.set(cursor);
    }

    fn enclosing(&self) -> Option<&dyn Enclosing> {
        self.shared.parent
    }
}

impl<R> fmt::Debug for Scope<'_, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scope")
            .field("token", &self.shared.token)
            .field("kind", &self.shared.kind)
            .field("log", &self.log)
            .field("cursor", &self.cursor.get())
            .field("phase", &self.phase.get())
            .finish()
    }
}

// ============================================================================
// ScopeRef
// ============================================================================

/// Borrowed reference to a running scope, erased over its answer type.
#[derive(Clone, Copy)]
pub struct ScopeRef<'s> {
    scope: &'s dyn Enclosing,
}

impl<'s> ScopeRef<'s> {
    pub fn token(self) -> Token {
        self.scope.token()
    }

    /// Enters a [`ScopeKind::Nested`] scope below the referenced one.
    ///
    /// A shift to this scope or any of its ancestors from inside `body`
    /// abandons the nested scope, including its pending handler frames.
    pub fn reset<T, F>(self, body: F) -> Result<T, ContError>
    where
        F: Fn(&Scope<'s, T>) -> Result<T, ContError> + 's,
    {
        let parent = self.scope;
        let shared = ScopeShared::new(
            ScopeKind::Nested,
            parent.config(),
            Some(parent),
            Rc::new(body),
        );
        settle(Trampoline::new(shared).run(), Some(parent))
    }
}

impl fmt::Debug for ScopeRef<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ScopeRef").field(&self.scope.token()).finish()
    }
}

// ============================================================================
// Continuation
// ============================================================================

enum Target<'a, A, R> {
    /// Replays the scope's body; `None` once a single-shot resume took the log.
    Replay {
        log: RefCell<Option<ReplayLog>>,
        marker: PhantomData<fn(A)>,
    },
    Explicit {
        body: Rc<Explicit<'a, A, R>>,
        used: Cell<bool>,
    },
}

struct Captured<'a, A, R> {
    shared: Rc<ScopeShared<'a, R>>,
    target: Target<'a, A, R>,
}

/// The rest of a reset body from a shift point, waiting for a value of type `A`.
pub struct Continuation<'a, A, R> {
    captured: Rc<Captured<'a, A, R>>,
}

impl<'a, A, R> Continuation<'a, A, R> {
    fn new(shared: Rc<ScopeShared<'a, R>>, target: Target<'a, A, R>) -> Self {
        Self {
            captured: Rc::new(Captured { shared, target }),
        }
    }

    pub fn token(&self) -> Token {
        self.captured.shared.token
    }

    pub fn is_multishot(&self) -> bool {
        self.captured.shared.kind.is_multishot()
    }

    /// Number of earlier shift points a resumption replays.
    pub fn depth(&self) -> usize {
        match &self.captured.target {
            Target::Replay { log, .. } => log.borrow().as_ref().map_or(0, ReplayLog::len),
            Target::Explicit { .. } => 0,
        }
    }
}

impl<'a, A: Clone + 'static, R: 'a> Continuation<'a, A, R> {
    /// Describes continuing the body with `value` as the result of the shift.
    ///
    /// Resuming a single-shot continuation a second time describes an
    /// illegal-use failure.
    pub fn resume(&self, value: A) -> Control<'a, R> {
        let shared = &self.captured.shared;
        match &self.captured.target {
            Target::Replay { log, .. } => {
                let log = if self.is_multishot() {
                    log.borrow().clone()
                } else {
                    log.borrow_mut().take()
                };
                let Some(log) = log else {
                    return resumed_twice(shared.token);
                };
                trace!(token = %shared.token, depth = log.len(), "resuming continuation");
                Control::from_repr(Repr::Resume(Run {
                    shared: shared.clone(),
                    log: log.extended(Rc::new(value)),
                }))
            }
            Target::Explicit { body, used } => {
                if used.replace(true) && !self.is_multishot() {
                    return resumed_twice(shared.token);
                }
                let body = body.clone();
                Control::reset(move |scope| body(scope, value.clone()))
            }
        }
    }

    /// Resumes the continuation and evaluates it to completion right away.
    ///
    /// Unlike [`resume`](Self::resume) this nests a trampoline on the native
    /// stack, so it suits handlers that need the answer as a plain value but
    /// not deep recursion.
    pub fn call(&self, value: A) -> Result<R, ContError> {
        let shared = self.captured.shared.clone();
        let parent = shared.parent();
        settle(
            Trampoline::with_control(shared, self.resume(value)).run(),
            parent,
        )
    }
}

fn resumed_twice<'a, R>(token: Token) -> Control<'a, R> {
    warn!(%token, "single-shot continuation resumed twice");
    Control::fail(ContError::illegal(IllegalUse::ResumedTwice))
}

impl<A, R> Clone for Continuation<'_, A, R> {
    fn clone(&self) -> Self {
        Self {
            captured: self.captured.clone(),
        }
    }
}

impl<A, R> fmt::Debug for Continuation<'_, A, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Continuation")
            .field("token", &self.token())
            .field("kind", &self.captured.shared.kind)
            .field("depth", &self.depth())
            .finish()
    }
}
