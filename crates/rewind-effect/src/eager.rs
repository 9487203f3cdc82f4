//! Synchronous computations that produce an `A` or shift with an `R`.
//!
//! [`EagerCont`] is the blocking counterpart of [`Cont`](crate::Cont). Its
//! fold runs the body directly under a `rewind_core` reset, and a shift is an
//! escape from that reset. Nested blocks entered through
//! [`EagerEffect::fold_nested`] or [`EagerEffect::bind_eager`] run in nested
//! scopes, so an inner block may short-circuit the outer one.

use std::cell::RefCell;
use std::rc::Rc;

use rewind_core::{ContError, IllegalUse, Scope, ScopeRef, Token, reset};

type EagerBody<R, A> = dyn Fn(&EagerEffect<'_, R>) -> Result<A, ContError>;

enum Outcome<A> {
    Shifted,
    Completed(A),
}

/// Runs `body` once under `scope`.
///
/// The shifted value is kept in `shifted` rather than in the scope's answer,
/// so a body that catches a shift and shifts again replaces it.
fn run<'a, R, A, F>(
    body: &F,
    scope: &Scope<'a, Outcome<A>>,
    shifted: &RefCell<Option<R>>,
) -> Result<Outcome<A>, ContError>
where
    A: 'a,
    F: Fn(&EagerEffect<'_, R>) -> Result<A, ContError> + ?Sized,
{
    let escape = |value: R| {
        if shifted.replace(Some(value)).is_some() {
            // Still unwinding towards this scope from an earlier shift.
            return ContError::shifted(scope.token());
        }
        scope.escape(Outcome::Shifted)
    };
    let effect = EagerEffect {
        scope: scope.handle(),
        escape: &escape,
    };
    body(&effect).map(Outcome::Completed)
}

fn finish<R, A>(
    outcome: Outcome<A>,
    shifted: RefCell<Option<R>>,
) -> Result<Result<A, R>, ContError> {
    match (outcome, shifted.into_inner()) {
        (Outcome::Completed(value), _) => Ok(Ok(value)),
        (Outcome::Shifted, Some(value)) => Ok(Err(value)),
        (Outcome::Shifted, None) => Err(ContError::illegal(IllegalUse::InactiveScope)),
    }
}

// ============================================================================
// EagerEffect
// ============================================================================

pub struct EagerEffect<'e, R> {
    scope: ScopeRef<'e>,
    escape: &'e dyn Fn(R) -> ContError,
}

impl<R: 'static> EagerEffect<'_, R> {
    pub fn token(&self) -> Token {
        self.scope.token()
    }

    /// Ends the computation with `value`. The error must be propagated.
    pub fn shift<B>(&self, value: R) -> Result<B, ContError> {
        Err((self.escape)(value))
    }

    pub fn bind<A>(&self, result: Result<A, R>) -> Result<A, ContError> {
        result.or_else(|value| self.shift(value))
    }

    pub fn bind_some<A>(
        &self,
        option: Option<A>,
        on_none: impl FnOnce() -> R,
    ) -> Result<A, ContError> {
        match option {
            Some(value) => Ok(value),
            None => self.shift(on_none()),
        }
    }

    pub fn ensure(&self, condition: bool, on_false: impl FnOnce() -> R) -> Result<(), ContError> {
        if condition { Ok(()) } else { self.shift(on_false()) }
    }

    /// Runs `inner` in a nested scope and binds its outcome.
    pub fn bind_eager<A: 'static>(&self, inner: &EagerCont<R, A>) -> Result<A, ContError> {
        let shifted = RefCell::new(None);
        let outcome = self.scope.reset(|scope| run(&*inner.body, scope, &shifted))?;
        match finish(outcome, shifted)? {
            Ok(value) => Ok(value),
            Err(value) => self.shift(value),
        }
    }

    /// Runs an inline block with its own shift type in a nested scope and
    /// folds its outcome.
    ///
    /// The block may capture this effect and shift it, which abandons the
    /// block and ends the outer computation without calling either function.
    pub fn fold_nested<R2, B, C, F>(
        &self,
        body: F,
        recover: impl FnOnce(R2) -> C,
        transform: impl FnOnce(B) -> C,
    ) -> Result<C, ContError>
    where
        R2: 'static,
        B: 'static,
        F: Fn(&EagerEffect<'_, R2>) -> Result<B, ContError>,
    {
        let shifted = RefCell::new(None);
        let outcome = self.scope.reset(|scope| run(&body, scope, &shifted))?;
        Ok(finish(outcome, shifted)?.map_or_else(recover, transform))
    }
}

// ============================================================================
// EagerCont
// ============================================================================

pub struct EagerCont<R, A> {
    body: Rc<EagerBody<R, A>>,
}

impl<R, A> Clone for EagerCont<R, A> {
    fn clone(&self) -> Self {
        Self {
            body: self.body.clone(),
        }
    }
}

pub fn eager_cont<R, A, F>(body: F) -> EagerCont<R, A>
where
    F: Fn(&EagerEffect<'_, R>) -> Result<A, ContError> + 'static,
{
    EagerCont {
        body: Rc::new(body),
    }
}

impl<R: 'static, A: 'static> EagerCont<R, A> {
    pub fn fold<B>(
        &self,
        recover: impl FnOnce(R) -> B,
        transform: impl FnOnce(A) -> B,
    ) -> Result<B, ContError> {
        let shifted = RefCell::new(None);
        let outcome = reset(|scope| run(&*self.body, scope, &shifted))?;
        Ok(finish(outcome, shifted)?.map_or_else(recover, transform))
    }

    pub fn to_result(&self) -> Result<Result<A, R>, ContError> {
        self.fold(Err, Ok)
    }

    pub fn to_option(&self, or_else: impl FnOnce(R) -> Option<A>) -> Result<Option<A>, ContError> {
        self.fold(or_else, Some)
    }

    pub fn map<B: 'static>(&self, f: impl Fn(A) -> B + 'static) -> EagerCont<R, B> {
        let this = self.clone();
        eager_cont::<R, B, _>(move |eff| eff.bind_eager(&this).map(&f))
    }

    pub fn handle_error_with<R2: 'static>(
        &self,
        f: impl Fn(R) -> EagerCont<R2, A> + 'static,
    ) -> EagerCont<R2, A> {
        let this = self.clone();
        eager_cont::<R2, A, _>(move |eff| match this.to_result()? {
            Ok(value) => Ok(value),
            Err(shifted) => eff.bind_eager(&f(shifted)),
        })
    }
}
