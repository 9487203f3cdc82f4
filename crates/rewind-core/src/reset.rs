//! Entry points that establish a delimiting boundary.

use std::rc::Rc;

use crate::config::ScopeConfig;
use crate::error::ContError;
use crate::scope::{Scope, ScopeKind, ScopeShared, settle};
use crate::trampoline::Trampoline;

/// Runs `body` under a single-shot reset.
///
/// The result is the body's value when it finishes without shifting, and
/// otherwise the value of the handler of the shift that escaped it. A body
/// may be run several times: once from scratch and once per resumption.
///
/// ```
/// use rewind_core::{Control, reset};
///
/// let answer = reset(|s| {
///     let x: i32 = s.shift(|k| k.resume(20).map(|r: i32| r + 1))?;
///     Ok(x * 2)
/// });
/// assert_eq!(answer, Ok(41));
/// ```
pub fn reset<'a, R, F>(body: F) -> Result<R, ContError>
where
    F: Fn(&Scope<'a, R>) -> Result<R, ContError> + 'a,
{
    reset_with(ScopeKind::SingleShot, ScopeConfig::default(), body)
}

/// Runs `body` under a reset whose continuations may be resumed many times.
pub fn reset_multishot<'a, R, F>(body: F) -> Result<R, ContError>
where
    F: Fn(&Scope<'a, R>) -> Result<R, ContError> + 'a,
{
    reset_with(ScopeKind::MultiShot, ScopeConfig::default(), body)
}

/// Runs `body` under a top-level reset of the given kind.
pub fn reset_with<'a, R, F>(kind: ScopeKind, config: ScopeConfig, body: F) -> Result<R, ContError>
where
    F: Fn(&Scope<'a, R>) -> Result<R, ContError> + 'a,
{
    let shared = ScopeShared::new(kind, config, None, Rc::new(body));
    settle(Trampoline::new(shared).run(), None)
}
