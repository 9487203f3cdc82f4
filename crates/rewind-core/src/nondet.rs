//! Nondeterministic search on multi-shot scopes.
//!
//! Each [`choose`] resumes the rest of the body once per option and
//! concatenates the answers, so a body that returns `vec![solution]` collects
//! every solution in choice order. [`guard`] prunes a branch.

use crate::control::Control;
use crate::error::ContError;
use crate::scope::Scope;

/// Continues the body once with each of `options`.
///
/// Fails fast on scopes that cannot resume a continuation more than once.
pub fn choose<'a, A, T>(
    scope: &Scope<'a, Vec<T>>,
    options: impl IntoIterator<Item = A>,
) -> Result<A, ContError>
where
    A: Clone + 'static,
    T: 'a,
{
    scope.require_multishot()?;
    let options: Vec<A> = options.into_iter().collect();
    scope.shift(move |k| {
        options
            .into_iter()
            .fold(Control::done(Vec::new()), |found, option| {
                let k = k.clone();
                found.and_then(move |mut found| {
                    k.resume(option).map(move |mut more| {
                        found.append(&mut more);
                        found
                    })
                })
            })
    })
}

/// Abandons the current branch without a solution.
pub fn fail<'a, T: 'a>(scope: &Scope<'a, Vec<T>>) -> ContError {
    scope.escape(Vec::new())
}

pub fn guard<'a, T: 'a>(scope: &Scope<'a, Vec<T>>, condition: bool) -> Result<(), ContError> {
    if condition { Ok(()) } else { Err(fail(scope)) }
}
