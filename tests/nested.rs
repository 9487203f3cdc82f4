//! Integration tests for nested scopes.
//!
//! An inner scope entered with `Scope::reset` can shift to itself or to any
//! scope enclosing it. Outer shifts unwind every inner boundary in between,
//! and replays of inner bodies see the values outer shifts already produced.

use rewind::{Control, IllegalUse, ScopeKind, reset};

fn three_levels(short_circuit: bool) -> Result<i32, rewind::ContError> {
    reset(|fst| {
        let a: i32 = fst.shift(|k| k.resume(5))?;
        let inner = fst.reset(|snd| {
            let doubled = a * 2;
            let b: i32 = snd.shift(move |k| k.resume(doubled))?;
            let innermost = snd.reset(|trd| {
                let next = b + 5;
                let c: i32 = if short_circuit {
                    fst.shift(|_| Control::done(10))?
                } else {
                    fst.shift(move |k| k.resume(next))?
                };
                let twice = c * 2;
                let d: i32 = trd.shift(move |k| k.resume(twice))?;
                Ok(c + d)
            })?;
            Ok(b + innermost)
        })?;
        Ok(inner + a * 2)
    })
}

#[test]
fn test_three_levels_resume_through_every_scope() {
    assert_eq!(three_levels(false), Ok(65));
}

#[test]
fn test_outer_shift_abandons_inner_scopes() {
    assert_eq!(three_levels(true), Ok(10));
}

#[test]
fn test_nested_scope_reports_depth_and_capabilities() {
    let observed = reset(|outer| {
        let (kind, depth, nested) = outer.reset(|inner| {
            Ok((inner.kind(), inner.depth(), inner.capabilities().nested))
        })?;
        Ok((outer.depth(), kind, depth, nested))
    });
    assert_eq!(observed, Ok((0, ScopeKind::Nested, 1, true)));
}

#[test]
fn test_nested_scopes_are_single_shot() {
    let result = reset(|outer| {
        outer.reset(|inner| {
            inner.require_multishot()?;
            Ok(0)
        })
    });
    assert_eq!(
        result.unwrap_err().illegal_use(),
        Some(&IllegalUse::MultishotUnsupported(ScopeKind::Nested))
    );
}

#[test]
fn test_inner_shift_stays_inside_the_inner_scope() {
    let answer = reset(|outer| {
        let inner: i32 = outer.reset(|inner| {
            let x: i32 = inner.shift(|_| Control::done(3))?;
            Ok(x * 100)
        })?;
        Ok(inner + 1)
    });
    assert_eq!(answer, Ok(4));
}

#[test]
fn test_foreign_shift_through_top_level_reset_is_rejected() {
    let result = reset(|outer| {
        reset(|_| {
            let _: i32 = outer.shift(|_| Control::done(1))?;
            Ok(0)
        })
    });
    assert!(matches!(
        result.unwrap_err().illegal_use(),
        Some(IllegalUse::UnknownScope(_))
    ));
}
