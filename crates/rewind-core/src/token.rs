//! Scope identity.

use std::sync::atomic::{AtomicU64, Ordering};

use derive_more::Display;

static NEXT_TOKEN: AtomicU64 = AtomicU64::new(1);

/// Identifies one `reset` activation.
///
/// Every replay of the same activation shares its token, so a shift error can
/// be routed back to the boundary that produced it even when it unwinds
/// through other, inner boundaries first.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[display("Token({_0:x})")]
pub struct Token(u64);

impl Token {
    /// Allocates a token no other activation in this process uses.
    pub fn fresh() -> Self {
        Token(NEXT_TOKEN.fetch_add(1, Ordering::Relaxed))
    }

    pub fn as_u64(self) -> u64 {
        self.0
    }
}
