//! Error types for delimited control

use derive_more::{Display, From};

use crate::scope::ScopeKind;
use crate::token::Token;

pub type ContResult<T> = Result<T, ContError>;

#[derive(Display, Debug, Clone, PartialEq, Eq)]
#[display("{kind}")]
pub struct ContError {
    kind: Box<ContErrorKind>,
}

impl<E> From<E> for ContError
where
    ContErrorKind: From<E>,
{
    fn from(error: E) -> Self {
        ContError {
            kind: Box::new(ContErrorKind::from(error)),
        }
    }
}

impl ContError {
    /// The unwinding signal produced by a shift aimed at `token`.
    pub fn shifted(token: Token) -> Self {
        ContErrorKind::Shifted(token).into()
    }

    pub fn cancelled() -> Self {
        ContErrorKind::Cancelled.into()
    }

    pub fn illegal(usage: IllegalUse) -> Self {
        usage.into()
    }

    pub(crate) fn step_limit(limit: usize) -> Self {
        ContErrorKind::StepLimit(limit).into()
    }

    pub fn kind(&self) -> &ContErrorKind {
        &self.kind
    }

    pub fn into_kind(self) -> ContErrorKind {
        *self.kind
    }

    /// Token of the boundary this error is unwinding towards, if it is a shift.
    pub fn shift_target(&self) -> Option<Token> {
        match *self.kind {
            ContErrorKind::Shifted(token) => Some(token),
            _ => None,
        }
    }

    pub fn is_shift_of(&self, token: Token) -> bool {
        self.shift_target() == Some(token)
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(*self.kind, ContErrorKind::Cancelled)
    }

    pub fn illegal_use(&self) -> Option<&IllegalUse> {
        match &*self.kind {
            ContErrorKind::IllegalUse(usage) => Some(usage),
            _ => None,
        }
    }
}

impl std::error::Error for ContError {}

#[derive(Display, Debug, Clone, PartialEq, Eq, From)]
pub enum ContErrorKind {
    #[display("shift to {_0} is still unwinding")]
    Shifted(Token),
    #[display("illegal use of delimited control: {_0}")]
    #[from]
    IllegalUse(IllegalUse),
    #[display("computation was cancelled")]
    Cancelled,
    #[display("trampoline exceeded the limit of {_0} steps")]
    StepLimit(usize),
}

#[derive(Display, Debug, Clone, PartialEq, Eq)]
pub enum IllegalUse {
    #[display("single-shot continuation resumed more than once")]
    ResumedTwice,
    #[display("shift called outside of an active reset body")]
    InactiveScope,
    #[display("shift called while the scope is already unwinding")]
    ShiftDuringUnwind,
    #[display("replayed shift #{position} produced a value of another type")]
    ReplayMismatch { position: usize },
    #[display("{_0} scopes cannot resume a continuation more than once")]
    MultishotUnsupported(ScopeKind),
    #[display("shift to {_0} escaped a scope that is not nested inside it")]
    UnknownScope(Token),
}
