//! Reified suspended computations.
//!
//! Two structures hold everything a captured continuation needs:
//!
//! - [`ReplayLog`]: the values already delivered to the shift points of a
//!   body, in order. Replaying the body against the log reconstructs the
//!   computation up to the next unanswered shift. Logs share their storage and
//!   are copied on resume only when another continuation still refers to them.
//! - [`ContinuationStack`]: the [`Frame`]s pushed by `map`/`and_then` while a
//!   handler's [`Control`] description is interpreted. The trampoline pops
//!   them one at a time, so evaluation depth never grows the native stack.

use std::any::Any;
use std::fmt;
use std::rc::Rc;

use smallvec::SmallVec;

use crate::control::Control;
use crate::error::{ContError, IllegalUse};
use crate::token::Token;

pub(crate) type Resumption<'a, R> = Box<dyn FnOnce(R) -> Control<'a, R> + 'a>;

// ============================================================================
// Frame
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FrameId(u64);

/// A pending computation waiting for the value of the description beneath it.
pub struct Frame<'a, R> {
    id: FrameId,
    token: Token,
    continuation: Resumption<'a, R>,
}

impl<'a, R> Frame<'a, R> {
    pub fn id(&self) -> FrameId {
        self.id
    }

    /// Token of the scope whose handler pushed this frame.
    pub fn token(&self) -> Token {
        self.token
    }

    pub(crate) fn resume(self, value: R) -> Control<'a, R> {
        (self.continuation)(value)
    }
}

impl<R> fmt::Debug for Frame<'_, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Frame")
            .field("id", &self.id)
            .field("token", &self.token)
            .finish_non_exhaustive()
    }
}

// ============================================================================
// ContinuationStack
// ============================================================================

/// Frames between the current point of evaluation and its `reset`, innermost last.
pub struct ContinuationStack<'a, R> {
    frames: SmallVec<[Frame<'a, R>; 8]>,
    next_id: u64,
}

impl<'a, R> ContinuationStack<'a, R> {
    pub fn new() -> Self {
        Self {
            frames: SmallVec::new(),
            next_id: 0,
        }
    }

    pub(crate) fn push(&mut self, token: Token, continuation: Resumption<'a, R>) -> FrameId {
        let id = FrameId(self.next_id);
        self.next_id += 1;
        self.frames.push(Frame {
            id,
            token,
            continuation,
        });
        id
    }

    pub(crate) fn pop(&mut self) -> Option<Frame<'a, R>> {
        self.frames.pop()
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Innermost frame, if any.
    pub fn top(&self) -> Option<&Frame<'a, R>> {
        self.frames.last()
    }

    /// Drops every pending frame without running it, returning how many were discarded.
    pub fn clear(&mut self) -> usize {
        let discarded = self.frames.len();
        // Pop one by one so deep chains do not drop recursively.
        while let Some(frame) = self.frames.pop() {
            drop(frame);
        }
        discarded
    }
}

impl<R> Default for ContinuationStack<'_, R> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R> fmt::Debug for ContinuationStack<'_, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.frames.iter()).finish()
    }
}

// ============================================================================
// ReplayLog
// ============================================================================

/// Resume values of the shift points a body has already passed.
#[derive(Clone, Default)]
pub(crate) struct ReplayLog {
    values: Rc<Vec<Rc<dyn Any>>>,
}

impl ReplayLog {
    pub(crate) fn len(&self) -> usize {
        self.values.len()
    }

    /// Recorded value for the shift at `position`, or `None` when the body
    /// has reached a shift nobody has answered yet.
    pub(crate) fn get<A: Clone + 'static>(&self, position: usize) -> Result<Option<A>, ContError> {
        match self.values.get(position) {
            None => Ok(None),
            Some(value) => value
                .downcast_ref::<A>()
                .cloned()
                .map(Some)
                .ok_or_else(|| ContError::illegal(IllegalUse::ReplayMismatch { position })),
        }
    }

    /// The log with one more answered shift. The storage is reused when this
    /// is the last reference to it and copied otherwise.
    pub(crate) fn extended(self, value: Rc<dyn Any>) -> Self {
        let mut values = Rc::unwrap_or_clone(self.values);
        values.push(value);
        Self {
            values: Rc::new(values),
        }
    }
}

impl fmt::Debug for ReplayLog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReplayLog")
            .field("len", &self.values.len())
            .finish()
    }
}
