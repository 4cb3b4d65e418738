#![forbid(unsafe_code)]

//! Single-shot completion handles.
//!
//! Every enter or leave hook receives a [`Done`] bound to one key and one
//! phase. Firing it never re-enters the group directly: it pushes a
//! [`Completion`] onto the [`CompletionQueue`] shared with the group, and the
//! group drains the queue.
//!
//! - A hook that fires `done` before returning is drained before the call
//!   that invoked the hook returns.
//! - A hook that keeps `done` and fires it on a later turn is drained by the
//!   next [`TransitionGroup::process_completions`](crate::TransitionGroup::process_completions).
//!
//! # Invariants
//!
//! 1. [`Done::complete`] consumes the handle, so a phase completes at most
//!    once per handle.
//! 2. Completions are drained in the order they were fired.
//!
//! # Failure Modes
//!
//! - **Handle dropped unfired**: the phase never completes and the key stays
//!   in flight. The drop is logged at `warn` level; state is not touched.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::fmt;
use std::rc::Rc;

use crate::TransitionKey;
use crate::in_flight::Phase;

/// A fired completion waiting to be processed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Completion<K> {
    /// Key whose phase finished.
    pub key: K,
    /// The phase that finished.
    pub phase: Phase,
}

/// FIFO of fired completions, shared between a group and its handles.
pub struct CompletionQueue<K> {
    inner: Rc<RefCell<VecDeque<Completion<K>>>>,
}

impl<K> CompletionQueue<K> {
    /// Create an empty queue.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Rc::new(RefCell::new(VecDeque::new())),
        }
    }

    /// Number of completions waiting.
    pub fn len(&self) -> usize {
        self.inner.borrow().len()
    }

    /// Whether nothing is waiting.
    pub fn is_empty(&self) -> bool {
        self.inner.borrow().is_empty()
    }

    pub(crate) fn push(&self, completion: Completion<K>) {
        self.inner.borrow_mut().push_back(completion);
    }

    /// Take the oldest completion. The borrow ends before this returns.
    pub(crate) fn pop(&self) -> Option<Completion<K>> {
        self.inner.borrow_mut().pop_front()
    }
}

impl<K> Clone for CompletionQueue<K> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<K> Default for CompletionQueue<K> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K> fmt::Debug for CompletionQueue<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompletionQueue")
            .field("pending", &self.len())
            .finish()
    }
}

/// Completion handle for one phase of one key.
///
/// Call [`complete`](Self::complete) exactly once, eventually. Until then the
/// key stays in flight and the group's container stays frozen.
#[must_use = "a transition only completes when its Done handle is fired"]
pub struct Done<K: TransitionKey> {
    key: K,
    phase: Phase,
    queue: CompletionQueue<K>,
    fired: bool,
}

impl<K: TransitionKey> Done<K> {
    pub(crate) fn new(key: K, phase: Phase, queue: CompletionQueue<K>) -> Self {
        Self {
            key,
            phase,
            queue,
            fired: false,
        }
    }

    /// The key this handle completes.
    pub fn key(&self) -> &K {
        &self.key
    }

    /// The phase this handle completes.
    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Signal that the phase finished.
    pub fn complete(mut self) {
        self.fired = true;
        self.queue.push(Completion {
            key: self.key.clone(),
            phase: self.phase,
        });
    }
}

impl<K: TransitionKey> fmt::Debug for Done<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Done")
            .field("key", &self.key)
            .field("phase", &self.phase)
            .field("fired", &self.fired)
            .finish()
    }
}

impl<K: TransitionKey> Drop for Done<K> {
    fn drop(&mut self) {
        if !self.fired {
            tracing::warn!(
                target: "ftui.transition",
                key = ?self.key,
                phase = %self.phase,
                "completion handle dropped without firing; key stays in flight"
            );
        }
    }
}
