#![forbid(unsafe_code)]

//! Collaborator interfaces: per-item hooks and the host.
//!
//! The group never renders, measures or animates anything itself. It asks a
//! [`TransitionHost`] to do so, and looks up each item's optional
//! [`HookSet`] through the host by key.
//!
//! # Hook protocol
//!
//! | Hook | When | Absent |
//! |------|------|--------|
//! | `will_enter(done)` | key starts entering | enter completes immediately |
//! | `did_enter()` | enter completed | skipped |
//! | `will_leave(done)` | key starts leaving | leave completes immediately |
//! | `did_leave()` | leave completed | skipped |
//!
//! A `will_*` hook must fire its [`Done`] exactly once, either before it
//! returns or on a later turn. A hook that never fires it leaves the key in
//! flight forever: the container stays frozen and
//! [`TransitionHost::on_transition_finish`] is never called.

use std::fmt;

use crate::TransitionKey;
use crate::completion::Done;
use crate::geometry::Size;
use crate::snapshot::Snapshot;

type WillHook<K> = Box<dyn FnMut(Done<K>)>;
type DidHook = Box<dyn FnMut()>;

/// Optional lifecycle hooks of one item.
pub struct HookSet<K: TransitionKey> {
    will_enter: Option<WillHook<K>>,
    did_enter: Option<DidHook>,
    will_leave: Option<WillHook<K>>,
    did_leave: Option<DidHook>,
}

impl<K: TransitionKey> HookSet<K> {
    /// A hook set with no hooks; every phase completes immediately.
    #[must_use]
    pub fn new() -> Self {
        Self {
            will_enter: None,
            did_enter: None,
            will_leave: None,
            did_leave: None,
        }
    }

    /// Set the hook run when the item starts entering.
    #[must_use]
    pub fn will_enter(mut self, hook: impl FnMut(Done<K>) + 'static) -> Self {
        self.will_enter = Some(Box::new(hook));
        self
    }

    /// Set the hook run after the item finished entering.
    #[must_use]
    pub fn did_enter(mut self, hook: impl FnMut() + 'static) -> Self {
        self.did_enter = Some(Box::new(hook));
        self
    }

    /// Set the hook run when the item starts leaving.
    #[must_use]
    pub fn will_leave(mut self, hook: impl FnMut(Done<K>) + 'static) -> Self {
        self.will_leave = Some(Box::new(hook));
        self
    }

    /// Set the hook run after the item finished leaving.
    #[must_use]
    pub fn did_leave(mut self, hook: impl FnMut() + 'static) -> Self {
        self.did_leave = Some(Box::new(hook));
        self
    }

    /// Run the enter hook, or fire `done` at once if there is none.
    pub(crate) fn run_will_enter(this: Option<&mut Self>, done: Done<K>) {
        match this.and_then(|hooks| hooks.will_enter.as_mut()) {
            Some(hook) => hook(done),
            None => done.complete(),
        }
    }

    /// Run the leave hook, or fire `done` at once if there is none.
    pub(crate) fn run_will_leave(this: Option<&mut Self>, done: Done<K>) {
        match this.and_then(|hooks| hooks.will_leave.as_mut()) {
            Some(hook) => hook(done),
            None => done.complete(),
        }
    }

    pub(crate) fn run_did_enter(this: Option<&mut Self>) {
        if let Some(hook) = this.and_then(|hooks| hooks.did_enter.as_mut()) {
            hook();
        }
    }

    pub(crate) fn run_did_leave(this: Option<&mut Self>) {
        if let Some(hook) = this.and_then(|hooks| hooks.did_leave.as_mut()) {
            hook();
        }
    }
}

impl<K: TransitionKey> Default for HookSet<K> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: TransitionKey> fmt::Debug for HookSet<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HookSet")
            .field("will_enter", &self.will_enter.is_some())
            .field("did_enter", &self.did_enter.is_some())
            .field("will_leave", &self.will_leave.is_some())
            .field("did_leave", &self.did_leave.is_some())
            .finish()
    }
}

/// The rendering side of a transition group.
///
/// Every method has a default, so a host implements only what it uses. A
/// host that implements nothing gets instant, unanimated transitions.
pub trait TransitionHost<K: TransitionKey, V> {
    /// Materialize the retained set. Called whenever it changes.
    fn render_frame(&mut self, _retained: &Snapshot<K, V>) {}

    /// Rendered size of a mounted key; `None` when it is not renderable.
    fn measure(&mut self, _key: &K) -> Option<Size> {
        None
    }

    /// Lifecycle hooks for `key`; `None` when the item defines none.
    fn hooks(&mut self, _key: &K) -> Option<&mut HookSet<K>> {
        None
    }

    /// Lock the container's box to `size` while transitions run.
    fn freeze(&mut self, _size: Size) {}

    /// Restore the container's natural sizing.
    fn release(&mut self) {}

    /// A cycle with work has started.
    fn on_transition_start(&mut self) {}

    /// Nothing is in flight any more.
    fn on_transition_finish(&mut self) {}
}

/// Composes the retained items into a host-defined output.
pub trait Compose<K, V> {
    /// What a composed frame looks like.
    type Output;

    /// Build the frame from the retained items, in retained order.
    fn compose<'a, I>(&mut self, children: I) -> Self::Output
    where
        I: Iterator<Item = (&'a K, &'a V)>,
        K: 'a,
        V: 'a;
}
