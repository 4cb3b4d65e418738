#![forbid(unsafe_code)]

//! Scripted collaborator for tests.
//!
//! [`RecordingHost`] implements [`TransitionHost`] for any item type. It logs
//! every call it receives as a [`HostEvent`], reports sizes configured with
//! [`RecordingHost::with_size`], and installs per-key hooks whose `will_*`
//! half either completes at once or parks its [`Done`] handle until the test
//! releases it.
//!
//! Parked handles make the asynchronous completion path explicit:
//!
//! ```ignore
//! host.script("a", HookMode::Immediate, HookMode::Deferred);
//! group.apply_update(without_a, &mut host);   // leave hook parks
//! host.complete_parked(&"a");                 // fire it
//! group.process_completions(&mut host);       // group sees it
//! ```

use std::cell::RefCell;
use std::rc::Rc;

use ahash::AHashMap;

use crate::TransitionKey;
use crate::completion::Done;
use crate::geometry::Size;
use crate::hooks::{HookSet, TransitionHost};
use crate::snapshot::Snapshot;

/// One call observed by a [`RecordingHost`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostEvent<K> {
    /// `render_frame` with the retained keys in order.
    Render(Vec<K>),
    /// `measure` for a key.
    Measure(K),
    /// `freeze` to a size.
    Freeze(Size),
    /// `release`.
    Release,
    /// `on_transition_start`.
    TransitionStart,
    /// `on_transition_finish`.
    TransitionFinish,
    /// The key's enter hook ran.
    WillEnter(K),
    /// The key's post-enter hook ran.
    DidEnter(K),
    /// The key's leave hook ran.
    WillLeave(K),
    /// The key's post-leave hook ran.
    DidLeave(K),
}

/// How a scripted `will_*` hook behaves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookMode {
    /// No hook; the phase completes without any event.
    Absent,
    /// The hook fires `done` before returning.
    Immediate,
    /// The hook parks `done` until the test completes it.
    Deferred,
}

type EventLog<K> = Rc<RefCell<Vec<HostEvent<K>>>>;
type Parked<K> = Rc<RefCell<Vec<Done<K>>>>;

/// A [`TransitionHost`] that records everything.
pub struct RecordingHost<K: TransitionKey> {
    log: EventLog<K>,
    parked: Parked<K>,
    hooks: AHashMap<K, HookSet<K>>,
    sizes: AHashMap<K, Size>,
    frozen: Option<Size>,
}

impl<K: TransitionKey> RecordingHost<K> {
    /// A host with no sizes and no hooks.
    #[must_use]
    pub fn new() -> Self {
        Self {
            log: Rc::new(RefCell::new(Vec::new())),
            parked: Rc::new(RefCell::new(Vec::new())),
            hooks: AHashMap::new(),
            sizes: AHashMap::new(),
            frozen: None,
        }
    }

    /// Report `size` when `key` is measured (builder pattern).
    #[must_use]
    pub fn with_size(mut self, key: K, size: Size) -> Self {
        self.sizes.insert(key, size);
        self
    }

    /// Report `size` when `key` is measured.
    pub fn set_size(&mut self, key: K, size: Size) {
        self.sizes.insert(key, size);
    }

    /// Install recording hooks for `key`.
    ///
    /// `did_*` hooks are installed whenever the matching `will_*` mode is not
    /// [`HookMode::Absent`].
    pub fn script(&mut self, key: K, enter: HookMode, leave: HookMode) {
        let mut hooks = HookSet::new();

        if enter != HookMode::Absent {
            let (log, parked, k) = (Rc::clone(&self.log), Rc::clone(&self.parked), key.clone());
            hooks = hooks.will_enter(move |done| {
                log.borrow_mut().push(HostEvent::WillEnter(k.clone()));
                settle(enter, done, &parked);
            });
            let (log, k) = (Rc::clone(&self.log), key.clone());
            hooks = hooks.did_enter(move || log.borrow_mut().push(HostEvent::DidEnter(k.clone())));
        }

        if leave != HookMode::Absent {
            let (log, parked, k) = (Rc::clone(&self.log), Rc::clone(&self.parked), key.clone());
            hooks = hooks.will_leave(move |done| {
                log.borrow_mut().push(HostEvent::WillLeave(k.clone()));
                settle(leave, done, &parked);
            });
            let (log, k) = (Rc::clone(&self.log), key.clone());
            hooks = hooks.did_leave(move || log.borrow_mut().push(HostEvent::DidLeave(k.clone())));
        }

        self.hooks.insert(key, hooks);
    }

    /// Install a custom hook set for `key`.
    pub fn set_hooks(&mut self, key: K, hooks: HookSet<K>) {
        self.hooks.insert(key, hooks);
    }

    /// Every event so far, in order.
    pub fn events(&self) -> Vec<HostEvent<K>> {
        self.log.borrow().clone()
    }

    /// Number of events matching `pred`.
    pub fn count(&self, pred: impl Fn(&HostEvent<K>) -> bool) -> usize {
        self.log.borrow().iter().filter(|e| pred(e)).count()
    }

    /// Forget all recorded events.
    pub fn clear_events(&mut self) {
        self.log.borrow_mut().clear();
    }

    /// Keys with a parked handle, oldest first.
    pub fn parked_keys(&self) -> Vec<K> {
        self.parked.borrow().iter().map(|done| done.key().clone()).collect()
    }

    /// Fire the oldest parked handle for `key`. Returns `false` if none.
    pub fn complete_parked(&mut self, key: &K) -> bool {
        let done = {
            let mut parked = self.parked.borrow_mut();
            let Some(idx) = parked.iter().position(|done| done.key() == key) else {
                return false;
            };
            parked.remove(idx)
        };
        done.complete();
        true
    }

    /// Fire every parked handle, oldest first. Returns how many fired.
    pub fn complete_all_parked(&mut self) -> usize {
        let drained: Vec<_> = self.parked.borrow_mut().drain(..).collect();
        let count = drained.len();
        for done in drained {
            done.complete();
        }
        count
    }

    /// Drop every parked handle without firing it.
    pub fn discard_parked(&mut self) {
        self.parked.borrow_mut().clear();
    }

    /// Size the container is currently frozen to.
    pub fn frozen(&self) -> Option<Size> {
        self.frozen
    }

    fn record(&self, event: HostEvent<K>) {
        self.log.borrow_mut().push(event);
    }
}

fn settle<K: TransitionKey>(mode: HookMode, done: Done<K>, parked: &Parked<K>) {
    match mode {
        HookMode::Deferred => parked.borrow_mut().push(done),
        HookMode::Immediate | HookMode::Absent => done.complete(),
    }
}

impl<K: TransitionKey> Default for RecordingHost<K> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: TransitionKey, V> TransitionHost<K, V> for RecordingHost<K> {
    fn render_frame(&mut self, retained: &Snapshot<K, V>) {
        self.record(HostEvent::Render(retained.keys().cloned().collect()));
    }

    fn measure(&mut self, key: &K) -> Option<Size> {
        self.record(HostEvent::Measure(key.clone()));
        self.sizes.get(key).copied()
    }

    fn hooks(&mut self, key: &K) -> Option<&mut HookSet<K>> {
        self.hooks.get_mut(key)
    }

    fn freeze(&mut self, size: Size) {
        self.frozen = Some(size);
        self.record(HostEvent::Freeze(size));
    }

    fn release(&mut self) {
        self.frozen = None;
        self.record(HostEvent::Release);
    }

    fn on_transition_start(&mut self) {
        self.record(HostEvent::TransitionStart);
    }

    fn on_transition_finish(&mut self) {
        self.record(HostEvent::TransitionFinish);
    }
}
