#![forbid(unsafe_code)]

//! Transition group: the keyed enter/leave state machine.
//!
//! A [`TransitionGroup`] owns the *retained set* (what is rendered, including
//! keys still animating out) and the *in-flight map* (keys whose enter or
//! leave hook has not completed). Each update is one cycle:
//!
//! 1. [`stage_update`](TransitionGroup::stage_update) merges the incoming
//!    snapshot into the retained set and picks the cycle's candidates.
//! 2. The host renders the retained set.
//! 3. [`on_cycle_ready`](TransitionGroup::on_cycle_ready) measures a
//!    candidate, freezes the container, announces the cycle and starts the
//!    enter and leave phases.
//!
//! [`apply_update`](TransitionGroup::apply_update) runs all three steps.
//!
//! # Per-key state machine
//!
//! ```text
//! Idle ──start_enter──▶ Entering ──done, key present──▶ Idle
//!                          │
//!                          └─────done, key absent────▶ Leaving
//!
//! Idle ──start_leave──▶ Leaving ───done, key absent───▶ Removed
//!                          │
//!                          └────done, key present────▶ Entering
//! ```
//!
//! # Invariants
//!
//! 1. Every in-flight key is in the retained set.
//! 2. Every key of the latest snapshot is in the retained set.
//! 3. A key leaves the retained set only when its leave completes while it
//!    is absent from the latest snapshot.
//! 4. `on_transition_finish` fires once per burst, when the in-flight map
//!    drains; extra [`try_finish`](TransitionGroup::try_finish) calls are
//!    no-ops.
//!
//! # Failure Modes
//!
//! - **Hook never completes**: the key stays in flight, the container stays
//!   frozen and the burst never finishes. There is no timeout.
//! - **Completion for an untracked key**: processed as if it were tracked.
//!   Not validated.

use std::fmt;

use crate::TransitionKey;
use crate::completion::{Completion, CompletionQueue, Done};
use crate::config::{CandidatePolicy, MeasurePreference, TransitionConfig};
use crate::diff::{CandidateSet, diff, diff_all};
use crate::geometry::Size;
use crate::hooks::{Compose, HookSet, TransitionHost};
use crate::in_flight::{InFlight, Phase};
use crate::snapshot::Snapshot;

const TARGET: &str = "ftui.transition";

/// Counters for monitoring and tests.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransitionStats {
    /// Snapshots staged.
    pub updates: u64,
    /// Cycles announced with `on_transition_start`.
    pub cycles_announced: u64,
    /// Enter phases started, escapes included.
    pub enters_started: u64,
    /// Leave phases started, escapes included.
    pub leaves_started: u64,
    /// Enter phases completed.
    pub enters_completed: u64,
    /// Leave phases completed.
    pub leaves_completed: u64,
    /// Leaving keys that came back before their leave completed.
    pub reentries: u64,
    /// Entering keys that went away before their enter completed.
    pub early_leaves: u64,
    /// Keys dropped from the retained set.
    pub removals: u64,
    /// Bursts closed with `on_transition_finish`.
    pub finishes: u64,
}

/// Keyed transition controller.
pub struct TransitionGroup<K: TransitionKey, V> {
    config: TransitionConfig,
    /// Everything rendered, including keys still leaving.
    retained: Snapshot<K, V>,
    /// Keys of the latest applied snapshot.
    latest: Snapshot<K, ()>,
    in_flight: InFlight<K>,
    /// Candidates staged but not yet started.
    pending: CandidateSet<K>,
    completions: CompletionQueue<K>,
    frozen: Option<Size>,
    /// Between `on_transition_start` and `on_transition_finish`.
    burst_active: bool,
    stats: TransitionStats,
}

impl<K: TransitionKey, V> fmt::Debug for TransitionGroup<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransitionGroup")
            .field("retained", &self.retained.len())
            .field("latest", &self.latest.len())
            .field("in_flight", &self.in_flight)
            .field("pending", &self.pending)
            .field("queued_completions", &self.completions.len())
            .field("frozen", &self.frozen)
            .field("burst_active", &self.burst_active)
            .finish_non_exhaustive()
    }
}

impl<K: TransitionKey, V> Default for TransitionGroup<K, V> {
    fn default() -> Self {
        Self::new(TransitionConfig::default())
    }
}

// ---------------------------------------------------------------------------
// Construction and inspection
// ---------------------------------------------------------------------------

impl<K: TransitionKey, V> TransitionGroup<K, V> {
    /// Create an empty group.
    #[must_use]
    pub fn new(config: TransitionConfig) -> Self {
        Self::with_initial(Snapshot::new(), config)
    }

    /// Create a group whose initial contents are shown without transitions.
    #[must_use]
    pub fn with_initial(initial: Snapshot<K, V>, config: TransitionConfig) -> Self {
        Self {
            config,
            latest: initial.key_snapshot(),
            retained: initial,
            in_flight: InFlight::new(),
            pending: CandidateSet::new(),
            completions: CompletionQueue::new(),
            frozen: None,
            burst_active: false,
            stats: TransitionStats::default(),
        }
    }

    /// Active configuration.
    pub fn config(&self) -> &TransitionConfig {
        &self.config
    }

    /// The retained set, in render order.
    pub fn retained(&self) -> &Snapshot<K, V> {
        &self.retained
    }

    /// Keys of the latest applied snapshot.
    pub fn latest_keys(&self) -> &Snapshot<K, ()> {
        &self.latest
    }

    /// Keys mid-transition.
    pub fn in_flight(&self) -> &InFlight<K> {
        &self.in_flight
    }

    /// Running phase of `key`, `None` when idle or unknown.
    pub fn phase(&self, key: &K) -> Option<Phase> {
        self.in_flight.phase(key)
    }

    /// Whether any key is mid-transition.
    #[inline]
    pub fn is_transitioning(&self) -> bool {
        !self.in_flight.is_empty()
    }

    /// Candidates staged by [`stage_update`](Self::stage_update) and not yet
    /// started.
    pub fn pending_candidates(&self) -> &CandidateSet<K> {
        &self.pending
    }

    /// Whether completion handles fired since the last drain.
    pub fn has_pending_completions(&self) -> bool {
        !self.completions.is_empty()
    }

    /// Size the container is frozen to, if any.
    pub fn frozen_size(&self) -> Option<Size> {
        self.frozen
    }

    /// Counters.
    pub fn stats(&self) -> &TransitionStats {
        &self.stats
    }

    /// Compose the retained items.
    pub fn render<C: Compose<K, V>>(&self, compose: &mut C) -> C::Output {
        compose.compose(self.retained.iter())
    }
}

// ---------------------------------------------------------------------------
// Update cycle
// ---------------------------------------------------------------------------

impl<K: TransitionKey, V> TransitionGroup<K, V> {
    /// Request a new desired state and run its cycle.
    ///
    /// Stages `incoming`, lets the host render the retained set, then runs
    /// [`on_cycle_ready`](Self::on_cycle_ready). Hooks that complete
    /// synchronously are fully processed before this returns.
    pub fn apply_update<H>(&mut self, incoming: Snapshot<K, V>, host: &mut H)
    where
        H: TransitionHost<K, V>,
    {
        self.stage_update(incoming);
        host.render_frame(&self.retained);
        self.on_cycle_ready(host);
    }

    /// Merge `incoming` into the retained set and pick this cycle's
    /// candidates, without starting anything.
    ///
    /// Candidates are diffed against the retained set, so a key left behind
    /// by an earlier one-winner cycle is picked up by a later one. Staged
    /// candidates that `incoming` contradicts are dropped: an entering key
    /// it no longer contains, a leaving key it contains again.
    ///
    /// Must be followed by [`on_cycle_ready`](Self::on_cycle_ready) once the
    /// host has rendered the retained set.
    pub fn stage_update(&mut self, incoming: Snapshot<K, V>) {
        self.stats.updates += 1;

        let candidates = match self.config.candidate_policy {
            CandidatePolicy::FirstOnly => {
                CandidateSet::from(diff(&self.retained, &incoming, &self.in_flight))
            }
            CandidatePolicy::All => diff_all(&self.retained, &incoming, &self.in_flight),
        };

        self.pending.entering.retain(|key| incoming.contains_key(key));
        self.pending.leaving.retain(|key| !incoming.contains_key(key));
        for key in candidates.entering {
            if !self.pending.entering.contains(&key) {
                self.pending.entering.push(key);
            }
        }
        for key in candidates.leaving {
            if !self.pending.leaving.contains(&key) {
                self.pending.leaving.push(key);
            }
        }
        if self.config.candidate_policy == CandidatePolicy::FirstOnly {
            self.pending.entering.truncate(1);
            self.pending.leaving.truncate(1);
        }

        self.latest = incoming.key_snapshot();
        self.retained.merge(incoming);

        tracing::trace!(
            target: TARGET,
            retained = self.retained.len(),
            latest = self.latest.len(),
            pending_entering = self.pending.entering.len(),
            pending_leaving = self.pending.leaving.len(),
            "update staged"
        );
    }

    /// Start the staged cycle.
    ///
    /// Measures a candidate and freezes the container to its size, notifies
    /// [`TransitionHost::on_transition_start`], clears the staged candidates,
    /// then starts the enter phases followed by the leave phases. Candidates
    /// that went in flight or left the retained set since staging are
    /// skipped. A cycle with no candidates is still announced and closes its
    /// burst when nothing is in flight, unless
    /// [`TransitionConfig::announce_empty_cycles`] is off.
    pub fn on_cycle_ready<H>(&mut self, host: &mut H)
    where
        H: TransitionHost<K, V>,
    {
        let mut candidates = std::mem::take(&mut self.pending);
        let (retained, in_flight) = (&self.retained, &self.in_flight);
        let startable = |key: &K| retained.contains_key(key) && !in_flight.contains(key);
        candidates.entering.retain(|key| startable(key));
        candidates.leaving.retain(|key| startable(key));

        if candidates.is_empty() && !self.config.announce_empty_cycles {
            tracing::trace!(
                target: TARGET,
                in_flight = self.in_flight.len(),
                "quiet cycle"
            );
            return;
        }

        let _span = tracing::debug_span!(
            "transition.cycle",
            entering = candidates.entering.len() as u64,
            leaving = candidates.leaving.len() as u64,
            in_flight = self.in_flight.len() as u64,
        )
        .entered();

        if self.config.freeze_container {
            self.freeze_to_candidate(&candidates, host);
        }
        self.announce(host);

        for key in candidates.entering {
            self.begin_enter(key, host);
        }
        for key in candidates.leaving {
            self.begin_leave(key, host);
        }

        self.process_completions(host);
        self.try_finish(host);
    }

    fn freeze_to_candidate<H>(&mut self, candidates: &CandidateSet<K>, host: &mut H)
    where
        H: TransitionHost<K, V>,
    {
        let entering = candidates.entering.first();
        let leaving = candidates.leaving.first();
        let (first, second) = match self.config.measure_preference {
            MeasurePreference::Entering => (entering, leaving),
            MeasurePreference::Leaving => (leaving, entering),
        };

        let mut size = None;
        for key in [first, second].into_iter().flatten() {
            size = host.measure(key);
            if size.is_some() {
                break;
            }
        }

        if let Some(size) = size {
            tracing::debug!(
                target: TARGET,
                width = size.width,
                height = size.height,
                "container frozen"
            );
            self.frozen = Some(size);
            host.freeze(size);
        }
    }

    fn announce<H>(&mut self, host: &mut H)
    where
        H: TransitionHost<K, V>,
    {
        self.burst_active = true;
        self.stats.cycles_announced += 1;
        tracing::debug!(
            target: TARGET,
            in_flight = self.in_flight.len(),
            "transition started"
        );
        host.on_transition_start();
    }
}

// ---------------------------------------------------------------------------
// Phases
// ---------------------------------------------------------------------------

impl<K: TransitionKey, V> TransitionGroup<K, V> {
    /// Start the enter phase of a retained key outside a cycle.
    ///
    /// Opens a burst if none is active. `key` must be in the retained set.
    pub fn start_enter<H>(&mut self, key: K, host: &mut H)
    where
        H: TransitionHost<K, V>,
    {
        if !self.burst_active {
            self.announce(host);
        }
        self.begin_enter(key, host);
        self.process_completions(host);
        self.try_finish(host);
    }

    /// Start the leave phase of a retained key outside a cycle.
    ///
    /// Opens a burst if none is active. `key` must be in the retained set.
    pub fn start_leave<H>(&mut self, key: K, host: &mut H)
    where
        H: TransitionHost<K, V>,
    {
        if !self.burst_active {
            self.announce(host);
        }
        self.begin_leave(key, host);
        self.process_completions(host);
        self.try_finish(host);
    }

    /// Finish the enter phase of `key` as if its handle had fired.
    pub fn on_enter_complete<H>(&mut self, key: K, host: &mut H)
    where
        H: TransitionHost<K, V>,
    {
        self.finish_enter(key, host);
        self.process_completions(host);
    }

    /// Finish the leave phase of `key` as if its handle had fired.
    pub fn on_leave_complete<H>(&mut self, key: K, host: &mut H)
    where
        H: TransitionHost<K, V>,
    {
        self.finish_leave(key, host);
        self.process_completions(host);
    }

    /// Process every completion fired since the last drain.
    ///
    /// Call this on each turn of the host's event loop while
    /// [`is_transitioning`](Self::is_transitioning). Returns the number of
    /// completions processed, including ones fired while processing.
    pub fn process_completions<H>(&mut self, host: &mut H) -> usize
    where
        H: TransitionHost<K, V>,
    {
        let mut processed = 0;
        while let Some(Completion { key, phase }) = self.completions.pop() {
            processed += 1;
            match phase {
                Phase::Entering => self.finish_enter(key, host),
                Phase::Leaving => self.finish_leave(key, host),
            }
        }
        processed
    }

    /// Close the burst if nothing is in flight.
    ///
    /// Releases the container and notifies
    /// [`TransitionHost::on_transition_finish`] once per burst.
    pub fn try_finish<H>(&mut self, host: &mut H)
    where
        H: TransitionHost<K, V>,
    {
        if self.is_transitioning() || !self.burst_active {
            return;
        }
        self.burst_active = false;
        self.frozen = None;
        self.stats.finishes += 1;
        host.release();
        tracing::debug!(
            target: TARGET,
            retained = self.retained.len(),
            "transition finished"
        );
        host.on_transition_finish();
    }

    fn begin_enter<H>(&mut self, key: K, host: &mut H)
    where
        H: TransitionHost<K, V>,
    {
        self.in_flight.begin(key.clone(), Phase::Entering);
        self.stats.enters_started += 1;
        tracing::debug!(target: TARGET, key = ?key, "enter started");

        let done = Done::new(key.clone(), Phase::Entering, self.completions.clone());
        HookSet::run_will_enter(host.hooks(&key), done);
    }

    fn begin_leave<H>(&mut self, key: K, host: &mut H)
    where
        H: TransitionHost<K, V>,
    {
        self.in_flight.begin(key.clone(), Phase::Leaving);
        self.stats.leaves_started += 1;
        tracing::debug!(target: TARGET, key = ?key, "leave started");

        let done = Done::new(key.clone(), Phase::Leaving, self.completions.clone());
        HookSet::run_will_leave(host.hooks(&key), done);
    }

    fn finish_enter<H>(&mut self, key: K, host: &mut H)
    where
        H: TransitionHost<K, V>,
    {
        HookSet::run_did_enter(host.hooks(&key));
        self.in_flight.end(&key);
        self.stats.enters_completed += 1;

        if self.latest.contains_key(&key) {
            tracing::debug!(target: TARGET, key = ?key, "enter settled");
        } else {
            self.stats.early_leaves += 1;
            tracing::debug!(
                target: TARGET,
                key = ?key,
                next = %Phase::Entering.opposite(),
                "removed before enter finished"
            );
            self.begin_leave(key, host);
        }

        self.try_finish(host);
    }

    fn finish_leave<H>(&mut self, key: K, host: &mut H)
    where
        H: TransitionHost<K, V>,
    {
        HookSet::run_did_leave(host.hooks(&key));
        self.in_flight.end(&key);
        self.stats.leaves_completed += 1;

        if self.latest.contains_key(&key) {
            self.stats.reentries += 1;
            tracing::debug!(
                target: TARGET,
                key = ?key,
                next = %Phase::Leaving.opposite(),
                "re-added before leave finished"
            );
            self.begin_enter(key, host);
        } else if self.retained.remove(&key).is_some() {
            self.stats.removals += 1;
            tracing::debug!(target: TARGET, key = ?key, "removed");
            host.render_frame(&self.retained);
        }

        self.try_finish(host);
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{HookMode, HostEvent, RecordingHost};

    fn snap(keys: &[&'static str]) -> Snapshot<&'static str, u32> {
        keys.iter().enumerate().map(|(i, k)| (*k, i as u32)).collect()
    }

    fn retained_keys<V>(group: &TransitionGroup<&'static str, V>) -> Vec<&'static str> {
        group.retained().keys().copied().collect()
    }

    #[test]
    fn hookless_update_settles_before_returning() {
        let mut host = RecordingHost::new();
        let mut group = TransitionGroup::default();

        group.apply_update(snap(&["a"]), &mut host);

        assert!(!group.is_transitioning());
        assert_eq!(host.count(|e| *e == HostEvent::TransitionStart), 1);
        assert_eq!(host.count(|e| *e == HostEvent::TransitionFinish), 1);
        assert_eq!(retained_keys(&group), ["a"]);
    }

    #[test]
    fn replace_scenario() {
        let mut host = RecordingHost::new();
        host.script("c", HookMode::Immediate, HookMode::Immediate);
        host.script("a", HookMode::Immediate, HookMode::Immediate);
        let initial = Snapshot::from_iter([("a", 'X'), ("b", 'Y')]);
        let mut group = TransitionGroup::with_initial(initial, TransitionConfig::default());

        group.stage_update(Snapshot::from_iter([("b", 'Y'), ("c", 'Z')]));
        assert_eq!(group.pending_candidates().entering, ["c"]);
        assert_eq!(group.pending_candidates().leaving, ["a"]);
        group.on_cycle_ready(&mut host);

        assert_eq!(group.retained(), &Snapshot::from_iter([("b", 'Y'), ("c", 'Z')]));
        assert!(group.pending_candidates().is_empty());
        assert_eq!(host.count(|e| *e == HostEvent::WillEnter("c")), 1);
        assert_eq!(host.count(|e| *e == HostEvent::DidLeave("a")), 1);
        assert_eq!(host.count(|e| *e == HostEvent::TransitionFinish), 1);
    }

    #[test]
    fn enter_runs_before_leave_within_a_cycle() {
        let mut host = RecordingHost::new();
        host.script("old", HookMode::Deferred, HookMode::Deferred);
        host.script("new", HookMode::Deferred, HookMode::Deferred);
        let mut group = TransitionGroup::with_initial(snap(&["old"]), TransitionConfig::default());

        group.apply_update(snap(&["new"]), &mut host);

        let hooks: Vec<_> = host
            .events()
            .into_iter()
            .filter(|e| matches!(e, HostEvent::WillEnter(_) | HostEvent::WillLeave(_)))
            .collect();
        assert_eq!(hooks, [HostEvent::WillEnter("new"), HostEvent::WillLeave("old")]);
        assert_eq!(group.phase(&"new"), Some(Phase::Entering));
        assert_eq!(group.phase(&"old"), Some(Phase::Leaving));
    }

    #[test]
    fn measure_and_freeze_happen_before_hooks() {
        let mut host = RecordingHost::new().with_size("a", Size::new(10, 2));
        host.script("a", HookMode::Deferred, HookMode::Deferred);
        let mut group = TransitionGroup::default();

        group.apply_update(snap(&["a"]), &mut host);

        let events = host.events();
        let freeze = events
            .iter()
            .position(|e| *e == HostEvent::Freeze(Size::new(10, 2)))
            .unwrap();
        let start = events
            .iter()
            .position(|e| *e == HostEvent::TransitionStart)
            .unwrap();
        let will = events
            .iter()
            .position(|e| *e == HostEvent::WillEnter("a"))
            .unwrap();
        assert!(freeze < start && start < will);
        assert_eq!(group.frozen_size(), Some(Size::new(10, 2)));
        assert_eq!(host.frozen(), Some(Size::new(10, 2)));

        assert!(host.complete_parked(&"a"));
        group.process_completions(&mut host);
        assert_eq!(group.frozen_size(), None);
        assert_eq!(host.frozen(), None);
    }

    #[test]
    fn entering_candidate_is_measured_first() {
        let mut host = RecordingHost::new()
            .with_size("in", Size::new(4, 4))
            .with_size("out", Size::new(9, 9));
        let mut group = TransitionGroup::with_initial(snap(&["out"]), TransitionConfig::default());

        group.apply_update(snap(&["in"]), &mut host);

        assert_eq!(host.count(|e| matches!(e, HostEvent::Measure(_))), 1);
        assert!(host.events().contains(&HostEvent::Freeze(Size::new(4, 4))));
    }

    #[test]
    fn leaving_preference_measures_leaving_key() {
        let mut host = RecordingHost::new()
            .with_size("in", Size::new(4, 4))
            .with_size("out", Size::new(9, 9));
        let config = TransitionConfig::new().measure_preference(MeasurePreference::Leaving);
        let mut group = TransitionGroup::with_initial(snap(&["out"]), config);

        group.apply_update(snap(&["in"]), &mut host);

        assert!(host.events().contains(&HostEvent::Freeze(Size::new(9, 9))));
    }

    #[test]
    fn unmeasurable_preferred_falls_back() {
        let mut host = RecordingHost::new().with_size("out", Size::new(9, 9));
        let mut group = TransitionGroup::with_initial(snap(&["out"]), TransitionConfig::default());

        group.apply_update(snap(&["in"]), &mut host);

        assert_eq!(host.count(|e| matches!(e, HostEvent::Measure(_))), 2);
        assert!(host.events().contains(&HostEvent::Freeze(Size::new(9, 9))));
    }

    #[test]
    fn nothing_measurable_means_no_freeze() {
        let mut host = RecordingHost::new();
        let mut group = TransitionGroup::default();
        group.apply_update(snap(&["a"]), &mut host);
        assert_eq!(host.count(|e| matches!(e, HostEvent::Freeze(_))), 0);
        // Release still pairs with the finish.
        assert_eq!(host.count(|e| *e == HostEvent::Release), 1);
    }

    #[test]
    fn freezing_can_be_disabled() {
        let mut host = RecordingHost::new().with_size("a", Size::new(1, 1));
        let config = TransitionConfig::new().freeze_container(false);
        let mut group = TransitionGroup::new(config);
        group.apply_update(snap(&["a"]), &mut host);
        assert_eq!(host.count(|e| matches!(e, HostEvent::Measure(_))), 0);
        assert_eq!(host.count(|e| matches!(e, HostEvent::Freeze(_))), 0);
    }

    #[test]
    fn unchanged_snapshot_still_announces_cycle() {
        let mut host = RecordingHost::new();
        let mut group = TransitionGroup::with_initial(snap(&["a"]), TransitionConfig::default());
        group.apply_update(snap(&["a"]), &mut host);
        assert_eq!(host.count(|e| *e == HostEvent::TransitionStart), 1);
        assert_eq!(host.count(|e| *e == HostEvent::TransitionFinish), 1);
        assert_eq!(group.stats().cycles_announced, 1);
    }

    #[test]
    fn quiet_cycles_can_be_opted_into() {
        let mut host = RecordingHost::new();
        let config = TransitionConfig::new().announce_empty_cycles(false);
        let mut group = TransitionGroup::with_initial(snap(&["a"]), config);
        group.apply_update(snap(&["a"]), &mut host);
        assert_eq!(host.count(|e| *e == HostEvent::TransitionStart), 0);
        assert_eq!(host.count(|e| *e == HostEvent::TransitionFinish), 0);
        assert_eq!(group.stats().cycles_announced, 0);
    }

    #[test]
    fn stage_drops_entering_candidate_removed_before_cycle() {
        let mut host = RecordingHost::new();
        host.script("a", HookMode::Immediate, HookMode::Immediate);
        let mut group = TransitionGroup::default();

        group.stage_update(snap(&["a"]));
        group.stage_update(snap(&[]));
        assert!(group.pending_candidates().entering.is_empty());
        assert_eq!(group.pending_candidates().leaving, ["a"]);

        group.on_cycle_ready(&mut host);

        // One phase for the key, and nothing after the burst closes.
        assert_eq!(host.count(|e| *e == HostEvent::WillEnter("a")), 0);
        assert_eq!(host.count(|e| *e == HostEvent::WillLeave("a")), 1);
        assert_eq!(host.count(|e| *e == HostEvent::DidLeave("a")), 1);
        assert_eq!(group.stats().enters_started, 0);
        assert_eq!(group.stats().leaves_started, 1);
        assert_eq!(host.events().last(), Some(&HostEvent::TransitionFinish));
        assert!(group.retained().is_empty());
        assert!(!group.is_transitioning());
    }

    #[test]
    fn stage_drops_leaving_candidate_added_back_before_cycle() {
        let mut host = RecordingHost::new();
        host.script("a", HookMode::Immediate, HookMode::Immediate);
        let mut group = TransitionGroup::with_initial(snap(&["a"]), TransitionConfig::default());

        group.stage_update(snap(&[]));
        group.stage_update(snap(&["a"]));
        assert!(group.pending_candidates().is_empty());

        group.on_cycle_ready(&mut host);

        assert_eq!(host.count(|e| matches!(e, HostEvent::WillLeave(_))), 0);
        assert_eq!(host.count(|e| matches!(e, HostEvent::WillEnter(_))), 0);
        assert_eq!(retained_keys(&group), ["a"]);
        assert_eq!(host.events().last(), Some(&HostEvent::TransitionFinish));
    }

    #[test]
    fn restaging_never_puts_a_key_in_both_lists() {
        let config = TransitionConfig::new().candidate_policy(CandidatePolicy::All);
        let mut group = TransitionGroup::with_initial(snap(&["a", "b"]), config);

        group.stage_update(snap(&["c"]));
        group.stage_update(snap(&["a", "d"]));
        group.stage_update(snap(&["d"]));

        let pending = group.pending_candidates();
        assert_eq!(pending.entering, ["d"]);
        assert_eq!(pending.leaving, ["b", "c", "a"]);
        for key in &pending.entering {
            assert!(!pending.leaving.contains(key));
        }
    }

    #[test]
    fn all_policy_accumulates_entering_keys_across_stages() {
        let mut host = RecordingHost::new();
        host.script("a", HookMode::Immediate, HookMode::Immediate);
        host.script("b", HookMode::Immediate, HookMode::Immediate);
        let config = TransitionConfig::new().candidate_policy(CandidatePolicy::All);
        let mut group = TransitionGroup::new(config);

        group.stage_update(snap(&["a"]));
        group.stage_update(snap(&["a", "b"]));
        group.on_cycle_ready(&mut host);

        assert_eq!(host.count(|e| *e == HostEvent::WillEnter("a")), 1);
        assert_eq!(host.count(|e| *e == HostEvent::WillEnter("b")), 1);
    }

    #[test]
    fn first_only_removes_stranded_keys_on_later_updates() {
        let mut host = RecordingHost::new();
        let mut group =
            TransitionGroup::with_initial(snap(&["a", "b", "c"]), TransitionConfig::default());

        group.apply_update(snap(&[]), &mut host);
        assert_eq!(retained_keys(&group), ["b", "c"]);
        group.apply_update(snap(&[]), &mut host);
        assert_eq!(retained_keys(&group), ["c"]);
        group.apply_update(snap(&[]), &mut host);

        assert!(group.retained().is_empty());
        assert_eq!(group.stats().removals, 3);
        assert_eq!(group.stats().leaves_started, 3);
    }

    #[test]
    fn candidate_started_elsewhere_is_skipped_by_cycle() {
        let mut host = RecordingHost::new();
        host.script("a", HookMode::Immediate, HookMode::Deferred);
        let mut group = TransitionGroup::with_initial(snap(&["a"]), TransitionConfig::default());

        group.stage_update(snap(&[]));
        group.start_leave("a", &mut host);
        group.on_cycle_ready(&mut host);

        assert_eq!(host.count(|e| *e == HostEvent::WillLeave("a")), 1);
        assert_eq!(group.stats().leaves_started, 1);
        assert_eq!(group.phase(&"a"), Some(Phase::Leaving));
    }

    #[test]
    fn try_finish_is_idempotent() {
        let mut host = RecordingHost::new();
        host.script("a", HookMode::Deferred, HookMode::Deferred);
        let mut group = TransitionGroup::default();
        group.apply_update(snap(&["a"]), &mut host);

        // In flight: nothing to finish yet.
        group.try_finish(&mut host);
        assert_eq!(host.count(|e| *e == HostEvent::TransitionFinish), 0);

        host.complete_parked(&"a");
        group.process_completions(&mut host);
        for _ in 0..5 {
            group.try_finish(&mut host);
        }
        assert_eq!(host.count(|e| *e == HostEvent::TransitionFinish), 1);
        assert_eq!(group.stats().finishes, 1);
    }

    #[test]
    fn leave_then_reenter_before_done() {
        let mut host = RecordingHost::new();
        host.script("a", HookMode::Immediate, HookMode::Deferred);
        let mut group = TransitionGroup::with_initial(snap(&["a"]), TransitionConfig::default());

        group.apply_update(snap(&[]), &mut host);
        assert_eq!(group.phase(&"a"), Some(Phase::Leaving));

        group.apply_update(snap(&["a"]), &mut host);
        // Still leaving; the differ must not pick it again.
        assert_eq!(group.phase(&"a"), Some(Phase::Leaving));
        assert_eq!(host.count(|e| *e == HostEvent::WillEnter("a")), 0);

        host.complete_parked(&"a");
        assert_eq!(group.process_completions(&mut host), 2);

        assert_eq!(host.count(|e| *e == HostEvent::WillEnter("a")), 1);
        assert_eq!(host.count(|e| *e == HostEvent::DidEnter("a")), 1);
        assert_eq!(retained_keys(&group), ["a"]);
        assert!(!group.is_transitioning());
        assert_eq!(group.stats().reentries, 1);
        assert_eq!(group.stats().removals, 0);
    }

    #[test]
    fn enter_then_remove_before_done() {
        let mut host = RecordingHost::new();
        host.script("a", HookMode::Deferred, HookMode::Immediate);
        let mut group = TransitionGroup::default();

        group.apply_update(snap(&["a"]), &mut host);
        group.apply_update(snap(&[]), &mut host);
        assert_eq!(group.phase(&"a"), Some(Phase::Entering));
        assert_eq!(host.count(|e| *e == HostEvent::WillLeave("a")), 0);

        host.complete_parked(&"a");
        group.process_completions(&mut host);

        assert_eq!(host.count(|e| *e == HostEvent::WillLeave("a")), 1);
        assert!(group.retained().is_empty());
        assert!(!group.is_transitioning());
        assert_eq!(group.stats().early_leaves, 1);
        assert_eq!(host.count(|e| *e == HostEvent::TransitionFinish), 1);
    }

    #[test]
    fn direct_completion_calls_match_handles() {
        let mut host = RecordingHost::new();
        let mut group = TransitionGroup::with_initial(snap(&["a"]), TransitionConfig::default());
        host.script("a", HookMode::Immediate, HookMode::Deferred);
        group.apply_update(snap(&[]), &mut host);

        // Host reports completion through the group instead of the handle.
        host.discard_parked();
        group.on_leave_complete("a", &mut host);

        assert!(group.retained().is_empty());
        assert!(!group.is_transitioning());
    }

    #[test]
    fn start_enter_outside_a_cycle_opens_a_burst() {
        let mut host = RecordingHost::new();
        let mut group = TransitionGroup::with_initial(snap(&["a"]), TransitionConfig::default());
        group.start_enter("a", &mut host);
        assert_eq!(host.count(|e| *e == HostEvent::TransitionStart), 1);
        assert_eq!(host.count(|e| *e == HostEvent::TransitionFinish), 1);
        assert_eq!(retained_keys(&group), ["a"]);
    }

    #[test]
    fn start_leave_outside_a_cycle_removes_absent_key() {
        let mut host = RecordingHost::new();
        let mut group: TransitionGroup<&str, u32> = TransitionGroup::default();
        group.stage_update(snap(&["a"]));
        group.stage_update(snap(&[]));
        // "a" is retained but not in the latest snapshot.
        group.start_leave("a", &mut host);
        assert!(group.retained().is_empty());
        assert_eq!(group.stats().removals, 1);
    }

    #[test]
    fn removal_rerenders() {
        let mut host = RecordingHost::new();
        let mut group = TransitionGroup::with_initial(snap(&["a", "b"]), TransitionConfig::default());
        group.apply_update(snap(&["b"]), &mut host);
        let renders: Vec<_> = host
            .events()
            .into_iter()
            .filter(|e| matches!(e, HostEvent::Render(_)))
            .collect();
        assert_eq!(
            renders,
            [HostEvent::Render(vec!["a", "b"]), HostEvent::Render(vec!["b"])]
        );
    }

    #[test]
    fn first_only_leaves_one_key_per_cycle() {
        let mut host = RecordingHost::new();
        let mut group = TransitionGroup::with_initial(snap(&["a", "b", "c"]), TransitionConfig::default());

        group.apply_update(snap(&[]), &mut host);
        assert_eq!(retained_keys(&group), ["b", "c"]);
        assert_eq!(group.stats().leaves_started, 1);
    }

    #[test]
    fn all_policy_leaves_every_key() {
        let mut host = RecordingHost::new();
        let config = TransitionConfig::new().candidate_policy(CandidatePolicy::All);
        let mut group = TransitionGroup::with_initial(snap(&["a", "b", "c"]), config);

        group.apply_update(snap(&["x", "y"]), &mut host);
        assert_eq!(retained_keys(&group), ["x", "y"]);
        assert_eq!(group.stats().enters_started, 2);
        assert_eq!(group.stats().leaves_started, 3);
        assert_eq!(host.count(|e| *e == HostEvent::TransitionFinish), 1);
    }

    #[test]
    fn render_composes_retained_items() {
        struct Join;
        impl Compose<&'static str, u32> for Join {
            type Output = String;
            fn compose<'a, I>(&mut self, children: I) -> String
            where
                I: Iterator<Item = (&'a &'static str, &'a u32)>,
            {
                children
                    .map(|(k, v)| format!("{k}={v}"))
                    .collect::<Vec<_>>()
                    .join(",")
            }
        }

        let group = TransitionGroup::with_initial(snap(&["a", "b"]), TransitionConfig::default());
        assert_eq!(group.render(&mut Join), "a=0,b=1");
    }

    #[test]
    fn cycle_emits_tracing_span() {
        use std::sync::{Arc, Mutex};
        use tracing_subscriber::layer::SubscriberExt;
        use tracing_subscriber::registry::LookupSpan;

        #[derive(Default)]
        struct Fields(Vec<(String, u64)>);

        impl tracing::field::Visit for Fields {
            fn record_u64(&mut self, field: &tracing::field::Field, value: u64) {
                self.0.push((field.name().to_string(), value));
            }
            fn record_debug(&mut self, _: &tracing::field::Field, _: &dyn fmt::Debug) {}
        }

        struct SpanCapture(Arc<Mutex<Vec<(String, Vec<(String, u64)>)>>>);

        impl<S> tracing_subscriber::Layer<S> for SpanCapture
        where
            S: tracing::Subscriber + for<'a> LookupSpan<'a>,
        {
            fn on_new_span(
                &self,
                attrs: &tracing::span::Attributes<'_>,
                _id: &tracing::span::Id,
                _ctx: tracing_subscriber::layer::Context<'_, S>,
            ) {
                let mut fields = Fields::default();
                attrs.record(&mut fields);
                self.0
                    .lock()
                    .unwrap()
                    .push((attrs.metadata().name().to_string(), fields.0));
            }
        }

        let spans = Arc::new(Mutex::new(Vec::new()));
        let subscriber = tracing_subscriber::registry().with(SpanCapture(Arc::clone(&spans)));
        tracing::subscriber::with_default(subscriber, || {
            let mut host = RecordingHost::new();
            let mut group =
                TransitionGroup::with_initial(snap(&["a"]), TransitionConfig::default());
            group.apply_update(snap(&["b"]), &mut host);
        });

        let spans = spans.lock().unwrap();
        let (_, fields) = spans
            .iter()
            .find(|(name, _)| name == "transition.cycle")
            .expect("cycle span recorded");
        assert!(fields.contains(&("entering".to_string(), 1)));
        assert!(fields.contains(&("leaving".to_string(), 1)));
    }
}
