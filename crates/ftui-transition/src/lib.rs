#![forbid(unsafe_code)]

//! Transition groups: keyed enter/leave lifecycles for dynamic collections.
//!
//! # Role in FrankenTUI
//! `ftui-transition` decides *when* items of a keyed collection start and
//! finish their enter and leave animations. It never decides *how* an item
//! animates; that belongs to the item's own hooks (typically driven by the
//! `ftui-core` animation primitives).
//!
//! # Primary responsibilities
//! - **Snapshot**: insertion-ordered keyed mapping of the desired contents.
//! - **Mapping differ**: picks the keys that start entering or leaving in a
//!   cycle, skipping keys already mid-transition.
//! - **TransitionGroup**: owns the retained set and the in-flight map, runs
//!   the enter/leave protocol and resolves escape transitions (a key that
//!   comes back while leaving, or goes away while entering).
//! - **TransitionHost**: the collaborator seam for rendering, measuring,
//!   freezing the container and per-item hooks.
//!
//! # Example
//!
//! ```
//! use ftui_transition::{Snapshot, TransitionGroup, TransitionHost};
//!
//! #[derive(Default)]
//! struct Host {
//!     finished: usize,
//! }
//!
//! // No hooks: every phase completes immediately.
//! impl TransitionHost<&'static str, u32> for Host {
//!     fn on_transition_finish(&mut self) {
//!         self.finished += 1;
//!     }
//! }
//!
//! let mut host = Host::default();
//! let mut group = TransitionGroup::default();
//!
//! group.apply_update(Snapshot::from_iter([("a", 1u32), ("b", 2)]), &mut host);
//! group.apply_update(Snapshot::from_iter([("b", 2u32), ("c", 3)]), &mut host);
//!
//! assert!(!group.is_transitioning());
//! assert_eq!(group.retained().keys().copied().collect::<Vec<_>>(), ["b", "c"]);
//! assert_eq!(host.finished, 2);
//! ```
//!
//! # Liveness contract
//! Hooks are trusted to fire their [`Done`] handle eventually. There is no
//! internal timeout: a hook that never completes keeps its key in flight and
//! the container frozen. Hosts that cannot guarantee completion should wrap
//! their hooks in their own deadline.

pub mod completion;
pub mod config;
pub mod diff;
pub mod geometry;
pub mod group;
pub mod hooks;
pub mod in_flight;
pub mod snapshot;

#[cfg(any(test, feature = "test-helpers"))]
pub mod testing;

use std::fmt;
use std::hash::Hash;

pub use completion::{Completion, CompletionQueue, Done};
pub use config::{CandidatePolicy, ConfigError, MeasurePreference, TransitionConfig};
pub use diff::{CandidateSet, DiffResult, diff, diff_all};
pub use geometry::Size;
pub use group::{TransitionGroup, TransitionStats};
pub use hooks::{Compose, HookSet, TransitionHost};
pub use in_flight::{InFlight, Phase};
pub use snapshot::Snapshot;

/// Bounds every key of a transition group must satisfy.
///
/// Blanket-implemented; never implement it by hand.
pub trait TransitionKey: Clone + Eq + Hash + fmt::Debug + 'static {}

impl<T> TransitionKey for T where T: Clone + Eq + Hash + fmt::Debug + 'static {}
