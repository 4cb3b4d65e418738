#![forbid(unsafe_code)]

//! Mapping differ: which keys start entering or leaving in a cycle.
//!
//! Compares a previous key set against the incoming snapshot. The group
//! passes its retained set as `previous`, so a key still shown from an
//! earlier cycle counts as present:
//! - a key in `incoming` but not in `previous` is an entering candidate,
//! - a key in `previous` but not in `incoming` is a leaving candidate,
//! - a key with a running phase is never a candidate; only its completion
//!   may change what it does next.
//!
//! [`diff`] picks the first qualifying key of each kind in the respective
//! snapshot's iteration order. When several keys change at once the others
//! are not selected in that cycle. [`diff_all`] returns every qualifying key
//! for hosts that opt into [`CandidatePolicy::All`](crate::CandidatePolicy).
//!
//! Both functions are pure. An empty result is a normal outcome.

use crate::TransitionKey;
use crate::in_flight::InFlight;
use crate::snapshot::Snapshot;

/// At most one entering and one leaving candidate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiffResult<K> {
    /// First key new in `incoming` that is not in flight.
    pub entering: Option<K>,
    /// First key gone from `incoming` that is not in flight.
    pub leaving: Option<K>,
}

impl<K> DiffResult<K> {
    /// Whether neither candidate exists.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entering.is_none() && self.leaving.is_none()
    }
}

impl<K> Default for DiffResult<K> {
    fn default() -> Self {
        Self {
            entering: None,
            leaving: None,
        }
    }
}

/// Every entering and leaving candidate, in iteration order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidateSet<K> {
    /// Keys new in `incoming`, in `incoming` order.
    pub entering: Vec<K>,
    /// Keys gone from `incoming`, in `previous` order.
    pub leaving: Vec<K>,
}

impl<K> CandidateSet<K> {
    /// Create an empty set.
    #[must_use]
    pub fn new() -> Self {
        Self {
            entering: Vec::new(),
            leaving: Vec::new(),
        }
    }

    /// Whether there is nothing to start.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entering.is_empty() && self.leaving.is_empty()
    }

    /// Reduce to the first candidate of each kind.
    #[must_use]
    pub fn first_only(mut self) -> Self {
        self.entering.truncate(1);
        self.leaving.truncate(1);
        self
    }
}

impl<K> Default for CandidateSet<K> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K> From<DiffResult<K>> for CandidateSet<K> {
    fn from(result: DiffResult<K>) -> Self {
        Self {
            entering: result.entering.into_iter().collect(),
            leaving: result.leaving.into_iter().collect(),
        }
    }
}

/// First entering and first leaving candidate.
pub fn diff<K, A, B>(
    previous: &Snapshot<K, A>,
    incoming: &Snapshot<K, B>,
    in_flight: &InFlight<K>,
) -> DiffResult<K>
where
    K: TransitionKey,
{
    DiffResult {
        entering: incoming
            .keys_missing_from(previous)
            .find(|key| !in_flight.contains(key))
            .cloned(),
        leaving: previous
            .keys_missing_from(incoming)
            .find(|key| !in_flight.contains(key))
            .cloned(),
    }
}

/// Every entering and leaving candidate.
pub fn diff_all<K, A, B>(
    previous: &Snapshot<K, A>,
    incoming: &Snapshot<K, B>,
    in_flight: &InFlight<K>,
) -> CandidateSet<K>
where
    K: TransitionKey,
{
    CandidateSet {
        entering: incoming
            .keys_missing_from(previous)
            .filter(|key| !in_flight.contains(key))
            .cloned()
            .collect(),
        leaving: previous
            .keys_missing_from(incoming)
            .filter(|key| !in_flight.contains(key))
            .cloned()
            .collect(),
    }
}
