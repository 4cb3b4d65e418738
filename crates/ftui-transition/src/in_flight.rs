#![forbid(unsafe_code)]

//! Per-key transition records.

use std::fmt;

use ahash::AHashMap;

use crate::TransitionKey;

/// Which half of the lifecycle a key is running.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    /// The enter hook has been invoked and has not completed yet.
    Entering,
    /// The leave hook has been invoked and has not completed yet.
    Leaving,
}

impl Phase {
    /// The phase an escape transition flips to.
    #[inline]
    pub const fn opposite(self) -> Self {
        match self {
            Self::Entering => Self::Leaving,
            Self::Leaving => Self::Entering,
        }
    }

    /// Stable lowercase name, used as a tracing field.
    #[inline]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Entering => "entering",
            Self::Leaving => "leaving",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The in-flight set: keys with a running enter or leave phase.
///
/// Idle keys have no record at all.
pub struct InFlight<K> {
    records: AHashMap<K, Phase>,
}

impl<K> InFlight<K> {
    /// Create an empty set.
    #[must_use]
    pub fn new() -> Self {
        Self {
            records: AHashMap::new(),
        }
    }

    /// Number of keys mid-transition.
    #[inline]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether no key is mid-transition.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Iterate over `(key, phase)` records. Order is unspecified.
    pub fn iter(&self) -> impl Iterator<Item = (&K, Phase)> {
        self.records.iter().map(|(key, phase)| (key, *phase))
    }
}

impl<K: TransitionKey> InFlight<K> {
    /// Whether `key` has a running phase.
    #[inline]
    pub fn contains(&self, key: &K) -> bool {
        self.records.contains_key(key)
    }

    /// The running phase of `key`, `None` when idle.
    #[inline]
    pub fn phase(&self, key: &K) -> Option<Phase> {
        self.records.get(key).copied()
    }

    /// Record `key` as running `phase`. Returns the replaced phase.
    pub(crate) fn begin(&mut self, key: K, phase: Phase) -> Option<Phase> {
        self.records.insert(key, phase)
    }

    /// Drop the record for `key`. Returns the phase it was running.
    pub(crate) fn end(&mut self, key: &K) -> Option<Phase> {
        self.records.remove(key)
    }
}

impl<K> Default for InFlight<K> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: fmt::Debug> fmt::Debug for InFlight<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.records.iter()).finish()
    }
}

impl<K: TransitionKey> FromIterator<(K, Phase)> for InFlight<K> {
    fn from_iter<I: IntoIterator<Item = (K, Phase)>>(iter: I) -> Self {
        Self {
            records: iter.into_iter().collect(),
        }
    }
}
