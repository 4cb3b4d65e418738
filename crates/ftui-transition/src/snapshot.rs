#![forbid(unsafe_code)]

//! Insertion-ordered keyed mappings.
//!
//! A [`Snapshot`] describes the desired contents of a transition group at one
//! instant. Iteration follows insertion order; that order is what the
//! differ uses to break ties between several candidates.
//!
//! # Invariants
//!
//! 1. Keys are unique. Re-inserting a key replaces its item in place and
//!    keeps its original position.
//! 2. [`Snapshot::remove`] preserves the relative order of the remaining keys.
//! 3. [`Snapshot::merge`] is an additive union: it never drops a key.

use std::fmt;

use ahash::RandomState;
use indexmap::IndexMap;

use crate::TransitionKey;

/// Ordered mapping from key to item.
pub struct Snapshot<K, V> {
    entries: IndexMap<K, V, RandomState>,
}

impl<K, V> Snapshot<K, V> {
    /// Create an empty snapshot.
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: IndexMap::with_hasher(RandomState::new()),
        }
    }

    /// Create an empty snapshot with room for `capacity` entries.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: IndexMap::with_capacity_and_hasher(capacity, RandomState::new()),
        }
    }

    /// Number of entries.
    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the snapshot has no entries.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Keys in iteration order.
    pub fn keys(&self) -> impl Iterator<Item = &K> {
        self.entries.keys()
    }

    /// Items in iteration order.
    pub fn values(&self) -> impl Iterator<Item = &V> {
        self.entries.values()
    }

    /// Entries in iteration order.
    pub fn iter(&self) -> impl Iterator<Item = (&K, &V)> {
        self.entries.iter()
    }

    /// First entry in iteration order.
    pub fn first(&self) -> Option<(&K, &V)> {
        self.entries.first()
    }
}

impl<K: TransitionKey, V> Snapshot<K, V> {
    /// Insert or replace an item. Returns the previous item for `key`.
    pub fn insert(&mut self, key: K, item: V) -> Option<V> {
        self.entries.insert(key, item)
    }

    /// Builder-style [`insert`](Self::insert).
    #[must_use]
    pub fn with(mut self, key: K, item: V) -> Self {
        self.insert(key, item);
        self
    }

    /// Remove a key, keeping the order of the rest.
    pub fn remove(&mut self, key: &K) -> Option<V> {
        self.entries.shift_remove(key)
    }

    /// Look up the item for `key`.
    pub fn get(&self, key: &K) -> Option<&V> {
        self.entries.get(key)
    }

    /// Whether `key` is present.
    pub fn contains_key(&self, key: &K) -> bool {
        self.entries.contains_key(key)
    }

    /// Position of `key` in iteration order.
    pub fn position(&self, key: &K) -> Option<usize> {
        self.entries.get_index_of(key)
    }

    /// Union `other` into `self`.
    ///
    /// Keys already present keep their position and take `other`'s item;
    /// keys new to `self` are appended in `other`'s order.
    pub fn merge(&mut self, other: Snapshot<K, V>) {
        self.entries.reserve(other.len());
        for (key, item) in other.entries {
            self.entries.insert(key, item);
        }
    }

    /// Copy of the key set with the items stripped.
    #[must_use]
    pub fn key_snapshot(&self) -> Snapshot<K, ()> {
        self.keys().map(|key| (key.clone(), ())).collect()
    }

    /// Keys of `self` absent from `other`, in `self`'s order.
    pub fn keys_missing_from<'a, W>(
        &'a self,
        other: &'a Snapshot<K, W>,
    ) -> impl Iterator<Item = &'a K> + 'a {
        self.keys().filter(move |key| !other.contains_key(key))
    }
}

impl<K, V> Default for Snapshot<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: Clone, V: Clone> Clone for Snapshot<K, V> {
    fn clone(&self) -> Self {
        Self {
            entries: self.entries.clone(),
        }
    }
}

impl<K: fmt::Debug, V: fmt::Debug> fmt::Debug for Snapshot<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.entries.iter()).finish()
    }
}

/// Equality is by membership and items; order is ignored.
impl<K: TransitionKey, V: PartialEq> PartialEq for Snapshot<K, V> {
    fn eq(&self, other: &Self) -> bool {
        self.entries == other.entries
    }
}

impl<K: TransitionKey, V: Eq> Eq for Snapshot<K, V> {}

impl<K: TransitionKey, V> FromIterator<(K, V)> for Snapshot<K, V> {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let iter = iter.into_iter();
        let mut snapshot = Self::with_capacity(iter.size_hint().0);
        for (key, item) in iter {
            snapshot.insert(key, item);
        }
        snapshot
    }
}

impl<K: TransitionKey, V> Extend<(K, V)> for Snapshot<K, V> {
    fn extend<I: IntoIterator<Item = (K, V)>>(&mut self, iter: I) {
        for (key, item) in iter {
            self.insert(key, item);
        }
    }
}

impl<K, V> IntoIterator for Snapshot<K, V> {
    type Item = (K, V);
    type IntoIter = indexmap::map::IntoIter<K, V>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

impl<'a, K, V> IntoIterator for &'a Snapshot<K, V> {
    type Item = (&'a K, &'a V);
    type IntoIter = indexmap::map::Iter<'a, K, V>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
