//! Sparse, index-ordered containers backing a run's output.
//!
//! A missing index in a [`ResultCollection`] means the value was lost with a
//! failed batch, never that it was empty.

use std::collections::btree_map;
use std::collections::BTreeMap;
use std::ops::Range;

use serde::{Deserialize, Serialize, Serializer};

use crate::error::EngineError;
use crate::push::error::PushError;

/// Sparse map from logical index to value, iterated in index order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IndexedCollection<V> {
    items: BTreeMap<usize, V>,
}

/// Per-item results of a run, keyed by global index.
pub type ResultCollection<R> = IndexedCollection<R>;

impl<V> Default for IndexedCollection<V> {
    fn default() -> Self {
        Self {
            items: BTreeMap::new(),
        }
    }
}

impl<V> IndexedCollection<V> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Value at `index`, or `None` if unset.
    pub fn get(&self, index: usize) -> Option<&V> {
        self.items.get(&index)
    }

    /// Store `value` at `index`, returning whatever was there before.
    pub fn set(&mut self, index: usize, value: V) -> Option<V> {
        self.items.insert(index, value)
    }

    /// Append after the highest occupied index (or at `0` when empty) and
    /// return the index used.
    pub fn push(&mut self, value: V) -> usize {
        let index = self.next_index();
        self.items.insert(index, value);
        index
    }

    pub fn contains(&self, index: usize) -> bool {
        self.items.contains_key(&index)
    }

    /// Number of present entries.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Present entries in ascending index order.
    pub fn iter(&self) -> impl Iterator<Item = (usize, &V)> + '_ {
        self.items.iter().map(|(i, v)| (*i, v))
    }

    pub fn values(&self) -> impl Iterator<Item = &V> + '_ {
        self.items.values()
    }

    pub fn indices(&self) -> impl Iterator<Item = usize> + '_ {
        self.items.keys().copied()
    }

    /// Contiguous ranges below `total` that hold no value.
    pub fn missing_ranges(&self, total: usize) -> Vec<Range<usize>> {
        let mut gaps = Vec::new();
        let mut cursor = 0;
        for index in self.items.range(..total).map(|(i, _)| *i) {
            if index > cursor {
                gaps.push(cursor..index);
            }
            cursor = index + 1;
        }
        if cursor < total {
            gaps.push(cursor..total);
        }
        gaps
    }

    /// Index-disjoint union. Fails without modifying `self` if any index of
    /// `other` is already occupied.
    pub fn merge(&mut self, other: Self) -> Result<(), EngineError> {
        if let Some(index) = other.indices().find(|i| self.contains(*i)) {
            return Err(EngineError::OverlappingIndex { index });
        }
        self.items.extend(other.items);
        Ok(())
    }

    fn next_index(&self) -> usize {
        self.items.keys().next_back().map_or(0, |last| last + 1)
    }
}

impl<V> IntoIterator for IndexedCollection<V> {
    type Item = (usize, V);
    type IntoIter = btree_map::IntoIter<usize, V>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.into_iter()
    }
}

impl<V> FromIterator<(usize, V)> for IndexedCollection<V> {
    fn from_iter<I: IntoIterator<Item = (usize, V)>>(iter: I) -> Self {
        Self {
            items: iter.into_iter().collect(),
        }
    }
}

/// Ordered log of batch-level failures.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ErrorLog {
    entries: IndexedCollection<PushError>,
}

impl ErrorLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, error: PushError) -> usize {
        self.entries.push(error)
    }

    pub fn get(&self, position: usize) -> Option<&PushError> {
        self.entries.get(position)
    }

    pub fn set(&mut self, position: usize, error: PushError) -> Option<PushError> {
        self.entries.set(position, error)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &PushError> + '_ {
        self.entries.values()
    }

    /// Entries whose index range includes the logical `index`.
    pub fn covering(&self, index: usize) -> impl Iterator<Item = &PushError> + '_ {
        self.iter().filter(move |e| e.covers(index))
    }

    /// Append every entry of `other` after this log's entries, keeping
    /// `other`'s order.
    pub fn merge(&mut self, other: ErrorLog) {
        for (_, error) in other.entries {
            self.entries.push(error);
        }
    }
}

impl Serialize for ErrorLog {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(self.iter())
    }
}

impl FromIterator<PushError> for ErrorLog {
    fn from_iter<I: IntoIterator<Item = PushError>>(iter: I) -> Self {
        let mut log = Self::new();
        for error in iter {
            log.push(error);
        }
        log
    }
}
