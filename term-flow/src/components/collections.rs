//! Size-capped collections for per-value component state.
//!
//! Analyzers keyed by observed values (distinct values, categories) would grow
//! with the data. They take their maps from the [`BoundedCollectionFactory`]
//! of their context instead: keys beyond the cap are not stored, only the
//! weighted rows that could not be recorded are counted.

use dashmap::DashMap;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

/// Hands out [`BoundedMap`]s sharing one entry cap.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BoundedCollectionFactory {
    max_entries: usize,
}

impl Default for BoundedCollectionFactory {
    fn default() -> Self {
        Self::new(10_000)
    }
}

impl BoundedCollectionFactory {
    pub fn new(max_entries: usize) -> Self {
        Self { max_entries }
    }

    pub fn max_entries(&self) -> usize {
        self.max_entries
    }

    pub fn create_map<V>(&self) -> BoundedMap<V> {
        BoundedMap {
            entries: DashMap::new(),
            reserved: AtomicUsize::new(0),
            overflow: AtomicU64::new(0),
            max_entries: self.max_entries,
        }
    }
}

/// A concurrent string-keyed map holding at most `max_entries` keys.
#[derive(Debug)]
pub struct BoundedMap<V> {
    entries: DashMap<String, V>,
    reserved: AtomicUsize,
    overflow: AtomicU64,
    max_entries: usize,
}

impl<V> BoundedMap<V> {
    /// Applies `update` to the entry of `key`, creating it with `init` first
    /// when the key is new and the map has room.
    ///
    /// Returns `false`, and adds `weight` to the overflow count, when the key
    /// is new and the map is full.
    pub fn upsert(&self, key: &str, weight: u64, init: impl FnOnce() -> V, update: impl FnOnce(&mut V)) -> bool {
        if let Some(mut existing) = self.entries.get_mut(key) {
            update(existing.value_mut());
            return true;
        }
        let reserved = self
            .reserved
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| (n < self.max_entries).then_some(n + 1));
        if reserved.is_err() {
            self.overflow.fetch_add(weight, Ordering::Relaxed);
            return false;
        }
        let mut created = false;
        let mut entry = self.entries.entry(key.to_string()).or_insert_with(|| {
            created = true;
            init()
        });
        if !created {
            // inserted concurrently under another reservation
            self.reserved.fetch_sub(1, Ordering::AcqRel);
        }
        update(entry.value_mut());
        true
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.reserved.load(Ordering::Acquire) >= self.max_entries
    }

    /// Weighted rows whose key was rejected because the map was full.
    pub fn overflow_count(&self) -> u64 {
        self.overflow.load(Ordering::Relaxed)
    }

    /// Copies the entries out, ordered by key.
    pub fn snapshot<T>(&self, f: impl Fn(&V) -> T) -> BTreeMap<String, T> {
        self.entries
            .iter()
            .map(|e| (e.key().clone(), f(e.value())))
            .collect()
    }
}
