//! Versioned snapshot store.
//!
//! Holds the currently published artifact behind an `Arc`. Readers clone the
//! `Arc` under a short read lock and keep using it for the whole request;
//! `publish` swaps the pointer under a short write lock. Builders never hold
//! the lock while working, so a rebuild does not block queries.

use std::sync::{Arc, PoisonError, RwLock};

use crate::models::{CacheSnapshot, WordStats};

/// Store for the neighbor cache
pub type CacheStore = SnapshotStore<CacheSnapshot>;

/// Store for the word statistics artifact
pub type WordStatsStore = SnapshotStore<WordStats>;

#[derive(Debug)]
pub struct SnapshotStore<T> {
    slot: RwLock<Option<Published<T>>>,
    generation: RwLock<u64>,
}

#[derive(Debug)]
struct Published<T> {
    generation: u64,
    snapshot: Arc<T>,
}

impl<T> SnapshotStore<T> {
    /// An empty store: queries fall back to brute force until a publish.
    pub fn new() -> Self {
        SnapshotStore {
            slot: RwLock::new(None),
            generation: RwLock::new(0),
        }
    }

    /// A store with an initial snapshot already published as generation 1.
    pub fn with_snapshot(snapshot: T) -> Self {
        let store = Self::new();
        store.publish(snapshot);
        store
    }

    /// The published snapshot, if any.
    pub fn current(&self) -> Option<Arc<T>> {
        self.current_with_generation().map(|(_, snapshot)| snapshot)
    }

    /// The published snapshot together with the generation it was published as.
    pub fn current_with_generation(&self) -> Option<(u64, Arc<T>)> {
        let slot = self.slot.read().unwrap_or_else(PoisonError::into_inner);
        slot.as_ref()
            .map(|published| (published.generation, Arc::clone(&published.snapshot)))
    }

    /// Number of publishes so far. Zero when nothing was ever published.
    pub fn generation(&self) -> u64 {
        *self.generation.read().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn is_empty(&self) -> bool {
        self.slot
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_none()
    }

    /// Replace the published snapshot. Returns the new generation.
    pub fn publish(&self, snapshot: T) -> u64 {
        let snapshot = Arc::new(snapshot);
        let mut generation = self.generation.write().unwrap_or_else(PoisonError::into_inner);
        let mut slot = self.slot.write().unwrap_or_else(PoisonError::into_inner);
        *generation += 1;
        *slot = Some(Published {
            generation: *generation,
            snapshot,
        });
        *generation
    }

    /// Drop the published snapshot. Readers holding it are unaffected.
    pub fn clear(&self) {
        let mut slot = self.slot.write().unwrap_or_else(PoisonError::into_inner);
        *slot = None;
    }
}

impl<T> Default for SnapshotStore<T> {
    fn default() -> Self {
        Self::new()
    }
}
