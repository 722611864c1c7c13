//! A thread-safe in-memory storage for the currently served flags. [`CacheStore`] provides
//! lock-free access for readers (flag lookups) and serialized access for the single writer (the
//! refresh cycle).
use std::{collections::HashMap, sync::Arc, sync::Mutex};

use arc_swap::ArcSwap;
use chrono::{DateTime, Utc};

use crate::Flag;

/// An immutable view of all known flags at one point in time.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct CacheSnapshot {
    flags: HashMap<String, Flag>,
    refreshed_at: Option<DateTime<Utc>>,
}

impl CacheSnapshot {
    /// All flags of this snapshot, keyed by flag name.
    pub fn flags(&self) -> &HashMap<String, Flag> {
        &self.flags
    }

    /// Look up a single flag.
    pub fn get(&self, name: &str) -> Option<&Flag> {
        self.flags.get(name)
    }

    /// Time this snapshot was installed. `None` for the initial empty snapshot.
    pub fn refreshed_at(&self) -> Option<DateTime<Utc>> {
        self.refreshed_at
    }

    /// Number of flags in the snapshot.
    pub fn len(&self) -> usize {
        self.flags.len()
    }

    /// Returns `true` if the snapshot holds no flag.
    pub fn is_empty(&self) -> bool {
        self.flags.is_empty()
    }
}

/// `CacheStore` provides a thread-safe (`Sync`) storage for flags that allows concurrent access
/// for readers and writers.
///
/// The snapshot itself is always immutable and can only be replaced completely, so readers
/// observe either the old or the new snapshot, never a mix of both.
#[derive(Default)]
pub struct CacheStore {
    current: ArcSwap<CacheSnapshot>,
    // Serializes writers so that installation timestamps never go backwards.
    write_lock: Mutex<()>,
}

impl CacheStore {
    /// Create a new empty cache store.
    pub fn new() -> Self {
        CacheStore::default()
    }

    /// Get a flag from the currently installed snapshot.
    pub fn get(&self, name: &str) -> Option<Flag> {
        self.current.load().get(name).cloned()
    }

    /// Get the currently installed snapshot.
    pub fn snapshot(&self) -> Arc<CacheSnapshot> {
        self.current.load_full()
    }

    /// Time of the last successful refresh.
    pub fn refreshed_at(&self) -> Option<DateTime<Utc>> {
        self.current.load().refreshed_at
    }

    /// Install a new set of flags, returning the previously installed snapshot.
    pub fn replace(&self, flags: HashMap<String, Flag>) -> Arc<CacheSnapshot> {
        let (previous, _installed) = self.install(flags);
        previous
    }

    /// Install a new set of flags, returning the previous and the new snapshot.
    pub(crate) fn install(
        &self,
        flags: HashMap<String, Flag>,
    ) -> (Arc<CacheSnapshot>, Arc<CacheSnapshot>) {
        // A poisoned lock only means another writer panicked; the guarded data is `()`.
        let _guard = self
            .write_lock
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        let now = Utc::now();
        let refreshed_at = match self.current.load().refreshed_at {
            Some(previous) if previous > now => previous,
            _ => now,
        };

        let installed = Arc::new(CacheSnapshot {
            flags,
            refreshed_at: Some(refreshed_at),
        });
        let previous = self.current.swap(Arc::clone(&installed));
        (previous, installed)
    }
}
