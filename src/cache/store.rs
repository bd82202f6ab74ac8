//! Cache Store Module
//!
//! Key to encoded-buffer map. One exclusive lock serializes every lookup and
//! mutation, so a reader never sees a partially written entry.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use tracing::{debug, info};

use crate::cache::{CacheEntry, CacheStats};
use crate::codec::SerializedBuffer;
use crate::error::{CacheError, Result};
use crate::shape::Descriptor;

#[derive(Debug, Default)]
struct Table {
    entries: HashMap<String, CacheEntry>,
    stats: CacheStats,
}

#[derive(Debug)]
enum StoreState {
    Uninitialized,
    Ready(Table),
}

// == Cache Store ==
/// Store of encoded values, created `Uninitialized` until `init`.
#[derive(Debug)]
pub struct CacheStore {
    state: Mutex<StoreState>,
    initial_capacity: usize,
}

impl CacheStore {
    // == Constructor ==
    /// Creates an uninitialized store.
    ///
    /// # Arguments
    /// * `initial_capacity` - Capacity the map is allocated with on `init`
    pub fn new(initial_capacity: usize) -> Self {
        Self {
            state: Mutex::new(StoreState::Uninitialized),
            initial_capacity,
        }
    }

    // == Init ==
    /// Allocates the backing map. Calling it again keeps existing entries.
    pub fn init(&self) {
        let mut state = self.lock();
        if let StoreState::Uninitialized = *state {
            *state = StoreState::Ready(Table {
                entries: HashMap::with_capacity(self.initial_capacity),
                stats: CacheStats::new(),
            });
            info!(capacity = self.initial_capacity, "cache store initialized");
        }
    }

    pub fn is_ready(&self) -> bool {
        matches!(*self.lock(), StoreState::Ready(_))
    }

    // == Insert ==
    /// Stores `buffer` under `key`, replacing any prior entry.
    ///
    /// The buffer is already fully owned here, so the swap is the commit.
    pub fn insert(
        &self,
        key: impl Into<String>,
        buffer: SerializedBuffer,
        descriptor: Descriptor,
    ) -> Result<()> {
        let key = key.into();
        let mut state = self.lock();
        let table = ready(&mut state)?;

        let len = buffer.len();
        let previous = table
            .entries
            .insert(key.clone(), CacheEntry::new(buffer, descriptor));
        table
            .stats
            .record_insert(len, previous.as_ref().map(CacheEntry::len));

        if let Some(previous) = previous {
            previous.buffer.release();
        }
        debug!(key = %key, len, %descriptor, "inserted");
        Ok(())
    }

    // == Get ==
    /// Returns a fresh copy of the stored buffer and its descriptor.
    pub fn get(&self, key: &str) -> Result<(SerializedBuffer, Descriptor)> {
        let mut state = self.lock();
        let table = ready(&mut state)?;

        match table.entries.get(key) {
            Some(entry) => {
                let checkout = entry.checkout();
                table.stats.record_hit();
                Ok(checkout)
            }
            None => {
                table.stats.record_miss();
                Err(CacheError::KeyNotFound(key.to_string()))
            }
        }
    }

    // == Remove ==
    /// Removes an entry by key.
    pub fn remove(&self, key: &str) -> Result<()> {
        let mut state = self.lock();
        let table = ready(&mut state)?;

        let entry = table
            .entries
            .remove(key)
            .ok_or_else(|| CacheError::KeyNotFound(key.to_string()))?;
        table.stats.record_removal(entry.len());
        entry.buffer.release();
        debug!(key, "removed");
        Ok(())
    }

    /// Whether `key` has an entry.
    pub fn contains(&self, key: &str) -> Result<bool> {
        let mut state = self.lock();
        Ok(ready(&mut state)?.entries.contains_key(key))
    }

    // == Stats ==
    /// Returns current statistics; all zero before `init`.
    pub fn stats(&self) -> CacheStats {
        match &*self.lock() {
            StoreState::Ready(table) => table.stats.clone(),
            StoreState::Uninitialized => CacheStats::new(),
        }
    }

    /// Returns the current number of entries.
    pub fn len(&self) -> usize {
        match &*self.lock() {
            StoreState::Ready(table) => table.entries.len(),
            StoreState::Uninitialized => 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> MutexGuard<'_, StoreState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

fn ready(state: &mut StoreState) -> Result<&mut Table> {
    match state {
        StoreState::Ready(table) => Ok(table),
        StoreState::Uninitialized => Err(CacheError::NotReady),
    }
}
