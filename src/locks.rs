//! Per-key mutual exclusion for writers.
//!
//! Two ingests that touch the same document (same content hash or same
//! normalised path) must not interleave their delete and put. Callers
//! acquire every key they touch; keys are locked in sorted order so two
//! writers with overlapping key sets cannot deadlock. Dropping the guard
//! releases the keys on every exit path, and idle entries are pruned.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

type Slots = Arc<Mutex<HashMap<String, Arc<AsyncMutex<()>>>>>;

#[derive(Default, Clone)]
pub struct KeyedLocks {
    slots: Slots,
}

/// Holds a set of keys until dropped.
pub struct KeyGuard {
    slots: Slots,
    held: Vec<(String, OwnedMutexGuard<()>)>,
}

impl KeyedLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Lock every key in `keys`, waiting for current holders.
    pub async fn acquire<I, K>(&self, keys: I) -> KeyGuard
    where
        I: IntoIterator<Item = K>,
        K: Into<String>,
    {
        let mut keys: Vec<String> = keys.into_iter().map(Into::into).collect();
        keys.sort();
        keys.dedup();

        let mut held = Vec::with_capacity(keys.len());
        for key in keys {
            let slot = {
                let mut slots = self.slots.lock().unwrap_or_else(|p| p.into_inner());
                Arc::clone(slots.entry(key.clone()).or_default())
            };
            let guard = slot.lock_owned().await;
            held.push((key, guard));
        }

        KeyGuard {
            slots: Arc::clone(&self.slots),
            held,
        }
    }

    /// Number of keys currently tracked (held or awaited).
    pub fn tracked(&self) -> usize {
        self.slots.lock().unwrap_or_else(|p| p.into_inner()).len()
    }
}

impl Drop for KeyGuard {
    fn drop(&mut self) {
        let held = std::mem::take(&mut self.held);
        let mut slots = self.slots.lock().unwrap_or_else(|p| p.into_inner());
        for (key, guard) in held {
            drop(guard);
            // Only the map still references the slot: nobody holds or awaits it.
            if slots.get(&key).is_some_and(|slot| Arc::strong_count(slot) == 1) {
                slots.remove(&key);
            }
        }
    }
}
