//! Per-document async locks.
//!
//! Writers to the same document id queue up; writers to different ids do
//! not block each other. Entries are dropped once nobody holds or waits on
//! them, so the map stays as small as the set of ids in flight.

use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

type Slot = Arc<Mutex<()>>;

/// A set of async mutexes keyed by document id.
#[derive(Debug, Clone, Default)]
pub struct KeyedLocks {
    slots: Arc<DashMap<String, Slot>>,
}

impl KeyedLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to `key`.
    pub async fn lock(&self, key: &str) -> KeyGuard {
        let slot = self
            .slots
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        let guard = slot.lock_owned().await;
        KeyGuard {
            slots: Arc::clone(&self.slots),
            key: key.to_string(),
            guard: Some(guard),
        }
    }

    /// Number of ids currently locked or waited on.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

/// Exclusive access to one key, released on drop.
#[derive(Debug)]
pub struct KeyGuard {
    slots: Arc<DashMap<String, Slot>>,
    key: String,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for KeyGuard {
    fn drop(&mut self) {
        // Release first so the count below only sees the map and waiters.
        drop(self.guard.take());
        self.slots
            .remove_if(&self.key, |_, slot| Arc::strong_count(slot) == 1);
    }
}
