//! Keyed async mutexes serializing work on one record (or one type's id space).

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// Entries are pruned once the map grows past this many keys.
const PRUNE_THRESHOLD: usize = 256;

#[derive(Debug, Default)]
pub struct RecordLocks {
    slots: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

impl RecordLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serialize writes to one `(type, id)`.
    pub async fn record(&self, record_type: &str, id: &str) -> OwnedMutexGuard<()> {
        self.acquire(format!("{record_type}/{id}")).await
    }

    /// Serialize id assignment within one type.
    pub async fn type_scope(&self, record_type: &str) -> OwnedMutexGuard<()> {
        self.acquire(format!("{record_type}/*")).await
    }

    async fn acquire(&self, key: String) -> OwnedMutexGuard<()> {
        let slot = {
            let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
            if slots.len() > PRUNE_THRESHOLD {
                // only this map holds an idle slot
                slots.retain(|_, slot| Arc::strong_count(slot) > 1);
            }
            Arc::clone(slots.entry(key).or_default())
        };
        slot.lock_owned().await
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}
