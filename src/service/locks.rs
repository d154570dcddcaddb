use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// Async mutexes keyed by name. Holders of different keys never contend;
/// holders of the same key run one at a time. Entries are dropped once no
/// task holds or waits on them.
#[derive(Default)]
pub struct KeyedLocks {
    entries: DashMap<String, Arc<Mutex<()>>>,
}

pub struct KeyedGuard<'a> {
    locks: &'a KeyedLocks,
    key: String,
    guard: Option<OwnedMutexGuard<()>>,
}

impl KeyedLocks {
    pub async fn lock(&self, key: &str) -> KeyedGuard<'_> {
        let mutex = Arc::clone(self.entries.entry(key.to_string()).or_default().value());
        let guard = mutex.lock_owned().await;
        KeyedGuard {
            locks: self,
            key: key.to_string(),
            guard: Some(guard),
        }
    }

    /// Number of keys currently held or awaited.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Drop for KeyedGuard<'_> {
    fn drop(&mut self) {
        drop(self.guard.take());
        self.locks
            .entries
            .remove_if(&self.key, |_, mutex| Arc::strong_count(mutex) == 1);
    }
}

/// Per-database and per-user serialization for mutating operations.
#[derive(Default)]
pub struct LockRegistry {
    pub databases: KeyedLocks,
    pub users: KeyedLocks,
}
