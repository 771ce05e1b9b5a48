//! In-process key sets: entry locks and active cache ids
//!
//! Both are plain sets of held keys. An entry lock is acquired by polling
//! [`EntryLocks::try_enter`] with a fixed delay between attempts; the guard
//! clears the key on drop, so release happens on every exit path including
//! task cancellation. Locks are never nested.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tracing::trace;

/// Default delay between entry lock attempts
pub const DEFAULT_LOCK_RETRY: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, Default)]
struct KeySet {
    keys: Arc<Mutex<HashSet<String>>>,
}

impl KeySet {
    fn keys(&self) -> MutexGuard<'_, HashSet<String>> {
        self.keys.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn try_insert(&self, key: &str) -> bool {
        self.keys().insert(key.to_string())
    }

    fn remove(&self, key: &str) {
        self.keys().remove(key);
    }

    fn contains(&self, key: &str) -> bool {
        self.keys().contains(key)
    }

    fn len(&self) -> usize {
        self.keys().len()
    }
}

/// Marker for a held key; the key is cleared when this is dropped
#[derive(Debug)]
pub struct KeyGuard {
    set: KeySet,
    key: String,
}

impl KeyGuard {
    /// The key this guard holds
    pub fn key(&self) -> &str {
        &self.key
    }
}

impl Drop for KeyGuard {
    fn drop(&mut self) {
        self.set.remove(&self.key);
    }
}

/// Per-content-key advisory locks
#[derive(Debug, Clone)]
pub struct EntryLocks {
    held: KeySet,
    retry: Duration,
}

impl EntryLocks {
    /// Create a lock set polling every `retry`
    pub fn new(retry: Duration) -> Self {
        Self {
            held: KeySet::default(),
            retry,
        }
    }

    /// Mark `key` held if it is free
    pub fn try_enter(&self, key: &str) -> bool {
        self.held.try_insert(key)
    }

    /// Clear `key`; harmless if it is not held
    pub fn exit(&self, key: &str) {
        self.held.remove(key);
    }

    /// Whether `key` is currently held
    pub fn is_held(&self, key: &str) -> bool {
        self.held.contains(key)
    }

    /// Wait until `key` is free and take it
    ///
    /// Never blocks a thread: while the key is held the task sleeps for the
    /// retry delay and tries again. There is no fairness guarantee.
    pub async fn acquire(&self, key: &str) -> KeyGuard {
        loop {
            if let Some(guard) = self.try_acquire(key) {
                return guard;
            }
            trace!(key = %key, "Entry locked, retrying");
            tokio::time::sleep(self.retry).await;
        }
    }

    /// Take `key` without waiting
    pub fn try_acquire(&self, key: &str) -> Option<KeyGuard> {
        self.try_enter(key).then(|| KeyGuard {
            set: self.held.clone(),
            key: key.to_string(),
        })
    }
}

impl Default for EntryLocks {
    fn default() -> Self {
        Self::new(DEFAULT_LOCK_RETRY)
    }
}

/// Cache ids currently being orchestrated
#[derive(Debug, Clone, Default)]
pub struct ActiveKeys {
    active: KeySet,
}

impl ActiveKeys {
    /// Mark `logical_key` active, or `None` if it already is
    pub fn try_activate(&self, logical_key: &str) -> Option<KeyGuard> {
        self.active.try_insert(logical_key).then(|| KeyGuard {
            set: self.active.clone(),
            key: logical_key.to_string(),
        })
    }

    /// Whether `logical_key` is active
    pub fn is_active(&self, logical_key: &str) -> bool {
        self.active.contains(logical_key)
    }

    /// Number of active keys
    pub fn len(&self) -> usize {
        self.active.len()
    }

    /// Whether no key is active
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
