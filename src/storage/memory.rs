//! In-memory storage backend.
//!
//! Provides [`InMemoryStorage`], a thread-safe map with the same semantics
//! as a browser's local storage: an optional byte quota and a switch that
//! makes the store unavailable. Ideal for unit tests and for sharing one
//! store between several [`crate::store::ShopStore`] handles via `Arc`.

use std::collections::HashMap;
use std::sync::Mutex;

use super::{KeyValueStorage, ListenerRegistry, StorageEvent, StorageListener, SubscriptionId};
use crate::error::{BookWithMeError, Result};

/// Thread-safe in-memory key/value storage.
///
/// # Example
///
/// ```rust
/// use bookwithme_rs::storage::{InMemoryStorage, KeyValueStorage};
///
/// let storage = InMemoryStorage::new();
/// storage.set("greeting", "hallo").unwrap();
/// assert_eq!(storage.get("greeting").unwrap().as_deref(), Some("hallo"));
/// ```
#[derive(Debug, Default)]
pub struct InMemoryStorage {
    /// Entries and limits behind a single mutex.
    inner: Mutex<Inner>,
    /// Change listeners.
    listeners: ListenerRegistry,
}

/// Inner mutable state.
#[derive(Debug, Default)]
struct Inner {
    /// Stored values by key.
    entries: HashMap<String, String>,
    /// Maximum total size of keys plus values, in bytes.
    quota: Option<usize>,
    /// When `true`, every operation fails with `StorageUnavailable`.
    unavailable: bool,
}

impl Inner {
    /// Total bytes held if `key` were set to a value of `value_len` bytes.
    fn size_after_set(&self, key: &str, value_len: usize) -> usize {
        let current: usize = self
            .entries
            .iter()
            .filter(|&(existing, _)| existing != key)
            .map(|(existing, value)| existing.len() + value.len())
            .sum();
        current + key.len() + value_len
    }

    /// Fails if the storage has been switched off.
    fn ensure_available(&self) -> Result<()> {
        if self.unavailable {
            Err(BookWithMeError::StorageUnavailable)
        } else {
            Ok(())
        }
    }
}

impl InMemoryStorage {
    /// Creates a new empty storage without a quota.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty storage that rejects writes once keys plus values
    /// would exceed `bytes`.
    #[inline]
    #[must_use]
    pub fn with_quota(bytes: usize) -> Self {
        let storage = Self::default();
        if let Ok(mut inner) = storage.inner.lock() {
            inner.quota = Some(bytes);
        }
        storage
    }

    /// Switches the storage on or off. While off, reads and writes fail
    /// with [`BookWithMeError::StorageUnavailable`]; stored data is kept.
    ///
    /// # Errors
    ///
    /// Returns an error if the internal lock is poisoned.
    #[inline]
    pub fn set_available(&self, available: bool) -> Result<()> {
        self.with_lock(|inner| inner.unavailable = !available)
    }

    /// Returns the number of stored keys.
    ///
    /// # Errors
    ///
    /// Returns an error if the internal lock is poisoned.
    #[inline]
    pub fn len(&self) -> Result<usize> {
        self.with_lock(|inner| inner.entries.len())
    }

    /// Returns `true` if no keys are stored.
    ///
    /// # Errors
    ///
    /// Returns an error if the internal lock is poisoned.
    #[inline]
    pub fn is_empty(&self) -> Result<bool> {
        self.with_lock(|inner| inner.entries.is_empty())
    }

    /// Acquires the inner lock and applies a closure.
    fn with_lock<R, F: FnOnce(&mut Inner) -> R>(&self, op: F) -> Result<R> {
        let mut inner = self.inner.lock().map_err(|err| lock_error(&err))?;
        Ok(op(&mut inner))
    }
}

/// Wraps a mutex poison error.
fn lock_error<T>(err: &std::sync::PoisonError<T>) -> BookWithMeError {
    BookWithMeError::Storage(err.to_string().into())
}

impl KeyValueStorage for InMemoryStorage {
    #[inline]
    fn get(&self, key: &str) -> Result<Option<String>> {
        self.with_lock(|inner| -> Result<Option<String>> {
            inner.ensure_available()?;
            Ok(inner.entries.get(key).cloned())
        })?
    }

    #[inline]
    fn set(&self, key: &str, value: &str) -> Result<()> {
        let changed = self.with_lock(|inner| -> Result<bool> {
            inner.ensure_available()?;
            if let Some(quota) = inner.quota {
                let needed = inner.size_after_set(key, value.len());
                if needed > quota {
                    return Err(BookWithMeError::QuotaExceeded {
                        key: key.to_owned(),
                        needed,
                        quota,
                    });
                }
            }
            let previous = inner.entries.insert(key.to_owned(), value.to_owned());
            Ok(previous.as_deref() != Some(value))
        })??;
        if changed {
            self.listeners.dispatch(&StorageEvent {
                key: key.to_owned(),
                new_value: Some(value.to_owned()),
            });
        }
        Ok(())
    }

    #[inline]
    fn remove(&self, key: &str) -> Result<()> {
        let removed = self.with_lock(|inner| -> Result<bool> {
            inner.ensure_available()?;
            Ok(inner.entries.remove(key).is_some())
        })??;
        if removed {
            self.listeners.dispatch(&StorageEvent {
                key: key.to_owned(),
                new_value: None,
            });
        }
        Ok(())
    }

    #[inline]
    fn subscribe(&self, listener: StorageListener) -> Result<SubscriptionId> {
        self.listeners.register(listener)
    }

    #[inline]
    fn unsubscribe(&self, id: SubscriptionId) -> Result<bool> {
        self.listeners.unregister(id)
    }
}
