//! Pluggable key/value storage backends.
//!
//! [`KeyValueStorage`] models a browser-style local store: string keys,
//! UTF-8 text values, whole-value writes, and change events delivered to
//! subscribed listeners. [`crate::store::ShopStore`] is generic over it, so
//! tests run against [`InMemoryStorage`] and the CLI against
//! [`FileStorage`].

#[cfg(feature = "storage-file")]
mod file;
mod listeners;
mod memory;

use std::sync::Arc;

use crate::error::Result;

#[cfg(feature = "storage-file")]
pub use file::FileStorage;
pub use memory::InMemoryStorage;

pub(crate) use listeners::ListenerRegistry;

/// A change to one key, as seen by subscribed listeners.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageEvent {
    /// Key that changed.
    pub key: String,
    /// Value after the change, or `None` if the key was removed.
    pub new_value: Option<String>,
}

/// Callback invoked for every [`StorageEvent`].
pub type StorageListener = Arc<dyn Fn(&StorageEvent) + Send + Sync>;

/// Handle returned by [`KeyValueStorage::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

impl SubscriptionId {
    /// Returns the raw numeric handle.
    #[inline]
    #[must_use]
    pub const fn into_inner(self) -> u64 {
        self.0
    }
}

/// Local key/value storage with change notification.
///
/// All methods take `&self`; implementations use interior mutability
/// (e.g. `Mutex`) for thread-safe mutation.
///
/// A failed [`set`](KeyValueStorage::set) must leave the previous value of
/// the key untouched. Listeners are invoked after the write has been
/// applied and outside any internal lock, so a listener may write back into
/// the same storage. Writes that do not change a value do not emit events.
pub trait KeyValueStorage: core::fmt::Debug + Send + Sync {
    /// Returns the value stored under `key`.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot be read.
    fn get(&self, key: &str) -> Result<Option<String>>;

    /// Stores `value` under `key`, replacing any previous value.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend is unavailable, the quota would be
    /// exceeded, or the write fails. The previous value is kept.
    fn set(&self, key: &str, value: &str) -> Result<()>;

    /// Removes `key`. Removing an absent key is not an error.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot be written.
    fn remove(&self, key: &str) -> Result<()>;

    /// Registers a listener for change events.
    ///
    /// # Errors
    ///
    /// Returns an error if the listener registry is poisoned.
    fn subscribe(&self, listener: StorageListener) -> Result<SubscriptionId>;

    /// Unregisters a listener. Returns `false` if the id was unknown.
    ///
    /// # Errors
    ///
    /// Returns an error if the listener registry is poisoned.
    fn unsubscribe(&self, id: SubscriptionId) -> Result<bool>;
}

impl<S: KeyValueStorage + ?Sized> KeyValueStorage for Arc<S> {
    #[inline]
    fn get(&self, key: &str) -> Result<Option<String>> {
        (**self).get(key)
    }

    #[inline]
    fn set(&self, key: &str, value: &str) -> Result<()> {
        (**self).set(key, value)
    }

    #[inline]
    fn remove(&self, key: &str) -> Result<()> {
        (**self).remove(key)
    }

    #[inline]
    fn subscribe(&self, listener: StorageListener) -> Result<SubscriptionId> {
        (**self).subscribe(listener)
    }

    #[inline]
    fn unsubscribe(&self, id: SubscriptionId) -> Result<bool> {
        (**self).unsubscribe(id)
    }
}
