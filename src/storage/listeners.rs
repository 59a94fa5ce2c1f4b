//! Listener bookkeeping shared by the storage backends.

use std::sync::{Arc, Mutex};

use super::{StorageEvent, StorageListener, SubscriptionId};
use crate::error::{BookWithMeError, Result};

/// Registered change listeners, in subscription order.
#[derive(Default)]
pub(crate) struct ListenerRegistry {
    /// Id counter plus the registered listeners.
    inner: Mutex<Registered>,
}

/// State behind the registry mutex.
#[derive(Default)]
struct Registered {
    /// Next id to hand out.
    next_id: u64,
    /// Active listeners.
    listeners: Vec<(SubscriptionId, StorageListener)>,
}

impl ListenerRegistry {
    /// Adds a listener and returns its handle.
    pub(crate) fn register(&self, listener: StorageListener) -> Result<SubscriptionId> {
        let mut inner = self.inner.lock().map_err(|err| poison_error(&err))?;
        let id = SubscriptionId(inner.next_id);
        inner.next_id = inner.next_id.wrapping_add(1);
        inner.listeners.push((id, listener));
        Ok(id)
    }

    /// Removes a listener. Returns `false` if it was not registered.
    pub(crate) fn unregister(&self, id: SubscriptionId) -> Result<bool> {
        let mut inner = self.inner.lock().map_err(|err| poison_error(&err))?;
        let before = inner.listeners.len();
        inner.listeners.retain(|&(registered, _)| registered != id);
        Ok(inner.listeners.len() != before)
    }

    /// Invokes every listener with `event`.
    ///
    /// The listener list is snapshotted first and the lock released, so
    /// listeners may subscribe, unsubscribe, or write to the storage.
    pub(crate) fn dispatch(&self, event: &StorageEvent) {
        let snapshot: Vec<StorageListener> = match self.inner.lock() {
            Ok(inner) => inner
                .listeners
                .iter()
                .map(|(_, listener)| Arc::clone(listener))
                .collect(),
            Err(err) => {
                tracing::warn!(error = %err, key = %event.key, "listener registry poisoned, dropping event");
                return;
            }
        };
        tracing::trace!(key = %event.key, listeners = snapshot.len(), "dispatching storage event");
        for listener in snapshot {
            listener(event);
        }
    }
}

impl core::fmt::Debug for ListenerRegistry {
    #[inline]
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let count = self.inner.lock().map_or(0, |inner| inner.listeners.len());
        f.debug_struct("ListenerRegistry")
            .field("listeners", &count)
            .finish()
    }
}

/// Wraps a mutex poison error into a [`BookWithMeError::Storage`].
fn poison_error<T>(err: &std::sync::PoisonError<T>) -> BookWithMeError {
    BookWithMeError::Storage(err.to_string().into())
}
