//! File-based storage backend.
//!
//! Stores each key as a separate UTF-8 file under a configurable directory
//! (default: `$XDG_DATA_HOME/bookwithme/`).

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use super::{KeyValueStorage, ListenerRegistry, StorageEvent, StorageListener, SubscriptionId};
use crate::error::{BookWithMeError, Result};

/// Application name used for the XDG data directory.
const APP_NAME: &str = "bookwithme";

/// Sentinel file used for cross-process file locking.
const LOCK_FILE: &str = "storage.lock";

/// Suffix of in-flight writes.
const TMP_SUFFIX: &str = ".tmp";

/// Values last observed on disk, by key.
type Observed = HashMap<String, String>;

/// File-backed key/value storage.
///
/// Every key is a file named after the key; its content is the value.
/// Writes go to `<key>.tmp` first and are renamed into place, so a failed
/// write never truncates the previous value.
///
/// # Concurrency
///
/// Thread safety within a single process is provided by an in-process
/// [`Mutex`]. Cross-process safety is achieved via an advisory file lock
/// on `storage.lock` (shared for reads, exclusive for writes).
///
/// # Change events
///
/// Writes made through this instance notify its listeners immediately.
/// Writes made by other processes (or other instances on the same
/// directory) are picked up by [`FileStorage::poll`], which diffs the
/// directory against the values this instance last observed.
///
/// # File layout
///
/// ```text
/// <dir>/
///   storage.lock          (cross-process lock sentinel)
///   bwmShops              (JSON array of shop records)
///   bwmPing               (last change timestamp)
/// ```
#[derive(Debug)]
pub struct FileStorage {
    /// Root directory containing one file per key.
    dir: PathBuf,
    /// Serializes in-process access and holds the last observed values.
    observed: Mutex<Observed>,
    /// Sentinel file for cross-process advisory locking.
    lock_file: fs::File,
    /// Change listeners.
    listeners: ListenerRegistry,
}

impl FileStorage {
    /// Creates a file storage rooted at the given directory.
    ///
    /// Creates the directory (and parents) if it does not exist, opens the
    /// `storage.lock` sentinel, and records the current values so that
    /// [`FileStorage::poll`] only reports later changes.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created or read, or the
    /// lock file cannot be opened.
    #[inline]
    pub fn new(dir: PathBuf) -> Result<Self> {
        fs::create_dir_all(&dir).map_err(storage_io_error)?;
        let lock_file = fs::OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(dir.join(LOCK_FILE))
            .map_err(storage_io_error)?;
        let storage = Self {
            dir,
            observed: Mutex::new(Observed::new()),
            lock_file,
            listeners: ListenerRegistry::default(),
        };
        storage.with_shared_lock(|observed| {
            *observed = read_all(&storage.dir)?;
            Ok(())
        })?;
        Ok(storage)
    }

    /// Returns the default XDG-compliant data directory for this application.
    ///
    /// On Linux: `$XDG_DATA_HOME/bookwithme/` (typically
    /// `~/.local/share/bookwithme/`).
    ///
    /// # Errors
    ///
    /// Returns an error if the platform data directory cannot be determined.
    #[inline]
    pub fn default_dir() -> Result<PathBuf> {
        dirs::data_dir()
            .map(|data_path| data_path.join(APP_NAME))
            .ok_or_else(|| {
                BookWithMeError::Storage("could not determine platform data directory".into())
            })
    }

    /// Returns the storage directory.
    #[inline]
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Re-reads the directory and notifies listeners about every key whose
    /// value differs from what this instance last observed.
    ///
    /// Returns the number of events dispatched.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be read or locked.
    #[inline]
    pub fn poll(&self) -> Result<usize> {
        let events = self.with_shared_lock(|observed| {
            let current = read_all(&self.dir)?;
            let events = diff_observed(observed, &current);
            *observed = current;
            Ok(events)
        })?;
        if !events.is_empty() {
            tracing::debug!(events = events.len(), dir = %self.dir.display(), "external changes detected");
        }
        for event in &events {
            self.listeners.dispatch(event);
        }
        Ok(events.len())
    }

    // ── Private helpers ─────────────────────────────────────────────

    /// Returns the full path for a given key.
    fn path(&self, key: &str) -> PathBuf {
        self.dir.join(key)
    }

    /// Acquires the in-process mutex and a shared (read) file lock,
    /// executes `op`, then releases the file lock.
    fn with_shared_lock<R, F: FnOnce(&mut Observed) -> Result<R>>(&self, op: F) -> Result<R> {
        let mut guard: MutexGuard<'_, Observed> =
            self.observed.lock().map_err(|err| lock_poison_error(&err))?;
        self.lock_file.lock_shared().map_err(storage_io_error)?;
        let result = op(&mut guard);
        // Only surface the unlock error when the operation succeeded;
        // otherwise the original error is more useful.
        if let Err(err) = self.lock_file.unlock()
            && result.is_ok()
        {
            return Err(storage_io_error(err));
        }
        result
    }

    /// Acquires the in-process mutex and an exclusive (write) file lock,
    /// executes `op`, then releases the file lock.
    fn with_exclusive_lock<R, F: FnOnce(&mut Observed) -> Result<R>>(&self, op: F) -> Result<R> {
        let mut guard: MutexGuard<'_, Observed> =
            self.observed.lock().map_err(|err| lock_poison_error(&err))?;
        self.lock_file.lock().map_err(storage_io_error)?;
        let result = op(&mut guard);
        if let Err(err) = self.lock_file.unlock()
            && result.is_ok()
        {
            return Err(storage_io_error(err));
        }
        result
    }

    /// Reads a value. Returns `None` if the file does not exist.
    fn read_value(&self, key: &str) -> Result<Option<String>> {
        match fs::read_to_string(self.path(key)) {
            Ok(contents) => Ok(Some(contents)),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(storage_io_error(err)),
        }
    }

    /// Atomically writes a value (write-to-tmp then rename).
    fn write_value(&self, key: &str, value: &str) -> Result<()> {
        let path = self.path(key);
        let tmp_path = self.path(&format!("{key}{TMP_SUFFIX}"));
        if let Err(err) = fs::write(&tmp_path, value) {
            discard_tmp(&tmp_path);
            return Err(storage_io_error(err));
        }
        if let Err(err) = fs::rename(&tmp_path, &path) {
            discard_tmp(&tmp_path);
            return Err(storage_io_error(err));
        }
        Ok(())
    }
}

// ── Free-standing helpers ───────────────────────────────────────────────

/// Rejects keys that are not safe as plain file names in the storage
/// directory.
fn validate_key(key: &str) -> Result<()> {
    let valid = !key.is_empty()
        && !key.starts_with('.')
        && !key.ends_with(TMP_SUFFIX)
        && key != LOCK_FILE
        && key
            .chars()
            .all(|ch| ch.is_ascii_alphanumeric() || matches!(ch, '_' | '-' | '.'));
    if valid {
        Ok(())
    } else {
        Err(BookWithMeError::InvalidKey(key.to_owned()))
    }
}

/// Reads every value file in `dir`.
fn read_all(dir: &Path) -> Result<Observed> {
    let mut values = Observed::new();
    for entry in fs::read_dir(dir).map_err(storage_io_error)? {
        let entry = entry.map_err(storage_io_error)?;
        let Ok(name) = entry.file_name().into_string() else {
            continue;
        };
        if validate_key(&name).is_err() || !entry.path().is_file() {
            continue;
        }
        match fs::read(entry.path()) {
            Ok(bytes) => match String::from_utf8(bytes) {
                Ok(contents) => {
                    let _previous = values.insert(name, contents);
                }
                Err(_) => {
                    tracing::warn!(key = %name, "skipping value that is not valid UTF-8");
                }
            },
            // Removed between listing and reading.
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
            Err(err) => return Err(storage_io_error(err)),
        }
    }
    Ok(values)
}

/// Computes the events that turn `before` into `after`, sorted by key.
fn diff_observed(before: &Observed, after: &Observed) -> Vec<StorageEvent> {
    let mut events: Vec<StorageEvent> = after
        .iter()
        .filter(|&(key, value)| before.get(key) != Some(value))
        .map(|(key, value)| StorageEvent {
            key: key.clone(),
            new_value: Some(value.clone()),
        })
        .chain(
            before
                .keys()
                .filter(|key| !after.contains_key(*key))
                .map(|key| StorageEvent {
                    key: key.clone(),
                    new_value: None,
                }),
        )
        .collect();
    events.sort_by(|a, b| a.key.cmp(&b.key));
    events
}

/// Best-effort removal of a leftover temporary file.
fn discard_tmp(tmp_path: &Path) {
    if let Err(err) = fs::remove_file(tmp_path)
        && err.kind() != std::io::ErrorKind::NotFound
    {
        tracing::warn!(path = %tmp_path.display(), error = %err, "failed to remove temporary file");
    }
}

/// Wraps an I/O error into a [`BookWithMeError::Storage`].
fn storage_io_error(err: std::io::Error) -> BookWithMeError {
    BookWithMeError::Storage(Box::new(err))
}

/// Wraps a mutex poison error into a [`BookWithMeError::Storage`].
fn lock_poison_error<T>(err: &std::sync::PoisonError<T>) -> BookWithMeError {
    BookWithMeError::Storage(err.to_string().into())
}

impl KeyValueStorage for FileStorage {
    #[inline]
    fn get(&self, key: &str) -> Result<Option<String>> {
        validate_key(key)?;
        self.with_shared_lock(|_| self.read_value(key))
    }

    #[inline]
    fn set(&self, key: &str, value: &str) -> Result<()> {
        validate_key(key)?;
        let changed = self.with_exclusive_lock(|observed| {
            let previous = self.read_value(key)?;
            self.write_value(key, value)?;
            let _stale = observed.insert(key.to_owned(), value.to_owned());
            Ok(previous.as_deref() != Some(value))
        })?;
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
        validate_key(key)?;
        let removed = self.with_exclusive_lock(|observed| {
            let _stale = observed.remove(key);
            match fs::remove_file(self.path(key)) {
                Ok(()) => Ok(true),
                Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(false),
                Err(err) => Err(storage_io_error(err)),
            }
        })?;
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
