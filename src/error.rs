//! Error types for the BookWithMe shop directory.

use crate::models::ShopId;

/// Result alias used throughout the crate.
pub type Result<T> = core::result::Result<T, BookWithMeError>;

/// A registration field that must be non-empty after trimming.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RequiredField {
    /// Business name.
    Name,
    /// City the business is located in.
    City,
    /// Contact e-mail address.
    Email,
}

impl core::fmt::Display for RequiredField {
    #[inline]
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let label = match *self {
            Self::Name => "name",
            Self::City => "city",
            Self::Email => "email",
        };
        f.write_str(label)
    }
}

/// All errors that can occur when using the shop directory.
#[derive(Debug, thiserror::Error)]
pub enum BookWithMeError {
    /// JSON serialization or deserialization failed.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Storage backend failed (I/O, lock poisoning, ...).
    #[error("storage error: {0}")]
    Storage(Box<dyn core::error::Error + Send + Sync>),

    /// Storage backend is disabled or not reachable.
    #[error("storage is unavailable")]
    StorageUnavailable,

    /// A write would exceed the backend's byte quota.
    #[error("storage quota exceeded writing {key:?}: {needed} bytes needed, quota is {quota}")]
    QuotaExceeded {
        /// Key that was being written.
        key: String,
        /// Total bytes the storage would hold after the write.
        needed: usize,
        /// Configured quota in bytes.
        quota: usize,
    },

    /// Key contains characters the backend cannot store.
    #[error("invalid storage key: {0:?}")]
    InvalidKey(String),

    /// A required registration field is empty.
    #[error("required field is empty: {0}")]
    MissingField(RequiredField),

    /// A record with the same id is already stored.
    #[error("shop id already exists: {0}")]
    DuplicateId(ShopId),
}

impl BookWithMeError {
    /// Returns `true` for environmental failures of the storage layer, as
    /// opposed to mistakes in the caller's input.
    #[inline]
    #[must_use]
    pub const fn is_storage_failure(&self) -> bool {
        matches!(
            *self,
            Self::Storage(_) | Self::StorageUnavailable | Self::QuotaExceeded { .. }
        )
    }
}
