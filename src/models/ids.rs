//! Shop identifier newtype.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Prefix of every generated shop id.
const ID_PREFIX: &str = "s_";

/// Number of base-36 characters after the prefix.
const ID_SUFFIX_LEN: usize = 8;

/// Radix used for the random suffix.
const ID_RADIX: u32 = 36;

/// Unique identifier of a shop record, e.g. `s_k3v9x0ab`.
///
/// Ids are opaque strings: records written by other clients may carry any
/// id, only [`ShopId::generate`] follows the `s_` + base-36 format.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ShopId(String);

impl ShopId {
    /// Creates an identifier from the given string.
    #[inline]
    #[must_use]
    pub const fn new(value: String) -> Self {
        Self(value)
    }

    /// Generates a fresh random identifier.
    #[inline]
    #[must_use]
    pub fn generate() -> Self {
        let mut entropy = Uuid::new_v4().as_u128();
        let mut id = String::with_capacity(ID_PREFIX.len() + ID_SUFFIX_LEN);
        id.push_str(ID_PREFIX);
        for _ in 0..ID_SUFFIX_LEN {
            let digit = u32::try_from(entropy % u128::from(ID_RADIX)).unwrap_or(0);
            id.push(char::from_digit(digit, ID_RADIX).unwrap_or('0'));
            entropy /= u128::from(ID_RADIX);
        }
        Self(id)
    }

    /// Returns the id as a string slice.
    #[inline]
    #[must_use]
    pub fn as_inner(&self) -> &str {
        &self.0
    }

    /// Consumes the wrapper and returns the inner string.
    #[inline]
    #[must_use]
    pub fn into_inner(self) -> String {
        self.0
    }
}

impl core::fmt::Display for ShopId {
    #[inline]
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

impl From<String> for ShopId {
    #[inline]
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for ShopId {
    #[inline]
    fn from(value: &str) -> Self {
        Self(value.to_owned())
    }
}
