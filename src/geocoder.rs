//! Offline pseudo-geocoder.
//!
//! Maps a free-text city name to a fixed city center from a small static
//! table and adds a deterministic jitter of at most ±0.01° per axis derived
//! from a 32-bit FNV-1a hash of the normalized city and a salt (usually the
//! business name). The same `(city, salt)` pair always yields the same
//! point, on every platform, so a shop's location can be re-derived from
//! its record instead of being trusted from storage.

mod cities;

use crate::models::Coordinate;

pub use cities::NATIONAL_CENTER;

/// FNV-1a 32-bit offset basis.
const FNV_OFFSET_BASIS: u32 = 2_166_136_261;

/// FNV-1a 32-bit prime (`2^24 + 2^8 + 0x93`).
const FNV_PRIME: u32 = 16_777_619;

/// Number of jitter steps per axis; offsets range over `-1000..=1000`.
const JITTER_STEPS: u32 = 2001;

/// Step index that maps to a zero offset.
const JITTER_CENTER: f64 = 1000.0;

/// Divisor turning a step offset into degrees (1000 steps = 0.01°).
const JITTER_SCALE: f64 = 100_000.0;

/// Largest offset, in degrees, that [`geocode`] adds to a base coordinate.
pub const MAX_JITTER_DEGREES: f64 = 0.01;

/// Locale-specific letters folded to their ASCII digraphs.
const FOLDS: &[(char, &str)] = &[('ä', "ae"), ('ö', "oe"), ('ü', "ue"), ('ß', "ss")];

/// Canonicalizes a city name into a lookup key.
///
/// Trims, lowercases, and folds German umlauts and `ß` so that equivalent
/// spellings ("Köln", "koeln", " KÖLN ") produce the same key. Whitespace-only
/// input yields an empty string.
#[inline]
#[must_use]
pub fn normalize(city: &str) -> String {
    let lowered = city.trim().to_lowercase();
    let mut key = String::with_capacity(lowered.len());
    for ch in lowered.chars() {
        match FOLDS.iter().find(|&&(letter, _)| letter == ch) {
            Some(&(_, digraph)) => key.push_str(digraph),
            None => key.push(ch),
        }
    }
    key
}

/// Returns the center of a known city, or [`NATIONAL_CENTER`] when the
/// normalized name is not in the table.
#[inline]
#[must_use]
pub fn base_coordinate(normalized_city: &str) -> Coordinate {
    cities::lookup(normalized_city).unwrap_or(NATIONAL_CENTER)
}

/// 32-bit FNV-1a hash over the UTF-16 code units of `input`.
///
/// For ASCII input this is byte-wise FNV-1a. Code units rather than UTF-8
/// bytes keep hashes identical to records created by browser clients.
#[inline]
#[must_use]
pub fn hash32(input: &str) -> u32 {
    input.encode_utf16().fold(FNV_OFFSET_BASIS, |hash, unit| {
        (hash ^ u32::from(unit)).wrapping_mul(FNV_PRIME)
    })
}

/// Computes the deterministic coordinate for `city`, spread by `salt`.
///
/// Latitude jitter comes from `hash mod 2001`, longitude jitter from
/// `(hash div 2001) mod 2001`, so the two axes use independent parts of the
/// hash.
#[inline]
#[must_use]
pub fn geocode(city: &str, salt: &str) -> Coordinate {
    let key = normalize(city);
    let base = base_coordinate(&key);
    let hash = hash32(&format!("{key}|{salt}"));
    tracing::trace!(city = %key, hash, "geocoding");
    Coordinate::new(
        base.lat + jitter(hash % JITTER_STEPS),
        base.lng + jitter((hash / JITTER_STEPS) % JITTER_STEPS),
    )
}

/// Converts a step in `0..2001` to an offset in degrees.
fn jitter(step: u32) -> f64 {
    (f64::from(step) - JITTER_CENTER) / JITTER_SCALE
}
