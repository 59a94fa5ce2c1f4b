//! Latitude/longitude pair.

use serde::{Deserialize, Serialize};

/// A point in decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    /// Latitude in degrees.
    pub lat: f64,
    /// Longitude in degrees.
    pub lng: f64,
}

impl Coordinate {
    /// Creates a coordinate from latitude and longitude.
    #[inline]
    #[must_use]
    pub const fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }

    /// Returns `true` if both components are finite numbers.
    #[inline]
    #[must_use]
    pub const fn is_finite(&self) -> bool {
        self.lat.is_finite() && self.lng.is_finite()
    }

    /// Largest per-axis distance to `other`, in degrees.
    #[inline]
    #[must_use]
    pub fn max_axis_distance(&self, other: &Self) -> f64 {
        (self.lat - other.lat).abs().max((self.lng - other.lng).abs())
    }
}

impl core::fmt::Display for Coordinate {
    #[inline]
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{:.5}, {:.5}", self.lat, self.lng)
    }
}
