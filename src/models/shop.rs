//! Shop record, offers, and map markers.

use serde::{Deserialize, Deserializer, Serialize};

use super::{Coordinate, ShopId};
use crate::geocoder;

/// A service offered by a shop, e.g. a haircut for "25 €".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Offer {
    /// Service name.
    #[serde(default, deserialize_with = "null_as_default")]
    pub name: String,
    /// Free-form price label; may be empty.
    #[serde(default, deserialize_with = "null_as_default")]
    pub price: String,
}

impl Offer {
    /// Creates an offer from a name and price label.
    #[inline]
    #[must_use]
    pub fn new<N: Into<String>, P: Into<String>>(name: N, price: P) -> Self {
        Self {
            name: name.into(),
            price: price.into(),
        }
    }
}

/// One registered service business.
///
/// Deserialization is lenient so that hand-edited or partially written
/// storage still loads: everything except `id` has a default that also
/// replaces an explicit `null`, and a `lat`/`lng` that is missing or not a
/// finite number becomes `None`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShopRecord {
    /// Unique, immutable identifier.
    pub id: ShopId,
    /// Business name.
    #[serde(default, deserialize_with = "null_as_default")]
    pub name: String,
    /// City as entered by the user.
    #[serde(default, deserialize_with = "null_as_default")]
    pub city: String,
    /// Contact e-mail (format unvalidated).
    #[serde(default, deserialize_with = "null_as_default")]
    pub email: String,
    /// Optional street address.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    /// Latitude assigned by the geocoder.
    #[serde(default, deserialize_with = "lenient_degrees")]
    pub lat: Option<f64>,
    /// Longitude assigned by the geocoder.
    #[serde(default, deserialize_with = "lenient_degrees")]
    pub lng: Option<f64>,
    /// Offered services in entry order.
    #[serde(default, deserialize_with = "null_as_default")]
    pub offers: Vec<Offer>,
    /// Creation time in milliseconds since the Unix epoch.
    #[serde(default, deserialize_with = "null_as_default")]
    pub created_at: i64,
}

impl ShopRecord {
    /// Returns the stored coordinate if both components are present and
    /// finite.
    #[inline]
    #[must_use]
    pub fn coordinate(&self) -> Option<Coordinate> {
        let point = Coordinate::new(self.lat?, self.lng?);
        point.is_finite().then_some(point)
    }

    /// Re-derives the coordinate from city and name.
    ///
    /// For records created by registration this equals
    /// [`ShopRecord::coordinate`].
    #[inline]
    #[must_use]
    pub fn rederive_coordinate(&self) -> Coordinate {
        geocoder::geocode(&self.city, &self.name)
    }

    /// Builds the map marker for this record, or `None` if it has no
    /// usable coordinate.
    #[inline]
    #[must_use]
    pub fn marker(&self) -> Option<MapMarker> {
        self.coordinate().map(|coordinate| MapMarker {
            id: self.id.clone(),
            name: self.name.clone(),
            city: self.city.clone(),
            coordinate,
        })
    }

    /// Space-joined `"<name> <price>"` text of all offers, lowercased.
    pub(crate) fn offers_text(&self) -> String {
        self.offers
            .iter()
            .map(|offer| format!("{} {}", offer.name, offer.price))
            .collect::<Vec<_>>()
            .join(" ")
            .to_lowercase()
    }
}

/// What a map view needs to plot one shop.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MapMarker {
    /// Shop id, used for the detail link.
    pub id: ShopId,
    /// Shop name.
    pub name: String,
    /// Shop city.
    pub city: String,
    /// Marker position.
    pub coordinate: Coordinate,
}

/// Treats an explicit `null` like a missing field.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Accepts any JSON value and keeps it only if it is a finite number.
fn lenient_degrees<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(value
        .and_then(|raw| raw.as_f64())
        .filter(|degrees| degrees.is_finite()))
}
