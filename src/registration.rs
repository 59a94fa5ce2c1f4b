//! Registration input for new shops.

use crate::error::{BookWithMeError, RequiredField, Result};
use crate::geocoder;
use crate::models::{Offer, ShopId, ShopRecord};

/// Raw registration form data.
///
/// Values are stored as entered; [`ShopRegistration::into_record`] trims
/// them and enforces the required fields.
///
/// # Examples
///
/// ```
/// use bookwithme_rs::registration::ShopRegistration;
///
/// let form = ShopRegistration::new("Salon Sonne", "Berlin", "info@sonne.de")
///     .address("Alexanderplatz 1")
///     .offer("Haarschnitt", "25 €");
/// assert!(form.validate().is_ok());
/// ```
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ShopRegistration {
    /// Business name (required).
    pub name: String,
    /// City (required).
    pub city: String,
    /// Contact e-mail (required, format unchecked).
    pub email: String,
    /// Street address (optional).
    pub address: Option<String>,
    /// Offers in entry order.
    pub offers: Vec<Offer>,
}

impl ShopRegistration {
    /// Creates a registration with the three required fields.
    #[inline]
    #[must_use]
    pub fn new<N, C, E>(name: N, city: C, email: E) -> Self
    where
        N: Into<String>,
        C: Into<String>,
        E: Into<String>,
    {
        Self {
            name: name.into(),
            city: city.into(),
            email: email.into(),
            address: None,
            offers: Vec::new(),
        }
    }

    /// Sets the street address.
    #[inline]
    #[must_use]
    pub fn address<T: Into<String>>(mut self, address: T) -> Self {
        self.address = Some(address.into());
        self
    }

    /// Appends an offer.
    #[inline]
    #[must_use]
    pub fn offer<N: Into<String>, P: Into<String>>(mut self, name: N, price: P) -> Self {
        self.offers.push(Offer::new(name, price));
        self
    }

    /// Checks that name, city, and email are non-empty after trimming.
    ///
    /// # Errors
    ///
    /// Returns [`BookWithMeError::MissingField`] naming the first empty
    /// field.
    #[inline]
    pub fn validate(&self) -> Result<()> {
        let required = [
            (RequiredField::Name, &self.name),
            (RequiredField::City, &self.city),
            (RequiredField::Email, &self.email),
        ];
        match required.iter().find(|&&(_, value)| value.trim().is_empty()) {
            Some(&(field, _)) => Err(BookWithMeError::MissingField(field)),
            None => Ok(()),
        }
    }

    /// Validates the form and builds the record: trims all text, drops
    /// offers without a name, treats a blank address as absent, and places
    /// the shop with [`geocoder::geocode`] using the name as salt.
    ///
    /// # Errors
    ///
    /// Returns [`BookWithMeError::MissingField`] if validation fails.
    #[inline]
    pub fn into_record(self, id: ShopId, created_at: i64) -> Result<ShopRecord> {
        self.validate()?;
        let name = self.name.trim().to_owned();
        let city = self.city.trim().to_owned();
        let point = geocoder::geocode(&city, &name);
        let offers = self
            .offers
            .into_iter()
            .filter_map(|offer| {
                let offer_name = offer.name.trim();
                (!offer_name.is_empty()).then(|| Offer::new(offer_name, offer.price.trim()))
            })
            .collect();
        Ok(ShopRecord {
            id,
            name,
            city,
            email: self.email.trim().to_owned(),
            address: self
                .address
                .map(|address| address.trim().to_owned())
                .filter(|address| !address.is_empty()),
            lat: Some(point.lat),
            lng: Some(point.lng),
            offers,
            created_at,
        })
    }
}
