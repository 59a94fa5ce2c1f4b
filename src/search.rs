//! Free-text filtering of shop lists.

use crate::geocoder;
use crate::models::ShopRecord;

/// Composable filter for querying shops.
///
/// All set criteria are combined: a shop must satisfy every one of them.
///
/// # Examples
///
/// ```
/// use bookwithme_rs::search::ShopFilter;
///
/// let filter = ShopFilter::new().query("haarschnitt").city("München");
/// assert!(!filter.is_empty());
/// ```
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ShopFilter {
    /// Case-insensitive substring matched against name, city, and offers.
    pub query: Option<String>,
    /// City compared after [`geocoder::normalize`].
    pub city: Option<String>,
}

impl ShopFilter {
    /// Creates an empty filter that matches all shops.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Restricts to shops whose name, city, or offer text contains `text`
    /// (case-insensitive, surrounding whitespace ignored). A blank query
    /// matches everything.
    #[inline]
    #[must_use]
    pub fn query<T: Into<String>>(mut self, text: T) -> Self {
        self.query = Some(text.into());
        self
    }

    /// Restricts to shops in the given city; "Köln" and "koeln" are the
    /// same city.
    #[inline]
    #[must_use]
    pub fn city<T: Into<String>>(mut self, city: T) -> Self {
        self.city = Some(city.into());
        self
    }

    /// Returns `true` if no criterion is set.
    #[inline]
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.query.is_none() && self.city.is_none()
    }

    /// Returns `true` if the shop satisfies all set criteria.
    #[inline]
    #[must_use]
    pub fn matches(&self, shop: &ShopRecord) -> bool {
        self.matches_query(shop) && self.matches_city(shop)
    }

    /// Keeps the matching shops, preserving order.
    #[inline]
    #[must_use]
    pub fn apply(&self, shops: Vec<ShopRecord>) -> Vec<ShopRecord> {
        shops.into_iter().filter(|shop| self.matches(shop)).collect()
    }

    /// Checks the free-text criterion.
    fn matches_query(&self, shop: &ShopRecord) -> bool {
        self.query.as_ref().is_none_or(|query| {
            let needle = query.trim().to_lowercase();
            needle.is_empty()
                || shop.name.to_lowercase().contains(&needle)
                || shop.city.to_lowercase().contains(&needle)
                || shop.offers_text().contains(&needle)
        })
    }

    /// Checks the city criterion.
    fn matches_city(&self, shop: &ShopRecord) -> bool {
        self.city
            .as_ref()
            .is_none_or(|city| geocoder::normalize(city) == geocoder::normalize(&shop.city))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Offer, ShopId};

    fn shop(id: &str, name: &str, city: &str, offers: Vec<Offer>) -> ShopRecord {
        ShopRecord {
            id: ShopId::from(id),
            name: name.to_owned(),
            city: city.to_owned(),
            email: format!("{id}@example.de"),
            address: None,
            lat: Some(50.0),
            lng: Some(10.0),
            offers,
            created_at: 0,
        }
    }

    fn shops() -> Vec<ShopRecord> {
        vec![
            shop("s_1", "Salon Sonne", "Berlin", vec![Offer::new("Haarschnitt", "25 €")]),
            shop("s_2", "Barber Nord", "Hamburg", vec![Offer::new("Bart", "12 €")]),
            shop("s_3", "Nagelstudio", "Köln", Vec::new()),
        ]
    }

    fn ids(list: &[ShopRecord]) -> Vec<&str> {
        list.iter().map(|s| s.id.as_inner()).collect()
    }

    #[test]
    fn empty_filter_matches_all() {
        assert!(ShopFilter::new().is_empty());
        assert_eq!(ShopFilter::new().apply(shops()).len(), 3);
    }

    #[test]
    fn blank_query_matches_all() {
        assert_eq!(ShopFilter::new().query("   ").apply(shops()).len(), 3);
    }

    #[test]
    fn query_matches_name_case_insensitive() {
        let found = ShopFilter::new().query("SALON").apply(shops());
        assert_eq!(ids(&found), ["s_1"]);
    }

    #[test]
    fn query_matches_city() {
        let found = ShopFilter::new().query(" hamburg ").apply(shops());
        assert_eq!(ids(&found), ["s_2"]);
    }

    #[test]
    fn query_matches_offer_name_and_price() {
        assert_eq!(ids(&ShopFilter::new().query("haarschnitt").apply(shops())), ["s_1"]);
        assert_eq!(ids(&ShopFilter::new().query("12 €").apply(shops())), ["s_2"]);
    }

    #[test]
    fn query_preserves_order() {
        let found = ShopFilter::new().query("n").apply(shops());
        assert_eq!(ids(&found), ["s_1", "s_2", "s_3"]);
    }

    #[test]
    fn city_uses_normalized_names() {
        let found = ShopFilter::new().city("KOELN").apply(shops());
        assert_eq!(ids(&found), ["s_3"]);
    }

    #[test]
    fn criteria_combine() {
        let filter = ShopFilter::new().query("salon").city("Hamburg");
        assert!(filter.apply(shops()).is_empty());
    }
}
