//! Static table of known city centers.

use crate::models::Coordinate;

/// Geographic center of Germany, used for unknown cities.
pub const NATIONAL_CENTER: Coordinate = Coordinate::new(51.1657, 10.4515);

/// City centers keyed by normalized name.
///
/// Keys must already be in [`super::normalize`] form (umlauts folded), so
/// "München", "muenchen" and "MÜNCHEN" all hit the same row.
pub(crate) const CITY_CENTERS: &[(&str, Coordinate)] = &[
    ("berlin", Coordinate::new(52.5200, 13.4050)),
    ("hamburg", Coordinate::new(53.5511, 9.9937)),
    ("muenchen", Coordinate::new(48.1351, 11.5820)),
    ("munich", Coordinate::new(48.1351, 11.5820)),
    ("koeln", Coordinate::new(50.9375, 6.9603)),
    ("cologne", Coordinate::new(50.9375, 6.9603)),
    ("frankfurt", Coordinate::new(50.1109, 8.6821)),
    ("stuttgart", Coordinate::new(48.7758, 9.1829)),
    ("duesseldorf", Coordinate::new(51.2277, 6.7735)),
    ("leipzig", Coordinate::new(51.3397, 12.3731)),
    ("bremen", Coordinate::new(53.0793, 8.8017)),
    ("dresden", Coordinate::new(51.0504, 13.7373)),
];

/// Looks up a normalized city name.
pub(crate) fn lookup(normalized: &str) -> Option<Coordinate> {
    CITY_CENTERS
        .iter()
        .find(|&&(name, _)| name == normalized)
        .map(|&(_, center)| center)
}
