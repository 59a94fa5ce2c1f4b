//! Data models for the shop directory.
//!
//! [`ShopRecord`] is the persisted row; [`Coordinate`] and [`MapMarker`]
//! are the geographic views of it handed to map renderers.

mod coordinate;
mod ids;
mod shop;

pub use coordinate::Coordinate;
pub use ids::ShopId;
pub use shop::{MapMarker, Offer, ShopRecord};
