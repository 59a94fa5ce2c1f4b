//! Local shop directory with a deterministic pseudo-geocoder.
//!
//! Shops register with a name, city, e-mail, optional address, and a list
//! of offers. [`store::ShopStore`] keeps them as one JSON array in a
//! pluggable [`storage::KeyValueStorage`] and pings other handles on the
//! same storage after every change. [`geocoder`] places each shop near its
//! city center with a stable, salt-dependent offset so map markers for the
//! same city do not overlap.
//!
//! # Example
//!
//! ```
//! use bookwithme_rs::registration::ShopRegistration;
//! use bookwithme_rs::storage::InMemoryStorage;
//! use bookwithme_rs::store::ShopStore;
//!
//! let store = ShopStore::new(InMemoryStorage::new());
//! let shop = store
//!     .register(ShopRegistration::new("Salon Sonne", "Hamburg", "info@sonne.de"))
//!     .unwrap();
//! assert_eq!(store.find_by_id(&shop.id), Some(shop));
//! ```

pub mod error;
pub mod geocoder;
pub mod models;
pub mod registration;
pub mod search;
pub mod storage;
pub mod store;
