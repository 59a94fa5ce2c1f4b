//! Shop directory persistence with change notification.
//!
//! [`ShopStore`] owns the ordered shop list stored as one JSON array under
//! a single key of a [`KeyValueStorage`], and writes a "ping" key after
//! every mutation so that other handles on the same storage (other page
//! instances, other processes) know to reload.
//!
//! Every read returns an independent copy of the list; nothing is shared
//! with storage until an explicit [`ShopStore::save`]. Mutations are
//! load-modify-save of the whole list with no compare-and-swap, so two
//! writers interleaving their load and save lose one update.

use std::sync::Arc;

use chrono::Utc;

use crate::error::{BookWithMeError, Result};
use crate::geocoder;
use crate::models::{MapMarker, Offer, ShopId, ShopRecord};
use crate::registration::ShopRegistration;
use crate::search::ShopFilter;
use crate::storage::{KeyValueStorage, StorageEvent, SubscriptionId};

/// Default key holding the JSON array of shops.
pub const DEFAULT_SHOPS_KEY: &str = "bwmShops";

/// Default key written on every mutation.
pub const DEFAULT_PING_KEY: &str = "bwmPing";

/// Default key carrying a delete request across instances.
pub const DEFAULT_DELETE_KEY: &str = "bwmDelete";

/// Salt used to place the demo shop.
const DEMO_SALT: &str = "Demo";

/// Storage keys used by a [`ShopStore`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreKeys {
    /// Key of the shop list.
    pub shops: String,
    /// Key of the change ping.
    pub ping: String,
    /// Key of the transient delete request.
    pub delete_request: String,
}

impl Default for StoreKeys {
    #[inline]
    fn default() -> Self {
        Self {
            shops: DEFAULT_SHOPS_KEY.to_owned(),
            ping: DEFAULT_PING_KEY.to_owned(),
            delete_request: DEFAULT_DELETE_KEY.to_owned(),
        }
    }
}

impl StoreKeys {
    /// Maps a raw storage event to a store-level change, ignoring keys
    /// the store does not own and the clearing of a delete request.
    #[must_use]
    fn classify(&self, event: &StorageEvent) -> Option<StoreChange> {
        if event.key == self.shops {
            Some(StoreChange::Shops)
        } else if event.key == self.ping {
            Some(StoreChange::Ping)
        } else if event.key == self.delete_request {
            event
                .new_value
                .as_deref()
                .map(str::trim)
                .filter(|id| !id.is_empty())
                .map(|id| StoreChange::DeleteRequested(ShopId::from(id)))
        } else {
            None
        }
    }
}

/// A change observed on the store's keys.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreChange {
    /// The shop list was rewritten.
    Shops,
    /// Another handle signalled a mutation.
    Ping,
    /// Another handle asked for this shop to be deleted.
    DeleteRequested(ShopId),
}

/// Builder for [`ShopStore`].
#[derive(Debug)]
pub struct ShopStoreBuilder<S: KeyValueStorage> {
    /// Storage backend.
    storage: Option<S>,
    /// Keys to use.
    keys: StoreKeys,
}

impl<S: KeyValueStorage> ShopStoreBuilder<S> {
    /// Sets the storage backend.
    #[inline]
    #[must_use]
    pub fn storage(mut self, storage: S) -> Self {
        self.storage = Some(storage);
        self
    }

    /// Overrides the storage keys.
    #[inline]
    #[must_use]
    pub fn keys(mut self, keys: StoreKeys) -> Self {
        self.keys = keys;
        self
    }

    /// Builds the store.
    ///
    /// # Errors
    ///
    /// Returns [`BookWithMeError::Storage`] if no backend was set.
    #[inline]
    pub fn build(self) -> Result<ShopStore<S>> {
        let storage = self
            .storage
            .ok_or_else(|| BookWithMeError::Storage("storage backend is required".into()))?;
        tracing::debug!(shops_key = %self.keys.shops, "building shop store");
        Ok(ShopStore {
            storage,
            keys: self.keys,
        })
    }
}

/// The shop directory over an injected storage backend.
#[derive(Debug)]
pub struct ShopStore<S: KeyValueStorage> {
    /// Storage backend.
    storage: S,
    /// Keys in use.
    keys: StoreKeys,
}

impl<S: KeyValueStorage> ShopStore<S> {
    /// Creates a new builder for configuring the store.
    #[inline]
    #[must_use]
    pub fn builder() -> ShopStoreBuilder<S> {
        ShopStoreBuilder {
            storage: None,
            keys: StoreKeys::default(),
        }
    }

    /// Creates a store with the default keys.
    #[inline]
    #[must_use]
    pub fn new(storage: S) -> Self {
        Self {
            storage,
            keys: StoreKeys::default(),
        }
    }

    /// Returns the storage backend.
    #[inline]
    #[must_use]
    pub const fn storage(&self) -> &S {
        &self.storage
    }

    /// Returns the keys in use.
    #[inline]
    #[must_use]
    pub const fn keys(&self) -> &StoreKeys {
        &self.keys
    }

    /// Returns all stored shops in insertion order.
    ///
    /// Never fails: a missing key, unreadable storage, or a blob that is
    /// not a JSON array all yield an empty list, and array elements that
    /// are not shop records are skipped.
    #[inline]
    #[must_use]
    pub fn load(&self) -> Vec<ShopRecord> {
        self.read_list().unwrap_or_else(|err| {
            tracing::warn!(error = %err, key = %self.keys.shops, "failed to read shops, treating as empty");
            Vec::new()
        })
    }

    /// Replaces the stored list with `list`.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or the storage write fails; the
    /// previously stored list is left as it was.
    #[inline]
    #[tracing::instrument(skip_all, fields(count = list.len()))]
    pub fn save(&self, list: &[ShopRecord]) -> Result<()> {
        let json = serde_json::to_string(list)?;
        self.storage.set(&self.keys.shops, &json)
    }

    /// Appends `record`, saves, and signals the change. Returns the record.
    ///
    /// Stored elements that do not load as records are written back
    /// unchanged.
    ///
    /// # Errors
    ///
    /// Returns [`BookWithMeError::DuplicateId`] if a shop with the same id
    /// is stored, or a storage error if reading or writing fails. Nothing
    /// is written in either case.
    #[inline]
    #[tracing::instrument(skip_all, fields(id = %record.id))]
    pub fn add(&self, record: ShopRecord) -> Result<ShopRecord> {
        let mut items = self.read_raw()?;
        if items
            .iter()
            .any(|item| element_id(item) == Some(record.id.as_inner()))
        {
            return Err(BookWithMeError::DuplicateId(record.id));
        }
        items.push(serde_json::to_value(&record)?);
        self.write_raw(&items)?;
        self.notify_change();
        tracing::debug!(count = items.len(), "shop added");
        Ok(record)
    }

    /// Deletes the shop with `id`. Returns `false` (and writes nothing) if
    /// no such shop exists, so repeated calls are harmless. Other stored
    /// elements are written back unchanged.
    ///
    /// # Errors
    ///
    /// Returns a storage error if reading or writing fails.
    #[inline]
    #[tracing::instrument(skip_all, fields(id = %id))]
    pub fn remove(&self, id: &ShopId) -> Result<bool> {
        let mut items = self.read_raw()?;
        let before = items.len();
        items.retain(|item| element_id(item) != Some(id.as_inner()));
        if items.len() == before {
            tracing::debug!("shop not found, nothing to remove");
            return Ok(false);
        }
        self.write_raw(&items)?;
        self.notify_change();
        Ok(true)
    }

    /// Returns the first shop with `id`, if any.
    #[inline]
    #[must_use]
    pub fn find_by_id(&self, id: &ShopId) -> Option<ShopRecord> {
        self.load().into_iter().find(|shop| shop.id == *id)
    }

    /// Writes a strictly increasing millisecond timestamp to the ping key.
    ///
    /// Best effort: a failed write is logged, never returned, because the
    /// data write it follows has already succeeded.
    #[inline]
    pub fn notify_change(&self) {
        let previous = match self.storage.get(&self.keys.ping) {
            Ok(raw) => raw.and_then(|value| value.trim().parse::<i64>().ok()),
            Err(err) => {
                tracing::warn!(error = %err, "failed to read ping");
                None
            }
        };
        let now = Utc::now().timestamp_millis();
        let stamp = previous.map_or(now, |prev| now.max(prev.saturating_add(1)));
        if let Err(err) = self.storage.set(&self.keys.ping, &stamp.to_string()) {
            tracing::warn!(error = %err, "failed to write ping");
        }
    }

    /// Subscribes `callback` to changes of the store's keys made by any
    /// handle on the same storage.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot register the listener.
    #[inline]
    pub fn on_change<F>(&self, callback: F) -> Result<SubscriptionId>
    where
        F: Fn(&StoreChange) + Send + Sync + 'static,
    {
        let keys = self.keys.clone();
        self.storage.subscribe(Arc::new(move |event: &StorageEvent| {
            if let Some(change) = keys.classify(event) {
                callback(&change);
            }
        }))
    }

    /// Cancels a subscription made with [`ShopStore::on_change`] or
    /// [`ShopStore::watch`].
    ///
    /// # Errors
    ///
    /// Returns an error if the backend's listener registry fails.
    #[inline]
    pub fn unsubscribe(&self, id: SubscriptionId) -> Result<bool> {
        self.storage.unsubscribe(id)
    }

    /// Asks whichever handle is watching the storage to delete `id`.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the request cannot be written.
    #[inline]
    pub fn request_delete(&self, id: &ShopId) -> Result<()> {
        tracing::debug!(id = %id, "requesting delete");
        self.storage
            .set(&self.keys.delete_request, id.as_inner())
    }

    /// Reacts to a change: a delete request is carried out and the
    /// request key cleared. Other changes need no action from the store.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the removal or clearing fails.
    #[inline]
    pub fn handle_change(&self, change: &StoreChange) -> Result<()> {
        if let StoreChange::DeleteRequested(id) = change {
            let removed = self.remove(id)?;
            tracing::debug!(id = %id, removed, "delete request handled");
            self.storage.remove(&self.keys.delete_request)?;
        }
        Ok(())
    }

    /// Validates a registration, places it with the geocoder, assigns a
    /// fresh id and creation time, and adds it.
    ///
    /// # Errors
    ///
    /// Returns [`BookWithMeError::MissingField`] for an incomplete form,
    /// or a storage error if reading or writing fails.
    #[inline]
    #[tracing::instrument(skip_all)]
    pub fn register(&self, form: ShopRegistration) -> Result<ShopRecord> {
        form.validate()?;
        let existing = self.read_raw()?;
        let mut id = ShopId::generate();
        while existing
            .iter()
            .any(|item| element_id(item) == Some(id.as_inner()))
        {
            id = ShopId::generate();
        }
        let record = form.into_record(id, Utc::now().timestamp_millis())?;
        self.add(record)
    }

    /// Returns the stored shops matching `filter`, in stored order.
    #[inline]
    #[must_use]
    pub fn search(&self, filter: &ShopFilter) -> Vec<ShopRecord> {
        filter.apply(self.load())
    }

    /// Returns markers for every stored shop that has a finite coordinate;
    /// shops with missing or malformed coordinates are left out.
    #[inline]
    #[must_use]
    pub fn markers(&self) -> Vec<MapMarker> {
        self.load().iter().filter_map(ShopRecord::marker).collect()
    }

    /// Stores a demo shop in Berlin if the directory is empty. Returns the
    /// demo shop, or `None` if shops already existed.
    ///
    /// # Errors
    ///
    /// Returns a storage error if reading or writing fails.
    #[inline]
    pub fn seed_if_empty(&self) -> Result<Option<ShopRecord>> {
        if !self.read_raw()?.is_empty() {
            return Ok(None);
        }
        let point = geocoder::geocode("Berlin", DEMO_SALT);
        let demo = ShopRecord {
            id: ShopId::generate(),
            name: "Demo Salon".to_owned(),
            city: "Berlin".to_owned(),
            email: "demo@salon.de".to_owned(),
            address: Some("Alexanderplatz 1".to_owned()),
            lat: Some(point.lat),
            lng: Some(point.lng),
            offers: vec![Offer::new("Haarschnitt", "25 €"), Offer::new("Föhnen", "15 €")],
            created_at: Utc::now().timestamp_millis(),
        };
        self.save(core::slice::from_ref(&demo))?;
        tracing::info!(id = %demo.id, "seeded demo shop");
        Ok(Some(demo))
    }

    /// Reads and parses the list, propagating storage errors but not
    /// parse errors.
    fn read_list(&self) -> Result<Vec<ShopRecord>> {
        Ok(decode_records(self.read_raw()?))
    }

    /// Reads the stored array elements without interpreting them.
    fn read_raw(&self) -> Result<Vec<serde_json::Value>> {
        Ok(self
            .storage
            .get(&self.keys.shops)?
            .map(|raw| parse_array(&raw))
            .unwrap_or_default())
    }

    /// Writes array elements back as the stored list.
    fn write_raw(&self, items: &[serde_json::Value]) -> Result<()> {
        let json = serde_json::to_string(items)?;
        self.storage.set(&self.keys.shops, &json)
    }

    /// Carries out a delete request left in storage before anyone watched.
    fn handle_pending_delete(&self) {
        let pending = match self.storage.get(&self.keys.delete_request) {
            Ok(pending) => pending,
            Err(err) => {
                tracing::warn!(error = %err, "failed to read pending delete request");
                return;
            }
        };
        let change = pending.and_then(|value| {
            self.keys.classify(&StorageEvent {
                key: self.keys.delete_request.clone(),
                new_value: Some(value),
            })
        });
        if let Some(change) = change
            && let Err(err) = self.handle_change(&change)
        {
            tracing::warn!(error = %err, ?change, "failed to handle pending delete request");
        }
    }
}

impl<S: KeyValueStorage + 'static> ShopStore<S> {
    /// Keeps a view up to date: on every change of the store's keys,
    /// carries out pending delete requests, reloads the list, and passes
    /// it to `on_refresh`.
    ///
    /// A delete request already waiting in storage is carried out right
    /// after subscribing. The subscription holds only a weak reference, so
    /// dropping the last `Arc` of the store silences it.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot register the listener.
    #[inline]
    pub fn watch<F>(self: &Arc<Self>, on_refresh: F) -> Result<SubscriptionId>
    where
        F: Fn(Vec<ShopRecord>) + Send + Sync + 'static,
    {
        let weak = Arc::downgrade(self);
        let subscription = self.on_change(move |change| {
            let Some(store) = weak.upgrade() else {
                return;
            };
            if let Err(err) = store.handle_change(change) {
                tracing::warn!(error = %err, ?change, "failed to handle store change");
            }
            on_refresh(store.load());
        })?;
        self.handle_pending_delete();
        Ok(subscription)
    }
}

/// Parses the stored blob into its array elements; anything that is not
/// a JSON array counts as empty.
fn parse_array(raw: &str) -> Vec<serde_json::Value> {
    match serde_json::from_str::<serde_json::Value>(raw) {
        Ok(serde_json::Value::Array(items)) => items,
        Ok(_) => {
            tracing::warn!("stored shops are not a JSON array, treating as empty");
            Vec::new()
        }
        Err(err) => {
            tracing::warn!(error = %err, "stored shops are not valid JSON, treating as empty");
            Vec::new()
        }
    }
}

/// Converts array elements to records, skipping those that are not.
fn decode_records(items: Vec<serde_json::Value>) -> Vec<ShopRecord> {
    items
        .into_iter()
        .enumerate()
        .filter_map(|(index, item)| match serde_json::from_value::<ShopRecord>(item) {
            Ok(shop) => Some(shop),
            Err(err) => {
                tracing::warn!(index, error = %err, "skipping malformed shop record");
                None
            }
        })
        .collect()
}

/// Returns the `id` of a stored element, if it has a string one.
fn element_id(item: &serde_json::Value) -> Option<&str> {
    item.get("id")?.as_str()
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::models::Coordinate;
    use crate::storage::InMemoryStorage;

    fn shop(id: &str, name: &str, city: &str) -> ShopRecord {
        let point = geocoder::geocode(city, name);
        ShopRecord {
            id: ShopId::from(id),
            name: name.to_owned(),
            city: city.to_owned(),
            email: format!("{id}@example.de"),
            address: None,
            lat: Some(point.lat),
            lng: Some(point.lng),
            offers: vec![Offer::new("Haarschnitt", "25 €")],
            created_at: 1_700_000_000_000,
        }
    }

    fn store() -> ShopStore<InMemoryStorage> {
        ShopStore::new(InMemoryStorage::new())
    }

    fn ping_value<S: KeyValueStorage>(store: &ShopStore<S>) -> Option<i64> {
        store
            .storage()
            .get(DEFAULT_PING_KEY)
            .unwrap()
            .map(|raw| raw.parse().unwrap())
    }

    #[test]
    fn empty_storage_loads_empty() {
        assert!(store().load().is_empty());
    }

    #[test]
    fn save_empty_then_load() {
        let store = store();
        store.save(&[]).unwrap();
        assert!(store.load().is_empty());
        assert_eq!(
            store.storage().get(DEFAULT_SHOPS_KEY).unwrap().as_deref(),
            Some("[]")
        );
    }

    #[test]
    fn save_load_roundtrip_preserves_order() {
        let store = store();
        let mut list = vec![
            shop("s_c", "Gamma", "Köln"),
            shop("s_a", "Alpha", "Berlin"),
            shop("s_b", "Beta", "Nowhere"),
        ];
        list[1].address = Some("Hauptstraße 5".to_owned());
        list[2].offers.clear();
        store.save(&list).unwrap();
        assert_eq!(store.load(), list);
    }

    #[test]
    fn load_returns_independent_copy() {
        let store = store();
        store.save(&[shop("s_1", "A", "Berlin")]).unwrap();
        let mut copy = store.load();
        copy.clear();
        assert_eq!(store.load().len(), 1);
    }

    #[test]
    fn not_json_loads_empty() {
        let store = store();
        store.storage().set(DEFAULT_SHOPS_KEY, "not json").unwrap();
        assert!(store.load().is_empty());
        assert!(store.find_by_id(&ShopId::from("s_1")).is_none());
    }

    #[test]
    fn non_array_json_loads_empty() {
        let store = store();
        store.storage().set(DEFAULT_SHOPS_KEY, r#"{"id": "s_1"}"#).unwrap();
        assert!(store.load().is_empty());
    }

    #[test]
    fn malformed_elements_are_skipped() {
        let store = store();
        let blob = r#"[
            {"id": "s_ok", "name": "Fine", "city": "Berlin", "lat": 52.5, "lng": 13.4},
            42,
            {"name": "no id"},
            {"id": "s_nocoords", "name": "Lost", "city": "Bremen", "lat": "x"}
        ]"#;
        store.storage().set(DEFAULT_SHOPS_KEY, blob).unwrap();
        let ids: Vec<String> = store.load().into_iter().map(|s| s.id.into_inner()).collect();
        assert_eq!(ids, ["s_ok", "s_nocoords"]);

        let markers = store.markers();
        assert_eq!(markers.len(), 1);
        assert_eq!(markers[0].coordinate, Coordinate::new(52.5, 13.4));
    }

    #[test]
    fn null_fields_survive_mutations() {
        let store = store();
        let blob = r#"[
            {"id": "s_keep", "name": "Alt", "city": "Bremen", "email": null, "offers": null},
            {"id": "s_keep2", "name": "Alt 2", "city": "Köln", "offers": [{"name": "Cut", "price": null}]},
            {"name": "no id", "city": "Leipzig"}
        ]"#;
        store.storage().set(DEFAULT_SHOPS_KEY, blob).unwrap();

        let loaded: Vec<String> = store.load().into_iter().map(|s| s.id.into_inner()).collect();
        assert_eq!(loaded, ["s_keep", "s_keep2"]);

        let added = store
            .register(ShopRegistration::new("Neu", "Dresden", "neu@example.de"))
            .unwrap();
        let after_add: Vec<ShopId> = store.load().into_iter().map(|s| s.id).collect();
        assert_eq!(
            after_add,
            [ShopId::from("s_keep"), ShopId::from("s_keep2"), added.id.clone()]
        );

        assert!(store.remove(&added.id).unwrap());
        let raw = store.storage().get(DEFAULT_SHOPS_KEY).unwrap().unwrap();
        let items: Vec<serde_json::Value> = serde_json::from_str(&raw).unwrap();
        assert_eq!(items.len(), 3);
        assert_eq!(items[2]["name"], "no id");
        assert_eq!(store.find_by_id(&ShopId::from("s_keep2")).unwrap().offers, [Offer::new("Cut", "")]);
    }

    #[test]
    fn registered_shops_reload_with_derived_coordinates() {
        let shared = Arc::new(InMemoryStorage::new());
        let writer = ShopStore::new(Arc::clone(&shared));
        let cities = ["Hamburg", "München", "Köln", "Düsseldorf", "Leipzig", "Nowhere"];
        let registered: Vec<ShopRecord> = cities
            .iter()
            .enumerate()
            .map(|(index, city)| {
                writer
                    .register(ShopRegistration::new(
                        format!("Salon {index}"),
                        *city,
                        "info@example.de",
                    ))
                    .unwrap()
            })
            .collect();

        let reader = ShopStore::new(Arc::clone(&shared));
        let reloaded = reader.load();
        assert_eq!(reloaded, registered);
        for shop in &reloaded {
            assert_eq!(shop.coordinate(), Some(shop.rederive_coordinate()));
        }
    }

    #[test]
    fn add_then_find_by_id() {
        let store = store();
        let record = shop("s_x", "A", "Hamburg");
        let returned = store.add(record.clone()).unwrap();
        assert_eq!(returned, record);
        assert_eq!(store.find_by_id(&ShopId::from("s_x")), Some(record));
        assert!(store.find_by_id(&ShopId::from("s_y")).is_none());
    }

    #[test]
    fn add_appends_in_order() {
        let store = store();
        for id in ["s_1", "s_2", "s_3"] {
            let _added = store.add(shop(id, id, "Berlin")).unwrap();
        }
        let ids: Vec<String> = store.load().into_iter().map(|s| s.id.into_inner()).collect();
        assert_eq!(ids, ["s_1", "s_2", "s_3"]);
    }

    #[test]
    fn add_allows_duplicate_names() {
        let store = store();
        let _first = store.add(shop("s_1", "Salon", "Berlin")).unwrap();
        let _second = store.add(shop("s_2", "Salon", "Berlin")).unwrap();
        assert_eq!(store.load().len(), 2);
    }

    #[test]
    fn add_rejects_duplicate_id() {
        let store = store();
        let _first = store.add(shop("s_1", "A", "Berlin")).unwrap();
        let err = store.add(shop("s_1", "B", "Hamburg")).unwrap_err();
        assert!(matches!(err, BookWithMeError::DuplicateId(ref id) if id.as_inner() == "s_1"));
        assert_eq!(store.load().len(), 1);
        assert_eq!(store.load()[0].name, "A");
    }

    #[test]
    fn add_writes_ping() {
        let store = store();
        assert!(ping_value(&store).is_none());
        let _added = store.add(shop("s_1", "A", "Berlin")).unwrap();
        assert!(ping_value(&store).is_some());
    }

    #[test]
    fn ping_strictly_increases() {
        let store = store();
        let mut last = 0_i64;
        for _ in 0..20 {
            store.notify_change();
            let current = ping_value(&store).unwrap();
            assert!(current > last);
            last = current;
        }
    }

    #[test]
    fn ping_recovers_from_garbage() {
        let store = store();
        store.storage().set(DEFAULT_PING_KEY, "garbage").unwrap();
        store.notify_change();
        assert!(ping_value(&store).is_some());
    }

    #[test]
    fn remove_is_idempotent() {
        let store = store();
        let _a = store.add(shop("s_1", "A", "Berlin")).unwrap();
        let _b = store.add(shop("s_2", "B", "Berlin")).unwrap();

        assert!(store.remove(&ShopId::from("s_1")).unwrap());
        let after_first = store.load();
        let ping_after_first = ping_value(&store);

        assert!(!store.remove(&ShopId::from("s_1")).unwrap());
        assert_eq!(store.load(), after_first);
        assert_eq!(ping_value(&store), ping_after_first);
        assert_eq!(after_first.len(), 1);
        assert_eq!(after_first[0].id, ShopId::from("s_2"));
    }

    #[test]
    fn remove_absent_on_empty_store() {
        let store = store();
        assert!(!store.remove(&ShopId::from("s_nope")).unwrap());
        assert!(store.storage().is_empty().unwrap());
    }

    #[test]
    fn failed_save_keeps_previous_list() {
        let store = ShopStore::new(InMemoryStorage::with_quota(2_048));
        let _first = store.add(shop("s_1", "A", "Berlin")).unwrap();
        let before = store.load();

        let mut huge = shop("s_2", "B", "Berlin");
        huge.address = Some("x".repeat(4_096));
        let err = store.add(huge).unwrap_err();
        assert!(matches!(err, BookWithMeError::QuotaExceeded { .. }));
        assert!(err.is_storage_failure());
        assert_eq!(store.load(), before);
    }

    #[test]
    fn unavailable_storage_reports_and_preserves() {
        let store = store();
        let _first = store.add(shop("s_1", "A", "Berlin")).unwrap();
        store.storage().set_available(false).unwrap();

        assert!(store.load().is_empty());
        assert!(matches!(
            store.add(shop("s_2", "B", "Berlin")).unwrap_err(),
            BookWithMeError::StorageUnavailable
        ));
        assert!(store.remove(&ShopId::from("s_1")).is_err());
        store.notify_change();

        store.storage().set_available(true).unwrap();
        let ids: Vec<String> = store.load().into_iter().map(|s| s.id.into_inner()).collect();
        assert_eq!(ids, ["s_1"]);
    }

    #[test]
    fn register_validates_and_geocodes() {
        let store = store();
        let record = store
            .register(
                ShopRegistration::new("Salon Sonne", "München", "info@sonne.de")
                    .offer("Haarschnitt", "25 €"),
            )
            .unwrap();
        assert!(record.id.as_inner().starts_with("s_"));
        assert!(record.created_at > 0);
        assert_eq!(
            record.coordinate(),
            Some(geocoder::geocode("muenchen", "Salon Sonne"))
        );
        assert_eq!(store.find_by_id(&record.id), Some(record));
    }

    #[test]
    fn register_rejects_incomplete_form() {
        let store = store();
        let err = store
            .register(ShopRegistration::new("Salon", "  ", "a@b.de"))
            .unwrap_err();
        assert!(matches!(
            err,
            BookWithMeError::MissingField(crate::error::RequiredField::City)
        ));
        assert!(!err.is_storage_failure());
        assert!(store.storage().is_empty().unwrap());
    }

    #[test]
    fn search_filters_loaded_list() {
        let store = store();
        let _a = store.add(shop("s_1", "Salon Sonne", "Berlin")).unwrap();
        let _b = store.add(shop("s_2", "Barber Nord", "Hamburg")).unwrap();
        let found = store.search(&ShopFilter::new().query("nord"));
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, ShopId::from("s_2"));
        assert_eq!(store.search(&ShopFilter::new()).len(), 2);
    }

    #[test]
    fn seed_only_when_empty() {
        let store = store();
        let demo = store.seed_if_empty().unwrap().unwrap();
        assert_eq!(demo.name, "Demo Salon");
        assert_eq!(demo.offers.len(), 2);
        assert_eq!(demo.coordinate(), Some(geocoder::geocode("Berlin", "Demo")));
        assert!(store.seed_if_empty().unwrap().is_none());
        assert_eq!(store.load(), vec![demo]);
    }

    #[test]
    fn builder_requires_storage() {
        let result = ShopStore::<InMemoryStorage>::builder().build();
        assert!(matches!(result, Err(BookWithMeError::Storage(_))));
    }

    #[test]
    fn builder_custom_keys() {
        let keys = StoreKeys {
            shops: "shops".to_owned(),
            ping: "ping".to_owned(),
            delete_request: "delete".to_owned(),
        };
        let store = ShopStore::builder()
            .storage(InMemoryStorage::new())
            .keys(keys)
            .build()
            .unwrap();
        let _added = store.add(shop("s_1", "A", "Berlin")).unwrap();
        assert!(store.storage().get("shops").unwrap().is_some());
        assert!(store.storage().get("ping").unwrap().is_some());
        assert!(store.storage().get(DEFAULT_SHOPS_KEY).unwrap().is_none());
    }

    #[test]
    fn on_change_sees_other_handles() {
        let shared = Arc::new(InMemoryStorage::new());
        let viewer = ShopStore::new(Arc::clone(&shared));
        let editor = ShopStore::new(Arc::clone(&shared));

        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let _id = viewer
            .on_change(move |change| sink.lock().unwrap().push(change.clone()))
            .unwrap();

        shared.set("unrelated", "x").unwrap();
        let _added = editor.add(shop("s_1", "A", "Berlin")).unwrap();

        let changes = seen.lock().unwrap();
        assert_eq!(*changes, [StoreChange::Shops, StoreChange::Ping]);
        assert_eq!(viewer.load().len(), 1);
    }

    #[test]
    fn unsubscribe_stops_callbacks() {
        let store = store();
        let seen = Arc::new(Mutex::new(0_usize));
        let sink = Arc::clone(&seen);
        let id = store
            .on_change(move |_| *sink.lock().unwrap() += 1)
            .unwrap();
        assert!(store.unsubscribe(id).unwrap());
        let _added = store.add(shop("s_1", "A", "Berlin")).unwrap();
        assert_eq!(*seen.lock().unwrap(), 0);
    }

    #[test]
    fn delete_request_consumed_by_watcher() {
        let shared = Arc::new(InMemoryStorage::new());
        let map_view = Arc::new(ShopStore::new(Arc::clone(&shared)));
        let detail_view = ShopStore::new(Arc::clone(&shared));
        let _a = detail_view.add(shop("s_1", "A", "Berlin")).unwrap();
        let _b = detail_view.add(shop("s_2", "B", "Berlin")).unwrap();

        let rendered = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&rendered);
        let _id = map_view
            .watch(move |list| sink.lock().unwrap().push(list.len()))
            .unwrap();

        detail_view.request_delete(&ShopId::from("s_1")).unwrap();

        assert_eq!(shared.get(DEFAULT_DELETE_KEY).unwrap(), None);
        let ids: Vec<String> = detail_view
            .load()
            .into_iter()
            .map(|s| s.id.into_inner())
            .collect();
        assert_eq!(ids, ["s_2"]);
        assert_eq!(rendered.lock().unwrap().last(), Some(&1));
    }

    #[test]
    fn watch_carries_out_request_left_before_start() {
        let shared = Arc::new(InMemoryStorage::new());
        let editor = ShopStore::new(Arc::clone(&shared));
        let _a = editor.add(shop("s_1", "A", "Berlin")).unwrap();
        let _b = editor.add(shop("s_2", "B", "Berlin")).unwrap();
        editor.request_delete(&ShopId::from("s_1")).unwrap();

        let viewer = Arc::new(ShopStore::new(Arc::clone(&shared)));
        let rendered = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&rendered);
        let _id = viewer
            .watch(move |list| sink.lock().unwrap().push(list.len()))
            .unwrap();

        assert_eq!(shared.get(DEFAULT_DELETE_KEY).unwrap(), None);
        let ids: Vec<String> = viewer.load().into_iter().map(|s| s.id.into_inner()).collect();
        assert_eq!(ids, ["s_2"]);
        assert_eq!(rendered.lock().unwrap().last(), Some(&1));
    }

    #[test]
    fn watch_refreshes_on_add() {
        let shared = Arc::new(InMemoryStorage::new());
        let viewer = Arc::new(ShopStore::new(Arc::clone(&shared)));
        let editor = ShopStore::new(Arc::clone(&shared));

        let rendered = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&rendered);
        let _id = viewer
            .watch(move |list| sink.lock().unwrap().push(list.len()))
            .unwrap();
        let _added = editor.add(shop("s_1", "A", "Berlin")).unwrap();

        let counts = rendered.lock().unwrap();
        assert!(!counts.is_empty());
        assert!(counts.iter().all(|&count| count == 1));
    }

    #[test]
    fn watch_stops_after_store_dropped() {
        let shared = Arc::new(InMemoryStorage::new());
        let viewer = Arc::new(ShopStore::new(Arc::clone(&shared)));
        let rendered = Arc::new(Mutex::new(0_usize));
        let sink = Arc::clone(&rendered);
        let _id = viewer.watch(move |_| *sink.lock().unwrap() += 1).unwrap();
        drop(viewer);

        let editor = ShopStore::new(Arc::clone(&shared));
        let _added = editor.add(shop("s_1", "A", "Berlin")).unwrap();
        assert_eq!(*rendered.lock().unwrap(), 0);
    }

    #[test]
    fn interleaved_writers_lose_an_update() {
        let shared = Arc::new(InMemoryStorage::new());
        let tab_a = ShopStore::new(Arc::clone(&shared));
        let tab_b = ShopStore::new(Arc::clone(&shared));

        let mut list_a = tab_a.load();
        let mut list_b = tab_b.load();
        list_a.push(shop("s_a", "A", "Berlin"));
        list_b.push(shop("s_b", "B", "Berlin"));
        tab_a.save(&list_a).unwrap();
        tab_b.save(&list_b).unwrap();

        let ids: Vec<String> = tab_a.load().into_iter().map(|s| s.id.into_inner()).collect();
        assert_eq!(ids, ["s_b"]);
    }

    #[cfg(feature = "storage-file")]
    #[test]
    fn file_backed_instances_sync_through_poll() {
        use crate::storage::FileStorage;

        let dir = tempfile::tempdir().unwrap();
        let viewer = Arc::new(ShopStore::new(
            FileStorage::new(dir.path().to_path_buf()).unwrap(),
        ));
        let editor = ShopStore::new(FileStorage::new(dir.path().to_path_buf()).unwrap());

        let rendered = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&rendered);
        let _id = viewer
            .watch(move |list| sink.lock().unwrap().push(list.len()))
            .unwrap();

        let _added = editor.add(shop("s_1", "A", "Berlin")).unwrap();
        assert!(rendered.lock().unwrap().is_empty());

        assert_eq!(viewer.storage().poll().unwrap(), 2);
        assert_eq!(*rendered.lock().unwrap(), [1, 1]);
        assert_eq!(viewer.load().len(), 1);
    }
}
