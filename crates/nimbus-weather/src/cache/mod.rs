//! Persistent grouped TTL cache with location and alias registries.
//!
//! Every operation runs as one read-modify-write cycle under a single process-wide
//! mutex: load the whole store, apply the daily epoch reset, operate, and write back.
//! Cache I/O failures are logged and absorbed; callers never see them.
//!
//! Async callers use the `*_async` methods, which move the blocking cycle onto
//! tokio's blocking pool.

mod backend;
mod types;

pub use backend::{CacheBackend, FileBackend, MemoryBackend};
pub use types::{CacheEntry, CacheFile, CacheGroup, LocationRecord, LocationSummary};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;

use crate::clock::Clock;

/// Short-lived points metadata, keyed only by coordinates
pub const POINTS_GROUP: &str = "points_api";
/// Long-lived alert zone geometry
pub const ZONES_GROUP: &str = "alert_zones";
pub const GEOCODE_GROUP: &str = "geocode";
pub const DEFAULT_GROUP: &str = "default";

/// Cache group holding all data for one canonical location.
pub fn location_group(location_key: Option<&str>) -> String {
    match location_key.map(str::trim).filter(|k| !k.is_empty()) {
        Some(key) => format!("loc:{}", key),
        None => DEFAULT_GROUP.to_string(),
    }
}

/// Canonical `"City, State"` key.
pub fn location_key(city: &str, state: &str) -> Option<String> {
    let city = city.trim();
    let state = state.trim();
    if city.is_empty() || state.is_empty() {
        return None;
    }
    Some(format!("{}, {}", city, state))
}

/// Alias for a coordinate pair rounded to 4 decimal places.
pub fn coordinate_alias(lat: f64, lon: f64) -> String {
    format!("coord:{:.4},{:.4}", lat, lon)
}

/// Alias for free-text address input.
pub fn address_alias(address: &str) -> Option<String> {
    let cleaned = address.trim().to_lowercase();
    if cleaned.is_empty() {
        return None;
    }
    Some(format!("addr:{}", cleaned))
}

pub struct CacheStore {
    backend: Box<dyn CacheBackend>,
    clock: Arc<dyn Clock>,
    lock: Mutex<()>,
}

impl CacheStore {
    pub fn new(backend: Box<dyn CacheBackend>, clock: Arc<dyn Clock>) -> Self {
        Self {
            backend,
            clock,
            lock: Mutex::new(()),
        }
    }

    /// Store backed by memory only (for testing).
    pub fn in_memory(clock: Arc<dyn Clock>) -> Self {
        Self::new(Box::new(MemoryBackend::new()), clock)
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Run `op` against the loaded store. The store is written back when `write` is set
    /// or when the epoch reset fired during load.
    fn transact<R>(&self, write: bool, op: impl FnOnce(&mut CacheFile, DateTime<Utc>) -> R) -> R {
        let _guard = self.lock.lock();
        let today = self.clock.today();
        let now = self.clock.now();

        let mut file = self
            .backend
            .load()
            .unwrap_or_else(|| CacheFile::empty(today));
        let rolled = file.ensure_epoch(today);
        if rolled {
            tracing::info!("Cache epoch rolled over to {}", today);
        }

        let result = op(&mut file, now);

        if write || rolled {
            if let Err(e) = self.backend.save(&file) {
                tracing::warn!("Discarding failed cache write: {}", e);
            }
        }
        result
    }

    /// Cached value for `fingerprint` in `group`, if it has not expired.
    pub fn get(&self, group: &str, fingerprint: &str) -> Option<serde_json::Value> {
        self.transact(false, |file, now| {
            file.groups
                .get(group)
                .and_then(|g| g.get(fingerprint))
                .filter(|entry| entry.is_live(now))
                .map(|entry| entry.value.clone())
        })
    }

    /// Store `value` for `ttl`. Expired entries in the same group are pruned first.
    pub fn put(&self, group: &str, fingerprint: &str, value: serde_json::Value, ttl: Duration) {
        self.transact(true, |file, now| {
            let entries = file.groups.entry(group.to_string()).or_default();
            types::prune_group(entries, now);
            entries.insert(
                fingerprint.to_string(),
                CacheEntry {
                    expires_at: types::expiry(now, ttl),
                    value,
                },
            );
        });
    }

    pub fn purge_group(&self, group: &str) {
        if group.is_empty() {
            return;
        }
        self.transact(true, |file, _| {
            file.groups.remove(group);
        });
    }

    /// Drop all persisted state, including registries.
    pub fn purge_all(&self) {
        let _guard = self.lock.lock();
        if let Err(e) = self.backend.clear() {
            tracing::warn!("Failed to clear cache: {}", e);
        }
    }

    pub fn purge_location(&self, location_key: &str) {
        if location_key.trim().is_empty() {
            return;
        }
        self.purge_group(&location_group(Some(location_key)));
    }

    /// Remove a location record, its cache group, and aliases pointing at it.
    pub fn delete_location(&self, location_key: &str) {
        if location_key.trim().is_empty() {
            return;
        }
        self.transact(true, |file, _| {
            file.groups.remove(&location_group(Some(location_key)));
            file.locations.remove(location_key);
            file.aliases.retain(|_, target| target != location_key);
        });
    }

    pub fn resolve_alias(&self, alias: &str) -> Option<String> {
        if alias.is_empty() {
            return None;
        }
        self.transact(false, |file, _| file.aliases.get(alias).cloned())
    }

    /// Point `alias` at `canonical`. Last write wins.
    pub fn register_alias(&self, alias: &str, canonical: &str) {
        if alias.is_empty() || canonical.is_empty() {
            return;
        }
        self.transact(true, |file, _| {
            file.aliases.insert(alias.to_string(), canonical.to_string());
        });
        tracing::debug!("Registered alias {} -> {}", alias, canonical);
    }

    pub fn register_location(&self, location_key: &str, label: &str, lat: f64, lon: f64) {
        if location_key.is_empty() {
            return;
        }
        let label = if label.trim().is_empty() {
            location_key
        } else {
            label
        };
        self.transact(true, |file, now| {
            file.locations.insert(
                location_key.to_string(),
                LocationRecord {
                    label: label.to_string(),
                    lat,
                    lon,
                    updated_at: now,
                },
            );
        });
    }

    /// Known locations sorted case-insensitively by label.
    pub fn list_locations(&self) -> Vec<LocationSummary> {
        let mut locations = self.transact(false, |file, _| {
            file.locations
                .iter()
                .map(|(key, record)| LocationSummary {
                    key: key.clone(),
                    label: record.label.clone(),
                    lat: record.lat,
                    lon: record.lon,
                })
                .collect::<Vec<_>>()
        });
        locations.sort_by_key(|l| l.label.to_lowercase());
        locations
    }
}

impl CacheStore {
    /// Run `op` on the blocking pool. `None` if the task was cancelled or panicked.
    async fn offload<R, F>(self: &Arc<Self>, op: F) -> Option<R>
    where
        F: FnOnce(&CacheStore) -> R + Send + 'static,
        R: Send + 'static,
    {
        let store = Arc::clone(self);
        match tokio::task::spawn_blocking(move || op(&*store)).await {
            Ok(result) => Some(result),
            Err(e) => {
                tracing::warn!("Cache task failed: {}", e);
                None
            }
        }
    }

    pub async fn get_async(self: &Arc<Self>, group: &str, fingerprint: &str) -> Option<serde_json::Value> {
        let group = group.to_string();
        let fingerprint = fingerprint.to_string();
        self.offload(move |store| store.get(&group, &fingerprint))
            .await
            .flatten()
    }

    pub async fn put_async(
        self: &Arc<Self>,
        group: &str,
        fingerprint: &str,
        value: serde_json::Value,
        ttl: Duration,
    ) {
        let group = group.to_string();
        let fingerprint = fingerprint.to_string();
        self.offload(move |store| store.put(&group, &fingerprint, value, ttl))
            .await;
    }

    pub async fn resolve_alias_async(self: &Arc<Self>, alias: &str) -> Option<String> {
        let alias = alias.to_string();
        self.offload(move |store| store.resolve_alias(&alias))
            .await
            .flatten()
    }

    pub async fn register_alias_async(self: &Arc<Self>, alias: &str, canonical: &str) {
        let alias = alias.to_string();
        let canonical = canonical.to_string();
        self.offload(move |store| store.register_alias(&alias, &canonical))
            .await;
    }

    pub async fn register_location_async(self: &Arc<Self>, location_key: &str, label: &str, lat: f64, lon: f64) {
        let location_key = location_key.to_string();
        let label = label.to_string();
        self.offload(move |store| store.register_location(&location_key, &label, lat, lon))
            .await;
    }

    pub async fn list_locations_async(self: &Arc<Self>) -> Vec<LocationSummary> {
        self.offload(|store| store.list_locations())
            .await
            .unwrap_or_default()
    }

    pub async fn purge_all_async(self: &Arc<Self>) {
        self.offload(|store| store.purge_all()).await;
    }

    pub async fn purge_location_async(self: &Arc<Self>, location_key: &str) {
        let location_key = location_key.to_string();
        self.offload(move |store| store.purge_location(&location_key))
            .await;
    }

    pub async fn delete_location_async(self: &Arc<Self>, location_key: &str) {
        let location_key = location_key.to_string();
        self.offload(move |store| store.delete_location(&location_key))
            .await;
    }
}

impl std::fmt::Debug for CacheStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheStore").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]
    use super::*;
    use crate::clock::ManualClock;
    use chrono::TimeZone;
    use serde_json::json;

    fn clock() -> Arc<ManualClock> {
        let start = Utc.with_ymd_and_hms(2024, 7, 1, 15, 0, 0).unwrap();
        Arc::new(ManualClock::new(start))
    }

    fn store(clock: &Arc<ManualClock>) -> CacheStore {
        CacheStore::in_memory(clock.clone())
    }

    #[test]
    fn test_put_then_get() {
        let clock = clock();
        let store = store(&clock);
        store.put("loc:Pittsburgh, PA", "https://x/forecast", json!({"a": 1}), Duration::from_secs(300));
        assert_eq!(
            store.get("loc:Pittsburgh, PA", "https://x/forecast"),
            Some(json!({"a": 1}))
        );
        assert_eq!(store.get("loc:Erie, PA", "https://x/forecast"), None);
    }

    #[test]
    fn test_expired_entry_is_absent() {
        let clock = clock();
        let store = store(&clock);
        store.put(POINTS_GROUP, "k", json!(1), Duration::from_secs(300));
        clock.advance(chrono::Duration::seconds(300));
        assert_eq!(store.get(POINTS_GROUP, "k"), None);
    }

    #[test]
    fn test_get_does_not_delete_expired_entries() {
        let clock = clock();
        let backend = Arc::new(MemoryBackend::new());
        let store = CacheStore::new(Box::new(SharedBackend(backend.clone())), clock.clone());
        store.put(POINTS_GROUP, "old", json!(1), Duration::from_secs(10));
        clock.advance(chrono::Duration::seconds(20));

        assert_eq!(store.get(POINTS_GROUP, "old"), None);
        assert!(backend.raw().unwrap().contains("\"old\""));

        store.put(POINTS_GROUP, "new", json!(2), Duration::from_secs(10));
        let raw = backend.raw().unwrap();
        assert!(!raw.contains("\"old\""));
        assert!(raw.contains("\"new\""));
    }

    #[test]
    fn test_prune_only_touches_written_group() {
        let clock = clock();
        let backend = Arc::new(MemoryBackend::new());
        let store = CacheStore::new(Box::new(SharedBackend(backend.clone())), clock.clone());
        store.put("loc:A, ST", "stale", json!(1), Duration::from_secs(10));
        clock.advance(chrono::Duration::seconds(20));
        store.put("loc:B, ST", "fresh", json!(2), Duration::from_secs(10));

        assert!(backend.raw().unwrap().contains("\"stale\""));
    }

    #[test]
    fn test_epoch_rollover_discards_everything() {
        let clock = clock();
        let store = store(&clock);
        store.put("loc:Pittsburgh, PA", "k", json!(1), Duration::from_secs(7 * 24 * 3600));
        store.register_alias("coord:40.4406,-79.9959", "Pittsburgh, PA");
        store.register_location("Pittsburgh, PA", "Pittsburgh, PA", 40.4406, -79.9959);

        clock.advance(chrono::Duration::days(1));

        assert_eq!(store.get("loc:Pittsburgh, PA", "k"), None);
        assert_eq!(store.resolve_alias("coord:40.4406,-79.9959"), None);
        assert!(store.list_locations().is_empty());
    }

    #[test]
    fn test_alias_last_write_wins() {
        let clock = clock();
        let store = store(&clock);
        store.register_alias("addr:15213", "Pittsburgh, PA");
        store.register_alias("addr:15213", "Oakland, PA");
        assert_eq!(store.resolve_alias("addr:15213").as_deref(), Some("Oakland, PA"));
    }

    #[test]
    fn test_register_alias_ignores_empty_keys() {
        let clock = clock();
        let backend = Arc::new(MemoryBackend::new());
        let store = CacheStore::new(Box::new(SharedBackend(backend.clone())), clock);
        store.register_alias("", "Pittsburgh, PA");
        store.register_alias("coord:1.0000,1.0000", "");
        assert!(backend.raw().is_none());
    }

    #[test]
    fn test_list_locations_sorted_case_insensitively() {
        let clock = clock();
        let store = store(&clock);
        store.register_location("erie, PA", "erie, PA", 42.1, -80.1);
        store.register_location("Altoona, PA", "Altoona, PA", 40.5, -78.4);
        store.register_location("Butler, PA", "", 40.9, -79.9);

        let labels: Vec<_> = store.list_locations().into_iter().map(|l| l.label).collect();
        assert_eq!(labels, vec!["Altoona, PA", "Butler, PA", "erie, PA"]);
    }

    #[test]
    fn test_delete_location_removes_record_group_and_aliases() {
        let clock = clock();
        let store = store(&clock);
        store.register_location("Erie, PA", "Erie, PA", 42.1, -80.1);
        store.register_location("Altoona, PA", "Altoona, PA", 40.5, -78.4);
        store.register_alias("coord:42.1000,-80.1000", "Erie, PA");
        store.put("loc:Erie, PA", "k", json!(1), Duration::from_secs(300));
        store.put("loc:Altoona, PA", "k", json!(2), Duration::from_secs(300));

        store.delete_location("Erie, PA");

        assert_eq!(store.get("loc:Erie, PA", "k"), None);
        assert_eq!(store.get("loc:Altoona, PA", "k"), Some(json!(2)));
        assert_eq!(store.resolve_alias("coord:42.1000,-80.1000"), None);
        let keys: Vec<_> = store.list_locations().into_iter().map(|l| l.key).collect();
        assert_eq!(keys, vec!["Altoona, PA"]);
    }

    #[test]
    fn test_purge_location_keeps_record() {
        let clock = clock();
        let store = store(&clock);
        store.register_location("Erie, PA", "Erie, PA", 42.1, -80.1);
        store.put("loc:Erie, PA", "k", json!(1), Duration::from_secs(300));
        store.purge_location("Erie, PA");
        assert_eq!(store.get("loc:Erie, PA", "k"), None);
        assert_eq!(store.list_locations().len(), 1);
    }

    #[test]
    fn test_purge_all() {
        let clock = clock();
        let store = store(&clock);
        store.put(POINTS_GROUP, "k", json!(1), Duration::from_secs(300));
        store.register_location("Erie, PA", "Erie, PA", 42.1, -80.1);
        store.purge_all();
        assert_eq!(store.get(POINTS_GROUP, "k"), None);
        assert!(store.list_locations().is_empty());
    }

    #[test]
    fn test_corrupt_store_reads_as_empty() {
        let clock = clock();
        let store = CacheStore::new(Box::new(MemoryBackend::with_raw("garbage")), clock);
        assert_eq!(store.get(POINTS_GROUP, "k"), None);
        store.put(POINTS_GROUP, "k", json!(true), Duration::from_secs(60));
        assert_eq!(store.get(POINTS_GROUP, "k"), Some(json!(true)));
    }

    #[test]
    fn test_file_store_survives_restart() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache.json");
        let clock = clock();

        {
            let store = CacheStore::new(Box::new(FileBackend::new(&path)), clock.clone());
            store.put("loc:Erie, PA", "k", json!({"v": 3}), Duration::from_secs(300));
            store.register_alias("addr:erie", "Erie, PA");
        }

        let reopened = CacheStore::new(Box::new(FileBackend::new(&path)), clock);
        assert_eq!(reopened.get("loc:Erie, PA", "k"), Some(json!({"v": 3})));
        assert_eq!(reopened.resolve_alias("addr:erie").as_deref(), Some("Erie, PA"));
    }

    #[test]
    fn test_unwritable_path_is_absorbed() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("blocker");
        std::fs::write(&blocker, "file, not a directory").unwrap();
        let clock = clock();
        let store = CacheStore::new(Box::new(FileBackend::new(blocker.join("cache.json"))), clock);

        store.put(POINTS_GROUP, "k", json!(1), Duration::from_secs(60));
        assert_eq!(store.get(POINTS_GROUP, "k"), None);
    }

    #[test]
    fn test_oversized_ttl_is_clamped() {
        let clock = clock();
        let store = store(&clock);
        store.put(ZONES_GROUP, "k", json!(1), Duration::MAX);
        assert_eq!(store.get(ZONES_GROUP, "k"), Some(json!(1)));

        clock.advance(chrono::Duration::hours(1));
        assert_eq!(store.get(ZONES_GROUP, "k"), Some(json!(1)));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_async_operations_share_file_store() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache.json");
        let clock = clock();
        let store = Arc::new(CacheStore::new(Box::new(FileBackend::new(&path)), clock.clone()));

        let writers = (0..8).map(|i| {
            let store = store.clone();
            tokio::spawn(async move {
                let group = format!("loc:City{}, PA", i);
                store.put_async(&group, "k", json!(i), Duration::from_secs(300)).await;
                store
                    .register_location_async(&format!("City{}, PA", i), "", 40.0, -80.0)
                    .await;
                store.register_alias_async(&format!("addr:city{}", i), &format!("City{}, PA", i)).await;
            })
        });
        for writer in writers.collect::<Vec<_>>() {
            writer.await.unwrap();
        }

        assert_eq!(store.list_locations_async().await.len(), 8);
        assert_eq!(store.get_async("loc:City3, PA", "k").await, Some(json!(3)));
        assert_eq!(
            store.resolve_alias_async("addr:city5").await.as_deref(),
            Some("City5, PA")
        );

        store.delete_location_async("City5, PA").await;
        assert_eq!(store.resolve_alias_async("addr:city5").await, None);
        store.purge_location_async("City3, PA").await;
        assert_eq!(store.get_async("loc:City3, PA", "k").await, None);

        let reopened = CacheStore::new(Box::new(FileBackend::new(&path)), clock);
        assert_eq!(reopened.list_locations().len(), 7);

        store.purge_all_async().await;
        assert!(!path.exists());
    }

    #[test]
    fn test_key_helpers() {
        assert_eq!(location_group(Some("Pittsburgh, PA")), "loc:Pittsburgh, PA");
        assert_eq!(location_group(None), DEFAULT_GROUP);
        assert_eq!(location_group(Some("  ")), DEFAULT_GROUP);
        assert_eq!(location_key(" Pittsburgh ", "PA").as_deref(), Some("Pittsburgh, PA"));
        assert_eq!(location_key("", "PA"), None);
        assert_eq!(coordinate_alias(40.44061, -79.99589), "coord:40.4406,-79.9959");
        assert_eq!(address_alias("  15213 ").as_deref(), Some("addr:15213"));
        assert_eq!(address_alias("   "), None);
    }

    /// Lets a test inspect what the store persisted.
    struct SharedBackend(Arc<MemoryBackend>);

    impl CacheBackend for SharedBackend {
        fn load(&self) -> Option<CacheFile> {
            self.0.load()
        }

        fn save(&self, file: &CacheFile) -> std::io::Result<()> {
            self.0.save(file)
        }

        fn clear(&self) -> std::io::Result<()> {
            self.0.clear()
        }
    }
}
