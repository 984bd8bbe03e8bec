//! Time-boxed caches owned by an open dataset.
//!
//! Expiry is lazy: an entry older than its TTL reads as a miss and is replaced by the next
//! `set`. Nothing sweeps in the background; [`MetadataCache::clear_expired`] drops stale entries
//! when called.
use std::borrow::Borrow;
use std::collections::HashMap;
use std::hash::Hash;
use std::time::{Duration, Instant};

use crate::config::CacheConfig;
use crate::georef::GeoTransform;
use crate::subdataset::Subdataset;

#[derive(Debug, Clone)]
pub struct CacheEntry<T> {
    value: T,
    created_at: Instant,
    ttl: Duration,
}

impl<T> CacheEntry<T> {
    pub fn new(value: T, ttl: Duration) -> Self {
        Self {
            value,
            created_at: Instant::now(),
            ttl,
        }
    }

    pub fn is_expired(&self) -> bool {
        self.created_at.elapsed() > self.ttl
    }

    /// The value, unless expired.
    pub fn get(&self) -> Option<&T> {
        (!self.is_expired()).then_some(&self.value)
    }
}

/// Entries of one cache class, sharing a TTL.
#[derive(Debug, Clone)]
pub struct TimedMap<K, V> {
    ttl: Duration,
    entries: HashMap<K, CacheEntry<V>>,
}

impl<K: Eq + Hash, V> TimedMap<K, V> {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: HashMap::new(),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn get<Q>(&self, key: &Q) -> Option<&V>
    where
        K: Borrow<Q>,
        Q: Eq + Hash + ?Sized,
    {
        self.entries.get(key).and_then(CacheEntry::get)
    }

    pub fn has<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Eq + Hash + ?Sized,
    {
        self.get(key).is_some()
    }

    /// Store `value`, replacing any previous entry and restarting its TTL.
    pub fn set(&mut self, key: K, value: V) {
        self.entries.insert(key, CacheEntry::new(value, self.ttl));
    }

    /// Drop expired entries, returning how many were removed.
    pub fn remove_expired(&mut self) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, entry| !entry.is_expired());
        before - self.entries.len()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Number of stored entries, expired or not.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn item_key(domain: &str, key: &str) -> String {
    format!("{domain}\u{1f}{key}")
}

/// The caches of one open dataset.
#[derive(Debug, Clone)]
pub struct MetadataCache {
    metadata_items: TimedMap<String, String>,
    network_existence: TimedMap<String, bool>,
    subdatasets: TimedMap<String, Vec<Subdataset>>,
    metadata_lists: TimedMap<String, Vec<(String, String)>>,
    spatial_ref: TimedMap<(), String>,
    geo_transform: TimedMap<(), GeoTransform>,
}

impl Default for MetadataCache {
    fn default() -> Self {
        Self::new(&CacheConfig::default())
    }
}

impl MetadataCache {
    pub fn new(config: &CacheConfig) -> Self {
        Self {
            metadata_items: TimedMap::new(config.ttl),
            network_existence: TimedMap::new(config.remote_ttl),
            subdatasets: TimedMap::new(config.ttl),
            metadata_lists: TimedMap::new(config.ttl),
            spatial_ref: TimedMap::new(config.ttl),
            geo_transform: TimedMap::new(config.ttl),
        }
    }

    pub fn metadata_item(&self, domain: &str, key: &str) -> Option<&str> {
        self.metadata_items
            .get(&item_key(domain, key))
            .map(String::as_str)
    }

    pub fn has_metadata_item(&self, domain: &str, key: &str) -> bool {
        self.metadata_items.has(&item_key(domain, key))
    }

    pub fn set_metadata_item(&mut self, domain: &str, key: &str, value: impl Into<String>) {
        self.metadata_items
            .set(item_key(domain, key), value.into());
    }

    pub fn network_exists(&self, path: &str) -> Option<bool> {
        self.network_existence.get(path).copied()
    }

    pub fn set_network_exists(&mut self, path: &str, exists: bool) {
        self.network_existence.set(path.to_string(), exists);
    }

    pub fn subdatasets(&self, key: &str) -> Option<&[Subdataset]> {
        self.subdatasets.get(key).map(Vec::as_slice)
    }

    pub fn set_subdatasets(&mut self, key: &str, subdatasets: Vec<Subdataset>) {
        self.subdatasets.set(key.to_string(), subdatasets);
    }

    /// The full item list of a metadata domain.
    pub fn metadata_list(&self, domain: &str) -> Option<&[(String, String)]> {
        self.metadata_lists.get(domain).map(Vec::as_slice)
    }

    pub fn set_metadata_list(&mut self, domain: &str, items: Vec<(String, String)>) {
        self.metadata_lists.set(domain.to_string(), items);
    }

    pub fn spatial_ref(&self) -> Option<&str> {
        self.spatial_ref.get(&()).map(String::as_str)
    }

    pub fn set_spatial_ref(&mut self, wkt: impl Into<String>) {
        self.spatial_ref.set((), wkt.into());
    }

    pub fn geo_transform(&self) -> Option<GeoTransform> {
        self.geo_transform.get(&()).copied()
    }

    pub fn set_geo_transform(&mut self, gt: GeoTransform) {
        self.geo_transform.set((), gt);
    }

    /// Drop expired entries from every class, returning how many were removed.
    pub fn clear_expired(&mut self) -> usize {
        self.metadata_items.remove_expired()
            + self.network_existence.remove_expired()
            + self.subdatasets.remove_expired()
            + self.metadata_lists.remove_expired()
            + self.spatial_ref.remove_expired()
            + self.geo_transform.remove_expired()
    }

    pub fn clear_all(&mut self) {
        self.metadata_items.clear();
        self.network_existence.clear();
        self.subdatasets.clear();
        self.metadata_lists.clear();
        self.spatial_ref.clear();
        self.geo_transform.clear();
    }

    /// Number of stored entries across all classes, expired or not.
    pub fn len(&self) -> usize {
        self.metadata_items.len()
            + self.network_existence.len()
            + self.subdatasets.len()
            + self.metadata_lists.len()
            + self.spatial_ref.len()
            + self.geo_transform.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
