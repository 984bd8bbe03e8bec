//! The opened EOPF dataset.
use std::sync::Arc;

use log::debug;

use crate::LOG_TARGET;
use crate::address::{ParsedAddress, is_network_path};
use crate::cache::MetadataCache;
use crate::config::Config;
use crate::georef::{GeoContext, GeoTransform, Resolver};
use crate::perf::ScopedTimer;
use crate::store::{StoreOpener, UnderlyingDataset};
use crate::subdataset::{self, SUBDATASETS_DOMAIN, Subdataset};

/// Metadata domain carrying the driver marker.
pub const EOPF_DOMAIN: &str = "EOPF";

/// An underlying dataset with resolved EOPF georeferencing.
///
/// Georeferencing is read-only: the setters accept and discard writes.
pub struct EopfDataset {
    inner: Box<dyn UnderlyingDataset>,
    opener: Arc<dyn StoreOpener>,
    store_path: String,
    subdataset_path: Option<String>,
    geo: GeoContext,
    cache: MetadataCache,
}

impl EopfDataset {
    pub fn new(
        inner: Box<dyn UnderlyingDataset>,
        address: &ParsedAddress,
        opener: Arc<dyn StoreOpener>,
        config: &Config,
    ) -> Self {
        let _timer = ScopedTimer::new("wrap dataset");
        let mut resolver = Resolver::new(config.resolver.clone());
        if let Some(name) = address
            .store_path()
            .rsplit(['/', '\\'])
            .find(|part| !part.is_empty())
        {
            resolver = resolver.with_dataset_name(name);
        }
        let geo = resolver.resolve(inner.attributes());
        debug!(
            target: LOG_TARGET,
            "wrapped {} (EPSG:{}, {:?} bounds)",
            inner.description(),
            geo.epsg,
            geo.bounds_origin
        );
        Self {
            inner,
            opener,
            store_path: address.store_path().to_string(),
            subdataset_path: address.is_subdataset().then(|| address.sub_path().to_string()),
            geo,
            cache: MetadataCache::new(&config.cache),
        }
    }

    pub fn description(&self) -> &str {
        self.inner.description()
    }

    pub fn raster_size(&self) -> (u64, u64) {
        self.inner.raster_size()
    }

    pub fn store_path(&self) -> &str {
        &self.store_path
    }

    /// The sub-path this dataset was opened with, if opened as a subdataset.
    pub fn subdataset_path(&self) -> Option<&str> {
        self.subdataset_path.as_deref()
    }

    pub fn geo_context(&self) -> &GeoContext {
        &self.geo
    }

    pub fn underlying(&self) -> &dyn UnderlyingDataset {
        self.inner.as_ref()
    }

    pub fn cache(&self) -> &MetadataCache {
        &self.cache
    }

    /// The geotransform, derived from the bounding box and raster size on first use.
    pub fn geo_transform(&mut self) -> Option<GeoTransform> {
        if let Some(gt) = self.cache.geo_transform() {
            return Some(gt);
        }
        let (width, height) = self.inner.raster_size();
        let gt = self.geo.ensure_geotransform(width, height)?;
        self.cache.set_geo_transform(gt);
        Some(gt)
    }

    /// WKT of the spatial reference.
    pub fn spatial_ref(&mut self) -> Option<String> {
        if let Some(wkt) = self.cache.spatial_ref() {
            return Some(wkt.to_string());
        }
        if self.geo.srs_wkt.is_empty() {
            return None;
        }
        self.cache.set_spatial_ref(self.geo.srs_wkt.clone());
        Some(self.geo.srs_wkt.clone())
    }

    /// Accepted and ignored.
    pub fn set_geo_transform(&mut self, _gt: GeoTransform) -> crate::Result<()> {
        debug!(target: LOG_TARGET, "ignoring geo_transform write on read-only dataset");
        Ok(())
    }

    /// Accepted and ignored.
    pub fn set_spatial_ref(&mut self, _wkt: &str) -> crate::Result<()> {
        debug!(target: LOG_TARGET, "ignoring spatial_ref write on read-only dataset");
        Ok(())
    }

    /// Subdatasets of the underlying store in `EOPFZARR:` addresses.
    pub fn subdatasets(&mut self) -> Vec<Subdataset> {
        if let Some(cached) = self.cache.subdatasets(&self.store_path) {
            return cached.to_vec();
        }
        let _timer = ScopedTimer::new("enumerate subdatasets");
        let underlying = self.inner.metadata(SUBDATASETS_DOMAIN);
        let source = subdataset::from_metadata(
            underlying.iter().map(|(k, v)| (k.as_str(), v.as_str())),
        );
        let rewritten = subdataset::enumerate(&source);
        debug!(
            target: LOG_TARGET,
            "found {} subdatasets in {}",
            rewritten.len(),
            self.store_path
        );
        self.cache
            .set_subdatasets(&self.store_path, rewritten.clone());
        rewritten
    }

    /// All items of a metadata domain.
    ///
    /// The default domain holds the underlying store's items overlaid with the resolved
    /// georeferencing.
    pub fn metadata(&mut self, domain: &str) -> Vec<(String, String)> {
        if let Some(items) = self.cache.metadata_list(domain) {
            return items.to_vec();
        }
        let items = match domain {
            "" => self.default_metadata(),
            SUBDATASETS_DOMAIN => subdataset::to_metadata(&self.subdatasets()),
            EOPF_DOMAIN => vec![
                ("EOPF_PRODUCT".to_string(), "YES".to_string()),
                ("EOPFZARR_WRAPPER".to_string(), "YES".to_string()),
            ],
            other => self.inner.metadata(other),
        };
        self.cache.set_metadata_list(domain, items.clone());
        items
    }

    fn default_metadata(&mut self) -> Vec<(String, String)> {
        let _ = self.geo_transform();
        let subdataset_count = self.subdatasets().len();

        let mut items = self.inner.metadata("");
        let mut upsert = |key: &str, value: String| {
            match items.iter_mut().find(|(k, _)| k == key) {
                Some(item) => item.1 = value,
                None => items.push((key.to_string(), value)),
            }
        };
        for (key, value) in self.geo.metadata_items() {
            upsert(&key, value);
        }
        upsert("EOPF_PRODUCT", "YES".to_string());
        upsert("SUBDATASET_COUNT", subdataset_count.to_string());
        if let Some(path) = &self.subdataset_path {
            upsert("SUBDATASET_PATH", path.clone());
        }
        items
    }

    /// One metadata item.
    pub fn metadata_item(&mut self, key: &str, domain: &str) -> Option<String> {
        if let Some(value) = self.cache.metadata_item(domain, key) {
            return Some(value.to_string());
        }
        let value = self
            .metadata(domain)
            .into_iter()
            .find_map(|(k, v)| (k == key).then_some(v))?;
        self.cache.set_metadata_item(domain, key, value.clone());
        Some(value)
    }

    /// Whether `path` exists; results for network paths are cached.
    pub fn file_exists(&mut self, path: &str) -> bool {
        if !is_network_path(path) {
            return self.opener.exists(path);
        }
        if let Some(exists) = self.cache.network_exists(path) {
            return exists;
        }
        let exists = self.opener.exists(path);
        self.cache.set_network_exists(path, exists);
        exists
    }

    /// Drop expired cache entries, returning how many were removed.
    pub fn clear_expired(&mut self) -> usize {
        self.cache.clear_expired()
    }

    /// Release cached values. The dataset stays usable and recomputes on demand.
    pub fn close(&mut self) {
        debug!(target: LOG_TARGET, "closing {}", self.store_path);
        self.cache.clear_all();
    }
}

impl std::fmt::Debug for EopfDataset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EopfDataset")
            .field("description", &self.inner.description())
            .field("store_path", &self.store_path)
            .field("subdataset_path", &self.subdataset_path)
            .field("geo", &self.geo)
            .finish_non_exhaustive()
    }
}
