//! The `EOPFZARR` driver and its registry.
use std::collections::HashMap;
use std::sync::Arc;

use log::{debug, info};

use crate::address::{ParsedAddress, has_driver_prefix, parse};
use crate::config::{Config, OpenOptions};
use crate::dataset::EopfDataset;
use crate::perf::ScopedTimer;
use crate::store::{StoreOpener, UnderlyingDataset, ZarrStoreOpener};
use crate::subdataset::{SUBDATASETS_DOMAIN, from_metadata};
use crate::{Error, LOG_TARGET, Result};

pub const DRIVER_NAME: &str = "EOPFZARR";
pub const LONG_NAME: &str = "EOPF Zarr Wrapper Driver";
pub const HELP_TOPIC: &str = "drivers/raster/eopfzarr.html";
pub const OPEN_OPTION_LIST: &str = concat!(
    "<OpenOptionList>",
    "<Option name='EOPF_PROCESS' type='boolean' ",
    "description='Enable EOPF georeferencing for paths without the EOPFZARR: prefix' ",
    "default='NO'/>",
    "</OpenOptionList>"
);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Access {
    #[default]
    ReadOnly,
    Update,
}

/// Identify results kept by a [`DriverRegistry`] before the cache is reset.
const IDENTIFY_CACHE_LIMIT: usize = 256;

fn clean_sub_path(path: &str) -> String {
    path.replace('\\', "/").trim_matches('/').to_string()
}

/// Pick the listed sub-path that `requested` refers to: an exact match, else a case-insensitive
/// one, else the only entry whose final component is the bare array name `requested`.
fn match_sub_path<'a>(requested: &str, listed: &[&'a str]) -> Option<&'a str> {
    let requested = clean_sub_path(requested);
    if requested.is_empty() {
        return None;
    }
    let cleaned: Vec<(String, &str)> = listed.iter().map(|p| (clean_sub_path(p), *p)).collect();
    if let Some((_, found)) = cleaned.iter().find(|(c, _)| *c == requested) {
        return Some(*found);
    }
    if let Some((_, found)) = cleaned.iter().find(|(c, _)| c.eq_ignore_ascii_case(&requested)) {
        return Some(*found);
    }
    if requested.contains('/') {
        return None;
    }
    let mut by_name = cleaned
        .iter()
        .filter(|(c, _)| c.rsplit('/').next() == Some(requested.as_str()));
    match (by_name.next(), by_name.next()) {
        (Some((_, found)), None) => Some(*found),
        _ => None,
    }
}

/// Opens EOPF products through a [`StoreOpener`].
pub struct Driver {
    opener: Arc<dyn StoreOpener>,
    config: Config,
}

impl Default for Driver {
    fn default() -> Self {
        Self::new(Arc::new(ZarrStoreOpener::new()), Config::default())
    }
}

impl Driver {
    pub fn new(opener: Arc<dyn StoreOpener>, config: Config) -> Self {
        Self { opener, config }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Whether this driver handles `filename`: it carries the `EOPFZARR:` prefix or the options
    /// request EOPF processing. Update access is never accepted.
    pub fn identify(&self, filename: &str, options: &OpenOptions, access: Access) -> bool {
        if access == Access::Update {
            return false;
        }
        has_driver_prefix(filename) || options.eopf_process()
    }

    pub fn open(
        &self,
        filename: &str,
        options: &OpenOptions,
        access: Access,
    ) -> Result<EopfDataset> {
        let _timer = ScopedTimer::new("open");
        if access == Access::Update {
            return Err(Error::Unsupported(format!(
                "{DRIVER_NAME} driver is read-only"
            )));
        }
        if !self.identify(filename, options, access) {
            return Err(Error::open_failed(filename, "not an EOPFZARR address"));
        }

        let address = parse(filename);
        if address.store_path().is_empty() {
            return Err(Error::open_failed(filename, "empty store path"));
        }
        if !address.is_remote() && !self.opener.exists(address.store_path()) {
            return Err(Error::NotFound(address.store_path().to_string()));
        }

        let forwarded = options.forwarded();
        let inner = if address.is_subdataset() {
            self.open_subdataset(&address, &forwarded)?
        } else {
            self.opener.open(address.store_path(), "", &forwarded)?
        };
        debug!(target: LOG_TARGET, "opened {filename}");
        Ok(EopfDataset::new(
            inner,
            &address,
            self.opener.clone(),
            &self.config,
        ))
    }

    /// Open the sub-path directly, or else find it among the parent's subdatasets.
    fn open_subdataset(
        &self,
        address: &ParsedAddress,
        options: &OpenOptions,
    ) -> Result<Box<dyn UnderlyingDataset>> {
        let store_path = address.store_path();
        let sub_path = address.sub_path();
        let direct_error = match self.opener.open(store_path, sub_path, options) {
            Ok(inner) => return Ok(inner),
            Err(e) => e,
        };
        debug!(
            target: LOG_TARGET,
            "direct open of {} failed ({direct_error}), searching subdatasets",
            address.joined_path()
        );

        let parent = self.opener.open(store_path, "", options)?;
        let listed = parent.metadata(SUBDATASETS_DOMAIN);
        let subdatasets = from_metadata(listed.iter().map(|(k, v)| (k.as_str(), v.as_str())));
        let candidates: Vec<ParsedAddress> = subdatasets.iter().map(|s| parse(&s.name)).collect();
        let sub_paths: Vec<&str> = candidates
            .iter()
            .filter_map(|candidate| {
                if candidate.is_subdataset() {
                    return Some(candidate.sub_path());
                }
                // Remote entries carry the sub-path joined onto the store path.
                candidate
                    .store_path()
                    .strip_prefix(store_path.trim_end_matches('/'))
                    .filter(|rest| rest.starts_with('/'))
            })
            .collect();
        match match_sub_path(sub_path, &sub_paths) {
            Some(found) => {
                debug!(target: LOG_TARGET, "{sub_path} matched listed subdataset {found}");
                self.opener.open(store_path, found, options)
            }
            None => Err(Error::SubdatasetNotFound(sub_path.to_string())),
        }
    }
}

/// Explicitly owned driver registration, with an identify-result cache.
#[derive(Default)]
pub struct DriverRegistry {
    driver: Option<Driver>,
    identified: HashMap<String, bool>,
}

impl DriverRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the default driver if none is registered yet.
    pub fn init(&mut self) -> &Driver {
        self.driver.get_or_insert_with(|| {
            info!(target: LOG_TARGET, "registered {DRIVER_NAME} driver");
            Driver::default()
        })
    }

    /// Register `driver`. Returns `false`, leaving the registration unchanged, if a driver is
    /// already registered.
    pub fn register(&mut self, driver: Driver) -> bool {
        if self.driver.is_some() {
            debug!(target: LOG_TARGET, "{DRIVER_NAME} driver already registered");
            return false;
        }
        info!(target: LOG_TARGET, "registered {DRIVER_NAME} driver");
        self.driver = Some(driver);
        true
    }

    pub fn driver(&self) -> Option<&Driver> {
        self.driver.as_ref()
    }

    pub fn is_registered(&self) -> bool {
        self.driver.is_some()
    }

    /// Whether the registered driver handles `filename` for reading. Results are cached until
    /// teardown; the cache is reset once it holds `IDENTIFY_CACHE_LIMIT` entries.
    pub fn identify(&mut self, filename: &str, options: &OpenOptions) -> bool {
        let Some(driver) = &self.driver else {
            return false;
        };
        let mut key = filename.to_string();
        for option in options.iter() {
            key.push('\n');
            key.push_str(option);
        }
        if self.identified.len() >= IDENTIFY_CACHE_LIMIT && !self.identified.contains_key(&key) {
            self.identified.clear();
        }
        *self
            .identified
            .entry(key)
            .or_insert_with(|| driver.identify(filename, options, Access::ReadOnly))
    }

    pub fn open(
        &self,
        filename: &str,
        options: &OpenOptions,
        access: Access,
    ) -> Result<EopfDataset> {
        self.driver
            .as_ref()
            .ok_or_else(|| Error::general(format!("{DRIVER_NAME} driver is not registered")))?
            .open(filename, options, access)
    }

    /// Deregister the driver and forget cached identifications.
    pub fn teardown(&mut self) {
        if self.driver.take().is_some() {
            info!(target: LOG_TARGET, "deregistered {DRIVER_NAME} driver");
        }
        self.identified.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identify_rules() {
        let driver = Driver::default();
        let none = OpenOptions::new();
        assert!(driver.identify("EOPFZARR:/data/p.zarr", &none, Access::ReadOnly));
        assert!(driver.identify("eopfzarr:\"/data/p.zarr\":x", &none, Access::ReadOnly));
        assert!(!driver.identify("/data/p.zarr", &none, Access::ReadOnly));
        assert!(!driver.identify("ZARR:/data/p.zarr", &none, Access::ReadOnly));
        assert!(!driver.identify("EOPFZARR:/data/p.zarr", &none, Access::Update));

        let eopf = OpenOptions::new().with("EOPF_PROCESS", "YES");
        assert!(driver.identify("/data/p.zarr", &eopf, Access::ReadOnly));
    }

    #[test]
    fn registry_lifecycle() {
        let mut registry = DriverRegistry::new();
        assert!(!registry.is_registered());
        assert!(!registry.identify("EOPFZARR:/x", &OpenOptions::new()));
        assert!(registry.open("EOPFZARR:/x", &OpenOptions::new(), Access::ReadOnly).is_err());

        registry.init();
        assert!(registry.is_registered());
        assert!(!registry.register(Driver::default()));
        assert!(registry.identify("EOPFZARR:/x", &OpenOptions::new()));

        registry.teardown();
        assert!(!registry.is_registered());
        assert!(registry.driver().is_none());
    }

    #[test]
    fn update_access_is_rejected() {
        let err = Driver::default()
            .open("EOPFZARR:/data/p.zarr", &OpenOptions::new(), Access::Update)
            .err();
        assert!(matches!(err, Some(Error::Unsupported(_))));
    }

    #[test]
    fn missing_main_path() {
        let err = Driver::default()
            .open(
                "EOPFZARR:/definitely/not/here.zarr",
                &OpenOptions::new(),
                Access::ReadOnly,
            )
            .err();
        assert!(matches!(err, Some(Error::NotFound(_))));
    }

    #[test]
    fn sub_path_matching() {
        let listed = [
            "/measurements/r10m/b02",
            "/measurements/r20m/b02",
            "/measurements/r20m/b05",
            "/quality/mask",
        ];
        assert_eq!(
            match_sub_path("measurements/r10m/b02", &listed),
            Some("/measurements/r10m/b02")
        );
        assert_eq!(
            match_sub_path("\\Measurements\\R20M\\B05\\", &listed),
            Some("/measurements/r20m/b05")
        );
        assert_eq!(match_sub_path("mask", &listed), Some("/quality/mask"));
        // Ambiguous bare names do not match.
        assert_eq!(match_sub_path("b02", &listed), None);
        assert_eq!(match_sub_path("r10m/b03", &listed), None);
        assert_eq!(match_sub_path("/", &listed), None);
    }

    #[test]
    fn identify_cache_is_bounded() {
        let mut registry = DriverRegistry::new();
        registry.init();
        for i in 0..IDENTIFY_CACHE_LIMIT + 10 {
            assert!(registry.identify(&format!("EOPFZARR:/data/{i}.zarr"), &OpenOptions::new()));
        }
        assert!(registry.identified.len() <= IDENTIFY_CACHE_LIMIT);
    }
}
