//! Resolver and cache settings, and driver open options.
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::Result;

/// Open option that selects this driver for a path without the `EOPFZARR:` prefix.
pub const EOPF_PROCESS: &str = "EOPF_PROCESS";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub resolver: ResolverConfig,
    pub cache: CacheConfig,
}

impl Config {
    pub fn from_json(s: &str) -> Result<Self> {
        Ok(serde_json::from_str(s)?)
    }
}

/// Fallbacks used when georeferencing cannot be discovered.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolverConfig {
    /// Placeholder bounds `[min_lon, min_lat, max_lon, max_lat]` in WGS84 degrees.
    pub default_bbox: [f64; 4],
    pub default_epsg: u32,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            default_bbox: [10.0, 40.0, 15.0, 45.0],
            default_epsg: crate::georef::EPSG_WGS84,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Lifetime of metadata, subdataset, SRS and geotransform entries.
    #[serde(with = "seconds")]
    pub ttl: Duration,
    /// Lifetime of remote existence checks.
    #[serde(with = "seconds")]
    pub remote_ttl: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(5 * 60),
            remote_ttl: Duration::from_secs(2 * 60),
        }
    }
}

mod seconds {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_f64(d.as_secs_f64())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(d)?;
        Duration::try_from_secs_f64(secs).map_err(serde::de::Error::custom)
    }
}

/// `KEY=VALUE` open options, in the order given.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OpenOptions(Vec<String>);

impl OpenOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: &str, value: &str) -> Self {
        self.0.push(format!("{key}={value}"));
        self
    }

    /// Value of the first option named `key` (case-insensitive).
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.iter().find_map(|option| {
            let (k, v) = option.split_once('=')?;
            k.trim().eq_ignore_ascii_case(key).then_some(v.trim())
        })
    }

    /// Whether `key` is set to `YES`, `TRUE` or `1`.
    pub fn is_true(&self, key: &str) -> bool {
        self.get(key).is_some_and(|v| {
            ["YES", "TRUE", "1"]
                .iter()
                .any(|t| v.eq_ignore_ascii_case(t))
        })
    }

    /// Whether the options ask for EOPF processing of an unprefixed path.
    pub fn eopf_process(&self) -> bool {
        self.is_true(EOPF_PROCESS)
    }

    /// The options to forward to the underlying store, without [`EOPF_PROCESS`].
    pub fn forwarded(&self) -> Self {
        Self(
            self.0
                .iter()
                .filter(|option| {
                    let key = option.split_once('=').map_or(option.as_str(), |(k, _)| k);
                    !key.trim().eq_ignore_ascii_case(EOPF_PROCESS)
                })
                .cloned()
                .collect(),
        )
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<S: Into<String>> FromIterator<S> for OpenOptions {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self(iter.into_iter().map(Into::into).collect())
    }
}
