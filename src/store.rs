//! The underlying array store: how an EOPF dataset reaches its Zarr hierarchy.
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::Arc;

use bytes::Buf;
use log::{debug, warn};
use serde_json::{Map, Value};
use zarrs::filesystem::FilesystemStore;
use zarrs::storage::{
    ListableStorageTraits, ReadableListableStorage, ReadableStorageTraits, StorageError, StoreKey,
};

use crate::address::{ZARR_PREFIX, is_remote};
use crate::config::OpenOptions;
use crate::json::to_metadata_string;
use crate::subdataset::{SUBDATASETS_DOMAIN, Subdataset, to_metadata};
use crate::{Error, LOG_TARGET, Result};

const ZMETADATA: &str = ".zmetadata";
const ZATTRS: &str = ".zattrs";
const ZARRAY: &str = ".zarray";
const ZGROUP: &str = ".zgroup";
const ZARR_JSON: &str = "zarr.json";

/// An opened dataset of the underlying store.
pub trait UnderlyingDataset {
    /// `(width, height)` in pixels; `(0, 0)` for groups.
    fn raster_size(&self) -> (u64, u64);

    /// Flat metadata items of a domain; `""` is the default domain.
    fn metadata(&self, domain: &str) -> Vec<(String, String)>;

    /// The JSON attribute tree.
    fn attributes(&self) -> &Value;

    fn description(&self) -> &str;
}

/// Opens underlying datasets by store path.
pub trait StoreOpener {
    /// Open `sub_path` (empty for the root) inside the store at `store_path`.
    fn open(
        &self,
        store_path: &str,
        sub_path: &str,
        options: &OpenOptions,
    ) -> Result<Box<dyn UnderlyingDataset>>;

    fn exists(&self, path: &str) -> bool;
}

/// Shape and data type of a Zarr array.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArrayInfo {
    pub shape: Vec<u64>,
    pub data_type: String,
}

impl ArrayInfo {
    fn from_zarray(meta: &Value) -> Option<Self> {
        Some(Self {
            shape: shape(meta.get("shape")?)?,
            data_type: meta
                .get("dtype")
                .map(to_metadata_string)
                .unwrap_or_default(),
        })
    }

    fn from_zarr_json(meta: &Value) -> Option<Self> {
        if meta.get("node_type")?.as_str()? != "array" {
            return None;
        }
        let data_type = match meta.get("data_type") {
            Some(Value::Object(dt)) => dt
                .get("name")
                .map(to_metadata_string)
                .unwrap_or_default(),
            Some(other) => to_metadata_string(other),
            None => String::new(),
        };
        Some(Self {
            shape: shape(meta.get("shape")?)?,
            data_type,
        })
    }
}

fn shape(value: &Value) -> Option<Vec<u64>> {
    value.as_array()?.iter().map(Value::as_u64).collect()
}

fn store_key(key: &str) -> Result<StoreKey> {
    Ok(StoreKey::new(key).map_err(StorageError::from)?)
}

fn node_key(node: &str, name: &str) -> String {
    if node.is_empty() {
        name.to_string()
    } else {
        format!("{node}/{name}")
    }
}

/// A Zarr group or array read through any `zarrs` storage.
///
/// Consolidated metadata (`.zmetadata`) is preferred; per-node `.zattrs`, `.zarray` and Zarr v3
/// `zarr.json` documents are read when it is absent or incomplete.
pub struct ZarrDataset {
    storage: ReadableListableStorage,
    store_path: String,
    node: String,
    description: String,
    consolidated: Option<Map<String, Value>>,
    attributes: Value,
    array: Option<ArrayInfo>,
}

impl ZarrDataset {
    /// Open `node` (`""` or `/` for the root) of the hierarchy in `storage`.
    ///
    /// `store_path` is only used to name the dataset and its subdatasets.
    pub fn open(
        storage: ReadableListableStorage,
        store_path: impl Into<String>,
        node: &str,
    ) -> Result<Self> {
        let store_path = store_path.into();
        let node = node
            .replace('\\', "/")
            .trim_matches('/')
            .to_string();
        let description = if node.is_empty() {
            store_path.clone()
        } else {
            format!("{}/{node}", store_path.trim_end_matches(['/', '\\']))
        };

        let mut dataset = Self {
            storage,
            store_path,
            node,
            description,
            consolidated: None,
            attributes: Value::Object(Map::new()),
            array: None,
        };
        dataset.consolidated = dataset.read_consolidated()?;

        if !dataset.node_exists()? {
            return Err(Error::NotFound(dataset.description));
        }
        dataset.array = dataset.array_info(&dataset.node)?;

        let node_attrs = dataset.node_attributes(&dataset.node)?;
        dataset.attributes = if dataset.node.is_empty() {
            node_attrs
        } else {
            let mut merged = dataset.node_attributes("")?;
            merge_attributes(&mut merged, node_attrs);
            merged
        };
        debug!(
            target: LOG_TARGET,
            "opened zarr node {:?} (consolidated: {})",
            dataset.description,
            dataset.consolidated.is_some()
        );
        Ok(dataset)
    }

    pub fn store_path(&self) -> &str {
        &self.store_path
    }

    /// Path of the opened node inside the store, without leading `/`.
    pub fn node(&self) -> &str {
        &self.node
    }

    /// Array metadata, if the opened node is an array.
    pub fn array(&self) -> Option<&ArrayInfo> {
        self.array.as_ref()
    }

    fn read_json(&self, key: &str) -> Result<Option<Value>> {
        let Some(bytes) = self.storage.get(&store_key(key)?)? else {
            return Ok(None);
        };
        Ok(Some(serde_json::from_reader(bytes.reader())?))
    }

    fn read_consolidated(&self) -> Result<Option<Map<String, Value>>> {
        match self.read_json(ZMETADATA) {
            Ok(Some(Value::Object(mut doc))) => match doc.remove("metadata") {
                Some(Value::Object(metadata)) => Ok(Some(metadata)),
                _ => {
                    debug!(target: LOG_TARGET, "{ZMETADATA} has no 'metadata' object");
                    Ok(None)
                }
            },
            Ok(_) => Ok(None),
            Err(Error::SerdeJson(e)) => {
                warn!(target: LOG_TARGET, "ignoring unreadable {ZMETADATA}: {e}");
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    /// A metadata document, from the consolidated index or the store.
    fn document(&self, key: &str) -> Result<Option<Value>> {
        if let Some(value) = self.consolidated.as_ref().and_then(|c| c.get(key)) {
            return Ok(Some(value.clone()));
        }
        self.read_json(key)
    }

    fn node_exists(&self) -> Result<bool> {
        let mut names = vec![ZARRAY, ZGROUP, ZATTRS, ZARR_JSON];
        if self.node.is_empty() {
            names.push(ZMETADATA);
            if self.consolidated.is_some() {
                return Ok(true);
            }
        }
        for name in names {
            let key = node_key(&self.node, name);
            if self
                .consolidated
                .as_ref()
                .is_some_and(|c| c.contains_key(&key))
            {
                return Ok(true);
            }
            if self.storage.size_key(&store_key(&key)?)?.is_some() {
                return Ok(true);
            }
        }
        Ok(false)
    }

    fn node_attributes(&self, node: &str) -> Result<Value> {
        if let Some(attrs) = self.document(&node_key(node, ZATTRS))? {
            return Ok(attrs);
        }
        let attrs = self
            .document(&node_key(node, ZARR_JSON))?
            .and_then(|mut doc| doc.get_mut("attributes").map(Value::take));
        Ok(attrs.unwrap_or_else(|| Value::Object(Map::new())))
    }

    fn array_info(&self, node: &str) -> Result<Option<ArrayInfo>> {
        if let Some(meta) = self.document(&node_key(node, ZARRAY))? {
            return Ok(ArrayInfo::from_zarray(&meta));
        }
        Ok(self
            .document(&node_key(node, ZARR_JSON))?
            .as_ref()
            .and_then(ArrayInfo::from_zarr_json))
    }

    /// Arrays below the opened node, keyed by their path in the store.
    pub fn arrays(&self) -> Result<BTreeMap<String, ArrayInfo>> {
        let keys: Vec<String> = match &self.consolidated {
            Some(c) => c.keys().cloned().collect(),
            None => self
                .storage
                .list()?
                .iter()
                .map(|k| k.as_str().to_string())
                .collect(),
        };
        let prefix = if self.node.is_empty() {
            String::new()
        } else {
            format!("{}/", self.node)
        };

        let mut arrays = BTreeMap::new();
        for key in keys {
            let Some(path) = [ZARRAY, ZARR_JSON]
                .iter()
                .find_map(|name| key.strip_suffix(name))
                .filter(|path| path.is_empty() || path.ends_with('/'))
                .map(|path| path.trim_end_matches('/'))
            else {
                continue;
            };
            if path.is_empty() || !path.starts_with(&prefix) || arrays.contains_key(path) {
                continue;
            }
            if let Some(info) = self.array_info(path)? {
                arrays.insert(path.to_string(), info);
            }
        }
        Ok(arrays)
    }

    /// Arrays of two or more dimensions as `ZARR:` subdatasets, sorted by path.
    pub fn subdatasets(&self) -> Result<Vec<Subdataset>> {
        Ok(self
            .arrays()?
            .into_iter()
            .filter(|(_, info)| info.shape.len() >= 2)
            .map(|(path, info)| {
                let dims = info
                    .shape
                    .iter()
                    .map(u64::to_string)
                    .collect::<Vec<_>>()
                    .join("x");
                Subdataset::new(
                    format!("{ZARR_PREFIX}:\"{}\":/{path}", self.store_path),
                    format!("[{dims}] /{path} ({})", info.data_type),
                )
            })
            .collect())
    }
}

impl UnderlyingDataset for ZarrDataset {
    fn raster_size(&self) -> (u64, u64) {
        match self.array.as_ref().map(|a| a.shape.as_slice()) {
            Some([.., height, width]) => (*width, *height),
            Some([width]) => (*width, 1),
            _ => (0, 0),
        }
    }

    fn metadata(&self, domain: &str) -> Vec<(String, String)> {
        match domain {
            "" => self
                .attributes
                .as_object()
                .map(|attrs| {
                    attrs
                        .iter()
                        .map(|(k, v)| (k.clone(), to_metadata_string(v)))
                        .collect()
                })
                .unwrap_or_default(),
            SUBDATASETS_DOMAIN => match self.subdatasets() {
                Ok(subdatasets) => to_metadata(&subdatasets),
                Err(e) => {
                    warn!(target: LOG_TARGET, "could not list subdatasets: {e}");
                    Vec::new()
                }
            },
            _ => Vec::new(),
        }
    }

    fn attributes(&self) -> &Value {
        &self.attributes
    }

    fn description(&self) -> &str {
        &self.description
    }
}

/// Shallow merge: members of `over` replace members of `base`.
fn merge_attributes(base: &mut Value, over: Value) {
    match (base, over) {
        (Value::Object(base), Value::Object(over)) => base.extend(over),
        (base, over) => *base = over,
    }
}

/// Opens Zarr stores on the local filesystem, or storages mounted at a path.
///
/// Remote paths must be mounted; this crate has no network transport of its own.
#[derive(Default)]
pub struct ZarrStoreOpener {
    mounts: HashMap<String, ReadableListableStorage>,
}

impl ZarrStoreOpener {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve `path` from `storage` instead of the filesystem.
    pub fn with_store(mut self, path: impl Into<String>, storage: ReadableListableStorage) -> Self {
        self.mount(path, storage);
        self
    }

    pub fn mount(&mut self, path: impl Into<String>, storage: ReadableListableStorage) {
        self.mounts.insert(path.into(), storage);
    }

    /// The mount serving `path`: the longest mounted key equal to `path` or a `/`-bounded prefix
    /// of it, together with the remainder of `path` below that key.
    fn mounted<'a>(
        &'a self,
        path: &'a str,
    ) -> Option<(&'a str, &'a ReadableListableStorage, &'a str)> {
        self.mounts
            .iter()
            .filter_map(|(key, storage)| {
                let root = key.trim_end_matches(['/', '\\']);
                let rest = path.strip_prefix(root)?;
                (rest.is_empty() || rest.starts_with(['/', '\\']))
                    .then(|| (root, storage, rest.trim_matches(['/', '\\'])))
            })
            .max_by_key(|(root, _, _)| root.len())
    }

    /// Storage for `store_path`, the path naming its root, and the node of `store_path` inside it.
    fn locate(&self, store_path: &str) -> Result<(ReadableListableStorage, String, String)> {
        if let Some((root, storage, node)) = self.mounted(store_path) {
            return Ok((storage.clone(), root.to_string(), node.to_string()));
        }
        if is_remote(store_path) {
            return Err(Error::Unsupported(format!(
                "no storage mounted for remote path {store_path}"
            )));
        }
        if !Path::new(store_path).is_dir() {
            return Err(Error::NotFound(store_path.to_string()));
        }
        let store = FilesystemStore::new(store_path).map_err(Error::wrap)?;
        Ok((Arc::new(store), store_path.to_string(), String::new()))
    }
}

fn join_nodes(parent: &str, child: &str) -> String {
    let child = child.trim_matches(['/', '\\']);
    match (parent.is_empty(), child.is_empty()) {
        (_, true) => parent.to_string(),
        (true, false) => child.to_string(),
        (false, false) => format!("{parent}/{child}"),
    }
}

impl StoreOpener for ZarrStoreOpener {
    fn open(
        &self,
        store_path: &str,
        sub_path: &str,
        options: &OpenOptions,
    ) -> Result<Box<dyn UnderlyingDataset>> {
        if !options.is_empty() {
            debug!(
                target: LOG_TARGET,
                "open options for {store_path}: {:?}",
                options.iter().collect::<Vec<_>>()
            );
        }
        let (storage, root, node) = self.locate(store_path)?;
        let dataset = ZarrDataset::open(storage, root, &join_nodes(&node, sub_path))?;
        Ok(Box::new(dataset))
    }

    fn exists(&self, path: &str) -> bool {
        match self.mounted(path) {
            Some((_, _, "")) => true,
            Some((root, storage, node)) => ZarrDataset::open(storage.clone(), root, node).is_ok(),
            None => !is_remote(path) && Path::new(path).exists(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use serde_json::json;
    use zarrs::storage::WritableStorageTraits;
    use zarrs::storage::store::MemoryStore;

    fn put(store: &MemoryStore, key: &str, value: Value) {
        store
            .set(
                &StoreKey::new(key).unwrap(),
                Bytes::from(serde_json::to_vec(&value).unwrap()),
            )
            .unwrap();
    }

    fn zarray(shape: &[u64]) -> Value {
        json!({"zarr_format": 2, "shape": shape, "chunks": shape, "dtype": "<u2"})
    }

    fn unconsolidated() -> ReadableListableStorage {
        let store = MemoryStore::new();
        put(&store, ".zgroup", json!({"zarr_format": 2}));
        put(&store, ".zattrs", json!({"title": "root", "proj:epsg": 32632}));
        put(&store, "measurements/.zgroup", json!({"zarr_format": 2}));
        put(&store, "measurements/b02/.zarray", zarray(&[3, 20, 10]));
        put(&store, "measurements/b02/.zattrs", json!({"title": "b02"}));
        put(&store, "measurements/time/.zarray", zarray(&[5]));
        Arc::new(store)
    }

    #[test]
    fn root_group() {
        let ds = ZarrDataset::open(unconsolidated(), "/data/p.zarr", "").unwrap();
        assert_eq!(ds.raster_size(), (0, 0));
        assert_eq!(ds.attributes()["title"], "root");
        assert_eq!(ds.description(), "/data/p.zarr");

        let items = ds.metadata("");
        assert!(items.contains(&("proj:epsg".to_string(), "32632".to_string())));

        let subdatasets = ds.subdatasets().unwrap();
        assert_eq!(
            subdatasets,
            [Subdataset::new(
                r#"ZARR:"/data/p.zarr":/measurements/b02"#,
                "[3x20x10] /measurements/b02 (<u2)"
            )]
        );
        assert_eq!(ds.metadata(SUBDATASETS_DOMAIN).len(), 2);
    }

    #[test]
    fn array_node_merges_root_attributes() {
        let ds = ZarrDataset::open(unconsolidated(), "/data/p.zarr", "/measurements/b02").unwrap();
        assert_eq!(ds.node(), "measurements/b02");
        assert_eq!(ds.raster_size(), (10, 20));
        assert_eq!(ds.attributes()["title"], "b02");
        assert_eq!(ds.attributes()["proj:epsg"], 32632);
        assert_eq!(ds.description(), "/data/p.zarr/measurements/b02");
        assert!(ds.subdatasets().unwrap().is_empty());
    }

    #[test]
    fn missing_node() {
        let err = ZarrDataset::open(unconsolidated(), "/data/p.zarr", "nope").err();
        assert!(matches!(err, Some(Error::NotFound(_))));
        let err = ZarrDataset::open(Arc::new(MemoryStore::new()), "/empty", "").err();
        assert!(matches!(err, Some(Error::NotFound(_))));
    }

    #[test]
    fn consolidated_metadata_is_preferred() {
        let store = MemoryStore::new();
        put(
            &store,
            ".zmetadata",
            json!({
                "zarr_consolidated_format": 1,
                "metadata": {
                    ".zgroup": {"zarr_format": 2},
                    ".zattrs": {"source": "consolidated"},
                    "a/.zarray": zarray(&[4, 8]),
                }
            }),
        );
        put(&store, ".zattrs", json!({"source": "file"}));
        let ds = ZarrDataset::open(Arc::new(store), "s.zarr", "").unwrap();
        assert_eq!(ds.attributes()["source"], "consolidated");
        assert_eq!(ds.subdatasets().unwrap().len(), 1);

        let ds = ZarrDataset::open(ds.storage.clone(), "s.zarr", "a").unwrap();
        assert_eq!(ds.raster_size(), (8, 4));
    }

    #[test]
    fn zarr_v3() {
        let store = MemoryStore::new();
        put(
            &store,
            "zarr.json",
            json!({"zarr_format": 3, "node_type": "group", "attributes": {"epsg": 4326}}),
        );
        put(
            &store,
            "r/zarr.json",
            json!({"zarr_format": 3, "node_type": "array", "shape": [6, 7], "data_type": "float32", "attributes": {}}),
        );
        let ds = ZarrDataset::open(Arc::new(store), "v3.zarr", "").unwrap();
        assert_eq!(ds.attributes()["epsg"], 4326);
        let arrays = ds.arrays().unwrap();
        assert_eq!(
            arrays.get("r"),
            Some(&ArrayInfo {
                shape: vec![6, 7],
                data_type: "float32".to_string()
            })
        );
    }

    #[test]
    fn opener_mounts_and_rejects_remote() {
        let opener = ZarrStoreOpener::new().with_store("mem://p.zarr", unconsolidated());
        assert!(opener.exists("mem://p.zarr"));
        let ds = opener
            .open("mem://p.zarr", "measurements/b02", &OpenOptions::new())
            .unwrap();
        assert_eq!(ds.raster_size(), (10, 20));

        assert!(!opener.exists("/vsis3/bucket/x.zarr"));
        let err = opener
            .open("/vsis3/bucket/x.zarr", "", &OpenOptions::new())
            .err();
        assert!(matches!(err, Some(Error::Unsupported(_))));
    }

    #[test]
    fn nested_paths_resolve_through_longest_mount() {
        let opener = ZarrStoreOpener::new()
            .with_store("/vsicurl/https://host/p.zarr/", unconsolidated())
            .with_store("/vsicurl/https://host/p.zarr/other", Arc::new(MemoryStore::new()));

        let ds = opener
            .open("/vsicurl/https://host/p.zarr/measurements", "b02", &OpenOptions::new())
            .unwrap();
        assert_eq!(ds.raster_size(), (10, 20));
        assert_eq!(ds.attributes()["title"], "b02");
        assert_eq!(ds.description(), "/vsicurl/https://host/p.zarr/measurements/b02");

        assert!(opener.exists("/vsicurl/https://host/p.zarr"));
        assert!(opener.exists("/vsicurl/https://host/p.zarr/measurements/b02"));
        assert!(!opener.exists("/vsicurl/https://host/p.zarr/measurements/b03"));
        assert!(!opener.exists("/vsicurl/https://host/p.zarrx"));
        assert!(matches!(
            opener.open("/vsicurl/https://host/p.zarr/other", "b02", &OpenOptions::new()).err(),
            Some(Error::NotFound(_))
        ));
    }
}
