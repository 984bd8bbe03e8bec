//! Subdataset lists and their rewriting into this driver's addresses.
use std::collections::BTreeMap;

use log::debug;

use crate::LOG_TARGET;
use crate::address::{PathStyle, parse_with_style};

/// Metadata domain holding `SUBDATASET_n_NAME` / `SUBDATASET_n_DESC` items.
pub const SUBDATASETS_DOMAIN: &str = "SUBDATASETS";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subdataset {
    /// Address that opens the subdataset.
    pub name: String,
    pub description: String,
}

impl Subdataset {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
        }
    }
}

/// Rewrite the underlying store's subdatasets into `EOPFZARR:` addresses.
///
/// Order and descriptions are kept; entries whose name does not yield a store path are dropped.
pub fn enumerate(entries: &[Subdataset]) -> Vec<Subdataset> {
    enumerate_with_style(entries, PathStyle::native())
}

pub fn enumerate_with_style(entries: &[Subdataset], style: PathStyle) -> Vec<Subdataset> {
    entries
        .iter()
        .filter_map(|entry| {
            let parsed = parse_with_style(&entry.name, style);
            if parsed.store_path().is_empty() {
                debug!(target: LOG_TARGET, "dropping subdataset {:?}", entry.name);
                return None;
            }
            Some(Subdataset::new(parsed.to_address(), entry.description.clone()))
        })
        .collect()
}

/// Read `SUBDATASET_n_NAME` / `SUBDATASET_n_DESC` pairs, ordered by `n`.
///
/// A name without a description is dropped.
pub fn from_metadata<'a>(items: impl IntoIterator<Item = (&'a str, &'a str)>) -> Vec<Subdataset> {
    let mut names = BTreeMap::new();
    let mut descriptions = BTreeMap::new();
    for (key, value) in items {
        let Some(rest) = key.strip_prefix("SUBDATASET_") else {
            continue;
        };
        let Some((index, field)) = rest.split_once('_') else {
            continue;
        };
        let Ok(index) = index.parse::<usize>() else {
            continue;
        };
        match field {
            "NAME" => {
                names.insert(index, value);
            }
            "DESC" => {
                descriptions.insert(index, value);
            }
            _ => {}
        }
    }
    names
        .into_iter()
        .filter_map(|(index, name)| {
            descriptions
                .get(&index)
                .map(|desc| Subdataset::new(name, *desc))
        })
        .collect()
}

/// `SUBDATASET_n_NAME` / `SUBDATASET_n_DESC` items, numbered from 1.
pub fn to_metadata(subdatasets: &[Subdataset]) -> Vec<(String, String)> {
    subdatasets
        .iter()
        .enumerate()
        .flat_map(|(i, s)| {
            let n = i + 1;
            [
                (format!("SUBDATASET_{n}_NAME"), s.name.clone()),
                (format!("SUBDATASET_{n}_DESC"), s.description.clone()),
            ]
        })
        .collect()
}
