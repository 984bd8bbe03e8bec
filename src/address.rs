//! Composite address parsing.
//!
//! A single string names both the store to open and, optionally, an array or group inside it:
//!
//! - `EOPFZARR:path`
//! - `EOPFZARR:"path":subpath`
//! - `EOPFZARR:path:subpath` (a drive-letter colon is never the delimiter)
//! - remote forms (`scheme://...`, `/vsi*/...`), which are never split on their own colons.
//!   A `:subpath` trailing a quoted remote store is joined onto the URL path instead.
//!
//! Parsing is total: malformed input degrades to a best-effort [`ParsedAddress`].
use log::trace;

mod path;

pub use path::{
    PathKind, PathStyle, has_url_scheme, is_network_path, is_remote, is_virtual_path, normalize,
};
pub(crate) use path::starts_with_ci;

/// Prefix selecting this driver.
pub const DRIVER_PREFIX: &str = "EOPFZARR";
/// Prefix used by the underlying Zarr store's own addresses.
pub const ZARR_PREFIX: &str = "ZARR";

const RECOGNIZED_PREFIXES: [&str; 2] = [DRIVER_PREFIX, ZARR_PREFIX];

/// The result of parsing one composite address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedAddress {
    store_path: String,
    sub_path: String,
    is_subdataset: bool,
    is_remote: bool,
    style: PathStyle,
}

impl ParsedAddress {
    fn store(store_path: String, is_remote: bool, style: PathStyle) -> Self {
        Self {
            store_path,
            sub_path: String::new(),
            is_subdataset: false,
            is_remote,
            style,
        }
    }

    fn subdataset(store_path: String, sub_path: &str, style: PathStyle) -> Self {
        Self {
            store_path,
            sub_path: sub_path.to_string(),
            is_subdataset: true,
            is_remote: false,
            style,
        }
    }

    /// Path to open with the underlying store.
    pub fn store_path(&self) -> &str {
        &self.store_path
    }

    /// Array or group inside the store; empty unless [`Self::is_subdataset`].
    pub fn sub_path(&self) -> &str {
        &self.sub_path
    }

    pub fn is_subdataset(&self) -> bool {
        self.is_subdataset
    }

    /// Whether the store path is a URL or a virtual-filesystem path.
    pub fn is_remote(&self) -> bool {
        self.is_remote
    }

    pub fn style(&self) -> PathStyle {
        self.style
    }

    fn separator(&self) -> char {
        if self.is_remote {
            '/'
        } else {
            self.style.separator()
        }
    }

    /// The store path with the sub-path appended as a nested path.
    ///
    /// Leading separators of the sub-path are dropped so exactly one separator joins the two.
    pub fn joined_path(&self) -> String {
        let sub = self.sub_path.trim_start_matches(['/', '\\']);
        if sub.is_empty() {
            return self.store_path.clone();
        }
        let mut out = self.store_path.clone();
        if !out.is_empty() && !out.ends_with(['/', '\\']) {
            out.push(self.separator());
        }
        out.push_str(sub);
        out
    }

    /// Render in this driver's address convention.
    ///
    /// Parsing the result with the same [`PathStyle`] yields an equal [`ParsedAddress`].
    pub fn to_address(&self) -> String {
        if self.is_subdataset {
            format!(
                "{DRIVER_PREFIX}:\"{}\":{}",
                self.store_path, self.sub_path
            )
        } else if self.store_path.contains(':') {
            format!("{DRIVER_PREFIX}:\"{}\"", self.store_path)
        } else {
            format!("{DRIVER_PREFIX}:{}", self.store_path)
        }
    }
}

impl std::fmt::Display for ParsedAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.to_address())
    }
}

/// Whether `raw` carries this driver's prefix.
pub fn has_driver_prefix(raw: &str) -> bool {
    raw.len() > DRIVER_PREFIX.len()
        && starts_with_ci(raw, DRIVER_PREFIX)
        && raw.as_bytes()[DRIVER_PREFIX.len()] == b':'
}

/// Remove a recognized `PREFIX:` (case-insensitive), if present.
pub fn strip_driver_prefix(raw: &str) -> &str {
    for prefix in RECOGNIZED_PREFIXES {
        if raw.len() > prefix.len()
            && starts_with_ci(raw, prefix)
            && raw.as_bytes()[prefix.len()] == b':'
        {
            return &raw[prefix.len() + 1..];
        }
    }
    raw
}

/// Byte offsets of the first non-empty double-quoted segment.
fn quoted_segment(s: &str) -> Option<(usize, usize)> {
    let open = s.find('"')?;
    let close = open + 1 + s[open + 1..].find('"')?;
    (close > open + 1).then_some((open, close))
}

/// Append `sub` to the path component of a remote address with a single `/`.
fn join_remote(url: &str, sub: &str) -> String {
    let sub = sub.trim_start_matches('/');
    if sub.is_empty() {
        return url.to_string();
    }
    let mut out = url.to_string();
    if !out.ends_with('/') {
        out.push('/');
    }
    out.push_str(sub);
    out
}

/// Position of the colon separating store and sub-path in an unquoted address.
fn delimiter_colon(s: &str, style: PathStyle) -> Option<usize> {
    let first = s.find(':')?;
    if style.has_drive_letters() && path::drive_colon_offset(s) == Some(first) {
        s[first + 1..].find(':').map(|idx| first + 1 + idx)
    } else {
        Some(first)
    }
}

/// Parse using the host platform's path conventions.
pub fn parse(raw: &str) -> ParsedAddress {
    parse_with_style(raw, PathStyle::native())
}

/// Parse using an explicit path convention.
pub fn parse_with_style(raw: &str, style: PathStyle) -> ParsedAddress {
    let rest = strip_driver_prefix(raw);
    let quoted = quoted_segment(rest);
    let interior = quoted.map_or(rest, |(open, close)| &rest[open + 1..close]);

    let parsed = if is_remote(interior) {
        let store_path = match quoted {
            Some((_, close)) => match rest[close + 1..].strip_prefix(':') {
                Some(sub) => join_remote(interior, sub),
                None => interior.to_string(),
            },
            None => interior.to_string(),
        };
        ParsedAddress::store(store_path, true, style)
    } else if let Some((_, close)) = quoted {
        let store_path = normalize(interior, style);
        match rest[close + 1..].strip_prefix(':') {
            Some(sub) => ParsedAddress::subdataset(store_path, sub, style),
            None => ParsedAddress::store(store_path, false, style),
        }
    } else if let Some(idx) = delimiter_colon(rest, style) {
        ParsedAddress::subdataset(normalize(&rest[..idx], style), &rest[idx + 1..], style)
    } else {
        ParsedAddress::store(normalize(rest, style), false, style)
    };
    trace!(target: crate::LOG_TARGET, "parsed {raw:?} as {parsed:?}");
    parsed
}
