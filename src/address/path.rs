//! Platform path conventions and path classification.

/// Which operating-system path grammar to apply to local store paths.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PathStyle {
    /// `/`-separated paths with no drive letters.
    Posix,
    /// `\`-separated paths, possibly with a single-letter drive prefix.
    Windows,
}

impl PathStyle {
    /// The style of the host platform.
    pub fn native() -> Self {
        if cfg!(windows) {
            Self::Windows
        } else {
            Self::Posix
        }
    }

    pub fn separator(self) -> char {
        match self {
            Self::Posix => '/',
            Self::Windows => '\\',
        }
    }

    pub(crate) fn has_drive_letters(self) -> bool {
        matches!(self, Self::Windows)
    }
}

impl Default for PathStyle {
    fn default() -> Self {
        Self::native()
    }
}

/// Canonicalize a local path for the given style.
///
/// Posix paths are returned untouched.
/// Windows paths have `/` converted to `\`, a leading separator in front of a drive letter
/// (`/C:/data`) removed, and a trailing separator removed unless the path is a bare drive root.
/// UNC prefixes (`\\server`) are preserved.
pub fn normalize(path: &str, style: PathStyle) -> String {
    match style {
        PathStyle::Posix => path.to_string(),
        PathStyle::Windows => {
            let mut out = path.replace('/', "\\");
            let bytes = out.as_bytes();
            if bytes.len() > 2
                && bytes[0] == b'\\'
                && bytes[1] != b'\\'
                && bytes[1].is_ascii_alphabetic()
                && bytes[2] == b':'
            {
                out.remove(0);
            }
            if out.len() > 3 && out.ends_with('\\') {
                out.pop();
            }
            out
        }
    }
}

/// Whether `path` starts with a single-letter drive prefix (`C:`), optionally preceded by one
/// separator (`/C:`).
pub(crate) fn drive_colon_offset(path: &str) -> Option<usize> {
    let bytes = path.as_bytes();
    let start = match bytes.first() {
        Some(b'/' | b'\\') => 1,
        _ => 0,
    };
    match bytes.get(start..start + 2) {
        Some([letter, b':']) if letter.is_ascii_alphabetic() => Some(start + 1),
        _ => None,
    }
}

/// Case-insensitive ASCII prefix check.
pub(crate) fn starts_with_ci(s: &str, prefix: &str) -> bool {
    s.len() >= prefix.len()
        && s.as_bytes()[..prefix.len()].eq_ignore_ascii_case(prefix.as_bytes())
}

/// Whether `s` begins with `scheme://`.
///
/// Single-letter schemes are rejected so that `C://` is never mistaken for a URL.
pub fn has_url_scheme(s: &str) -> bool {
    let Some(idx) = s.find("://") else {
        return false;
    };
    let scheme = &s[..idx];
    scheme.len() > 1
        && scheme.starts_with(|c: char| c.is_ascii_alphabetic())
        && scheme
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
}

/// Whether `s` uses the virtual-filesystem marker prefix (`/vsicurl/`, `/vsis3/`, ...).
pub fn is_virtual_path(s: &str) -> bool {
    starts_with_ci(s, "/vsi")
}

/// Whether `s` must be handed to the network or archive layer instead of the local filesystem.
pub fn is_remote(s: &str) -> bool {
    has_url_scheme(s) || is_virtual_path(s)
}

/// Broad classification of where a path is served from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathKind {
    Local,
    Http,
    VsiCurl,
    VsiS3,
    VsiAzure,
    /// Any other `/vsi*` handler, e.g. archives.
    VsiOther,
    Unknown,
}

impl PathKind {
    pub fn detect(path: &str) -> Self {
        if path.is_empty() {
            Self::Unknown
        } else if starts_with_ci(path, "/vsicurl/") {
            Self::VsiCurl
        } else if starts_with_ci(path, "/vsis3/") {
            Self::VsiS3
        } else if starts_with_ci(path, "/vsiaz/") || starts_with_ci(path, "/vsiazure/") {
            Self::VsiAzure
        } else if is_virtual_path(path) {
            Self::VsiOther
        } else if starts_with_ci(path, "http://") || starts_with_ci(path, "https://") {
            Self::Http
        } else {
            Self::Local
        }
    }

    pub fn is_network(self) -> bool {
        matches!(
            self,
            Self::Http | Self::VsiCurl | Self::VsiS3 | Self::VsiAzure
        )
    }
}

/// Whether a stat of `path` goes over the network, and so is worth caching.
pub fn is_network_path(path: &str) -> bool {
    PathKind::detect(path).is_network()
}
