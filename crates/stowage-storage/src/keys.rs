//! Storage keys and their mapping to filesystem paths and URLs.
//!
//! A key is a list of segments joined by `/` with no leading slash. It is the
//! only identifier callers see; each backend translates it to its own
//! addressing scheme.

use crate::traits::{StorageError, StorageResult};
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use std::path::{Path, PathBuf};

/// Everything but RFC 3986 unreserved characters is escaped inside a segment.
const URL_SEGMENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~');

/// Bidirectional mapping between keys and paths under a root directory.
#[derive(Debug, Clone)]
pub struct KeyCodec {
    root: PathBuf,
}

impl KeyCodec {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Convert a rooted path (or an already canonical key) into a key.
    ///
    /// Separators are normalized before the root is stripped so that paths
    /// produced on either host convention map to the same key.
    pub fn to_key(&self, path: impl AsRef<Path>) -> String {
        let path = slashes(&path.as_ref().to_string_lossy());
        let root = slashes(&self.root.to_string_lossy());
        let root = root.trim_end_matches('/');

        let relative = if !root.is_empty() && path == root {
            ""
        } else if !root.is_empty() && path.starts_with(&format!("{}/", root)) {
            &path[root.len()..]
        } else {
            path.as_str()
        };

        relative.trim_start_matches('/').to_string()
    }

    /// Convert a key into a path under the root. Empty segments are dropped.
    pub fn to_path(&self, key: &str) -> PathBuf {
        key.split('/')
            .filter(|segment| !segment.is_empty())
            .fold(self.root.clone(), |path, segment| path.join(segment))
    }

    /// Like [`KeyCodec::to_path`], but for keys that must address a file.
    pub fn resolve(&self, key: &str) -> StorageResult<PathBuf> {
        let key = normalize_key(key);
        if key.is_empty() {
            return Err(StorageError::InvalidKey("key must not be empty".to_string()));
        }
        if key.split('/').any(|segment| segment == ".." || segment == ".") {
            return Err(StorageError::InvalidKey(format!(
                "key '{}' contains relative path segments",
                key
            )));
        }
        Ok(self.to_path(&key))
    }
}

fn slashes(s: &str) -> String {
    s.replace('\\', "/")
}

/// Canonical form of a key: forward slashes, no empty segments.
pub fn normalize_key(key: &str) -> String {
    slashes(key)
        .split('/')
        .filter(|segment| !segment.is_empty())
        .collect::<Vec<_>>()
        .join("/")
}

/// Normalize a key that must address an object, failing on empty keys.
pub fn require_key(key: &str) -> StorageResult<String> {
    let key = normalize_key(key);
    if key.is_empty() {
        return Err(StorageError::InvalidKey("key must not be empty".to_string()));
    }
    Ok(key)
}

/// Join a placement directory and a file name into a key.
pub fn join_key(dir: &str, file_name: &str) -> String {
    normalize_key(&format!("{}/{}", dir, file_name))
}

/// Leaf segment of a key
pub fn file_name_of(key: &str) -> &str {
    key.rsplit(['/', '\\']).next().unwrap_or(key)
}

/// Whether `value` already is an absolute URL (`scheme://...`).
pub fn is_absolute_url(value: &str) -> bool {
    match value.split_once("://") {
        Some((scheme, _)) => {
            let mut chars = scheme.chars();
            matches!(chars.next(), Some(c) if c.is_ascii_alphabetic())
                && chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
        }
        None => false,
    }
}

/// Percent-encode each segment of a key, keeping the `/` separators.
pub fn encode_key_path(key: &str) -> String {
    key.trim_start_matches('/')
        .split('/')
        .map(|segment| utf8_percent_encode(segment, URL_SEGMENT).to_string())
        .collect::<Vec<_>>()
        .join("/")
}

/// Append a key to a base URL without doubling slashes.
pub fn join_url(base_url: &str, key: &str) -> String {
    format!(
        "{}/{}",
        base_url.trim_end_matches('/'),
        encode_key_path(key)
    )
}
