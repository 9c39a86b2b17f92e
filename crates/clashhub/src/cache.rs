//! Local persistent key-value cache.
//!
//! The cache mirrors the remote documents so the public view still renders
//! when GitHub is unreachable. A successful remote read replaces it, except
//! for a document marked local-only: an admin edit the repository has not
//! accepted yet stays authoritative until a remote save succeeds.

use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde::Serialize;
use serde::de::DeserializeOwned;
use thiserror::Error;

/// Cache key of the source list.
pub const SOURCES_KEY: &str = "clashhub_sources_v3";

/// Cache key of the custom links.
pub const LINKS_KEY: &str = "clashhub_links_v3";

/// Cache key of the last good subscription file listing.
pub const FILES_KEY: &str = "clashhub_cached_files";

const LOCAL_ONLY_SUFFIX: &str = "_local_only";

/// Errors that can occur while writing the cache.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("Cache I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Cache serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// String key-value storage.
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;

    fn set(&self, key: &str, value: String) -> Result<(), CacheError>;
}

/// Read and deserialize a cached value.
///
/// Malformed entries are treated as missing, with a warning.
pub fn load_json<T: DeserializeOwned>(store: &dyn KeyValueStore, key: &str) -> Option<T> {
    let raw = store.get(key)?;
    match serde_json::from_str(&raw) {
        Ok(value) => Some(value),
        Err(e) => {
            tracing::warn!(key, error = %e, "Ignoring malformed cache entry");
            None
        }
    }
}

/// Serialize and store a value.
pub fn store_json<T: Serialize + ?Sized>(
    store: &dyn KeyValueStore,
    key: &str,
    value: &T,
) -> Result<(), CacheError> {
    store.set(key, serde_json::to_string(value)?)
}

/// Whether the cached document under `key` holds an edit the repository
/// has not accepted yet.
pub fn is_local_only(store: &dyn KeyValueStore, key: &str) -> bool {
    load_json::<bool>(store, &format!("{key}{LOCAL_ONLY_SUFFIX}")).unwrap_or(false)
}

/// Set or clear the local-only marker of the document under `key`.
pub fn set_local_only(store: &dyn KeyValueStore, key: &str, local_only: bool) -> Result<(), CacheError> {
    store_json(store, &format!("{key}{LOCAL_ONLY_SUFFIX}"), &local_only)
}

/// In-memory store, used in tests and when no cache path is available.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<BTreeMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Option<String> {
        self.entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(key)
            .cloned()
    }

    fn set(&self, key: &str, value: String) -> Result<(), CacheError> {
        self.entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(key.to_string(), value);
        Ok(())
    }
}

/// Store persisted as a single JSON object on disk.
///
/// Every `set` writes a sibling temp file and renames it over the cache, so
/// an interrupted write leaves the previous contents in place. A missing or
/// corrupt file reads as empty.
#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    entries: Mutex<BTreeMap<String, String>>,
}

impl JsonFileStore {
    /// Open (or lazily create) the store at `path`.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let entries = Self::read_entries(&path);
        Self {
            path,
            entries: Mutex::new(entries),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_entries(path: &Path) -> BTreeMap<String, String> {
        let Ok(raw) = fs::read_to_string(path) else {
            return BTreeMap::new();
        };
        serde_json::from_str(&raw).unwrap_or_else(|e| {
            tracing::warn!(path = %path.display(), error = %e, "Cache file is corrupt, starting empty");
            BTreeMap::new()
        })
    }

    fn io_error(&self, source: std::io::Error) -> CacheError {
        CacheError::Io {
            path: self.path.clone(),
            source,
        }
    }
}

impl KeyValueStore for JsonFileStore {
    fn get(&self, key: &str) -> Option<String> {
        self.entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(key)
            .cloned()
    }

    fn set(&self, key: &str, value: String) -> Result<(), CacheError> {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.insert(key.to_string(), value);

        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        fs::create_dir_all(dir).map_err(|e| self.io_error(e))?;

        let serialized = serde_json::to_string_pretty(&*entries)?;
        let mut staged = tempfile::NamedTempFile::new_in(dir).map_err(|e| self.io_error(e))?;
        staged
            .write_all(serialized.as_bytes())
            .and_then(|()| staged.as_file().sync_all())
            .map_err(|e| self.io_error(e))?;
        staged
            .persist(&self.path)
            .map_err(|e| self.io_error(e.error))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::SourceEntry;

    #[test]
    fn typed_helpers_round_trip() {
        let store = MemoryStore::new();
        let sources = vec![SourceEntry::new("https://a/x.yaml"), SourceEntry::new("")];
        store_json(&store, SOURCES_KEY, &sources).expect("store");

        let loaded: Vec<SourceEntry> = load_json(&store, SOURCES_KEY).expect("cached");
        assert_eq!(loaded, sources);
        assert!(load_json::<Vec<SourceEntry>>(&store, LINKS_KEY).is_none());
    }

    #[test]
    fn malformed_entries_read_as_missing() {
        let store = MemoryStore::new();
        store.set(LINKS_KEY, "{not json".to_string()).expect("store");
        assert!(load_json::<Vec<SourceEntry>>(&store, LINKS_KEY).is_none());
    }

    #[test]
    fn local_only_marker_is_per_document() {
        let store = MemoryStore::new();
        assert!(!is_local_only(&store, SOURCES_KEY));

        set_local_only(&store, SOURCES_KEY, true).expect("mark");
        assert!(is_local_only(&store, SOURCES_KEY));
        assert!(!is_local_only(&store, LINKS_KEY));

        set_local_only(&store, SOURCES_KEY, false).expect("clear");
        assert!(!is_local_only(&store, SOURCES_KEY));
    }

    #[test]
    fn file_store_persists_across_reopen() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("state").join("cache.json");
        let store = JsonFileStore::open(&path);
        assert!(store.get(FILES_KEY).is_none());
        store.set(FILES_KEY, "[]".to_string()).expect("write");

        let reopened = JsonFileStore::open(&path);
        assert_eq!(reopened.get(FILES_KEY).as_deref(), Some("[]"));
    }

    #[test]
    fn writes_leave_no_staging_files_behind() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("cache.json");
        let store = JsonFileStore::open(&path);
        store.set(SOURCES_KEY, "[]".to_string()).expect("first write");
        store.set(LINKS_KEY, "[]".to_string()).expect("second write");

        let names: Vec<_> = fs::read_dir(dir.path())
            .expect("list")
            .map(|entry| entry.expect("entry").file_name())
            .collect();
        assert_eq!(names, vec![std::ffi::OsString::from("cache.json")]);
        assert_eq!(JsonFileStore::open(&path).get(LINKS_KEY).as_deref(), Some("[]"));
    }

    #[test]
    fn corrupt_file_reads_as_empty() {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        file.write_all(b"garbage").expect("write");

        let store = JsonFileStore::open(file.path());
        assert!(store.get(SOURCES_KEY).is_none());
    }
}
