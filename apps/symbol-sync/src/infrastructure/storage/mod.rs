//! JSON File Key-Value Store
//!
//! Implements the `KeyValueStore` port as a single JSON object on disk.
//! Writes go to a sibling temp file, are fsynced, then renamed over the
//! target so a crash never leaves a torn file.

use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use serde_json::{Map, Value};

use crate::application::ports::{KeyValueStore, StoreError};

/// Default on-disk location.
pub const DEFAULT_STORE_PATH: &str = "./data/oracle-store.json";

/// Key-value store persisted as one JSON object.
#[derive(Debug)]
pub struct FileKeyValueStore {
    path: PathBuf,
    entries: Mutex<Map<String, Value>>,
}

impl FileKeyValueStore {
    /// Open the store at `path`.
    ///
    /// A missing file starts empty. An unreadable or corrupt file also
    /// starts empty, with a warning; it is overwritten on the next write.
    #[must_use]
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let entries = load(&path);
        Self {
            path,
            entries: Mutex::new(entries),
        }
    }

    /// File backing this store.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn write_atomic(&self, entries: &Map<String, Value>) -> Result<(), StoreError> {
        let io_err = |source| StoreError::Io {
            path: self.path.display().to_string(),
            source,
        };

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(io_err)?;
        }

        let bytes = serde_json::to_vec_pretty(entries)?;
        let tmp_path = self.path.with_extension("json.tmp");
        {
            let mut file = File::create(&tmp_path).map_err(io_err)?;
            file.write_all(&bytes).map_err(io_err)?;
            file.sync_all().map_err(io_err)?;
        }
        fs::rename(&tmp_path, &self.path).map_err(io_err)?;
        Ok(())
    }
}

impl KeyValueStore for FileKeyValueStore {
    fn get(&self, key: &str) -> Option<Value> {
        self.entries.lock().get(key).cloned()
    }

    fn set_many(&self, updates: &Map<String, Value>) -> Result<(), StoreError> {
        let mut entries = self.entries.lock();
        let mut next = entries.clone();
        for (key, value) in updates {
            next.insert(key.clone(), value.clone());
        }
        self.write_atomic(&next)?;
        *entries = next;
        Ok(())
    }
}

fn load(path: &Path) -> Map<String, Value> {
    let bytes = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Map::new(),
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "Store unreadable; starting empty");
            return Map::new();
        }
    };

    match serde_json::from_slice::<Value>(&bytes) {
        Ok(Value::Object(entries)) => entries,
        Ok(_) => {
            tracing::warn!(path = %path.display(), "Store is not a JSON object; starting empty");
            Map::new()
        }
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "Store is corrupt; starting empty");
            Map::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use tempfile::TempDir;

    use super::*;

    fn entries(pairs: &[(&str, Value)]) -> Map<String, Value> {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn missing_file_starts_empty() {
        let tmp = TempDir::new().unwrap();
        let store = FileKeyValueStore::open(tmp.path().join("store.json"));
        assert!(store.get("anything").is_none());
    }

    #[test]
    fn writes_survive_reopen_and_create_parents() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("nested/dir/store.json");

        let store = FileKeyValueStore::open(&path);
        store
            .set_many(&entries(&[("symbols.lastAckCursor", json!(42)), ("other", json!("x"))]))
            .unwrap();
        store.set_many(&entries(&[("symbols.lastAckCursor", json!(43))])).unwrap();

        let reopened = FileKeyValueStore::open(&path);
        assert_eq!(reopened.get("symbols.lastAckCursor"), Some(json!(43)));
        assert_eq!(reopened.get("other"), Some(json!("x")));
        assert!(!path.with_extension("json.tmp").exists());
    }

    #[test]
    fn corrupt_file_starts_empty_and_is_overwritten() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("store.json");
        fs::write(&path, b"{not json").unwrap();

        let store = FileKeyValueStore::open(&path);
        assert!(store.get("symbols.lastAckCursor").is_none());

        store.set_many(&entries(&[("k", json!(1))])).unwrap();
        assert_eq!(FileKeyValueStore::open(&path).get("k"), Some(json!(1)));
    }

    #[test]
    fn non_object_file_starts_empty() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("store.json");
        fs::write(&path, b"[1,2,3]").unwrap();

        assert!(FileKeyValueStore::open(&path).get("0").is_none());
    }

    #[test]
    fn failed_write_keeps_previous_entries() {
        let tmp = TempDir::new().unwrap();
        // A directory where the file should be makes the rename fail.
        let path = tmp.path().join("store.json");
        fs::create_dir_all(path.join("blocker")).unwrap();

        let store = FileKeyValueStore::open(&path);
        let err = store.set_many(&entries(&[("k", json!(1))])).unwrap_err();

        assert!(matches!(err, StoreError::Io { .. }));
        assert!(store.get("k").is_none());
    }
}
