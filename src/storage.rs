//! Client-local key/value storage for session state (open tabs, editor
//! positions). Values are JSON strings; a missing or unreadable entry is
//! always treated as "no state".

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::KbaseError;

pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;
    fn set(&self, key: &str, value: &str) -> Result<(), KbaseError>;
    fn remove(&self, key: &str) -> Result<(), KbaseError>;
    /// All keys currently stored, in no particular order.
    fn keys(&self) -> Vec<String>;
}

pub type SharedStore = Arc<dyn KeyValueStore>;

/// Reads and decodes a JSON value, treating corrupt entries as absent.
pub fn load_json<T: DeserializeOwned>(store: &dyn KeyValueStore, key: &str) -> Option<T> {
    let raw = store.get(key)?;
    match serde_json::from_str(&raw) {
        Ok(value) => Some(value),
        Err(error) => {
            log::warn!("Ignoring corrupt stored value for {key}: {error}");
            None
        }
    }
}

pub fn save_json<T: Serialize>(store: &dyn KeyValueStore, key: &str, value: &T) -> Result<(), KbaseError> {
    let raw = serde_json::to_string(value)?;
    store.set(key, &raw)
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shared() -> SharedStore {
        Arc::new(Self::new())
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Option<String> {
        self.entries.lock().ok()?.get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) -> Result<(), KbaseError> {
        if let Ok(mut entries) = self.entries.lock() {
            entries.insert(key.to_string(), value.to_string());
        }
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), KbaseError> {
        if let Ok(mut entries) = self.entries.lock() {
            entries.remove(key);
        }
        Ok(())
    }

    fn keys(&self) -> Vec<String> {
        self.entries
            .lock()
            .map(|entries| entries.keys().cloned().collect())
            .unwrap_or_default()
    }
}

/// One file per key under a directory; file names are the URL-encoded keys.
#[derive(Debug)]
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    pub fn open(dir: &Path) -> Result<Self, KbaseError> {
        std::fs::create_dir_all(dir)?;
        Ok(Self { dir: dir.to_path_buf() })
    }

    /// Opens the store in the platform data directory (`~/.local/share/kbase/state` on Linux).
    pub fn open_default() -> Result<Self, KbaseError> {
        let data = dirs_next::data_dir().ok_or(KbaseError::NoDataDir)?;
        Self::open(&data.join("kbase").join("state"))
    }

    fn entry_path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.json", urlencoding::encode(key)))
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Option<String> {
        match std::fs::read_to_string(self.entry_path(key)) {
            Ok(raw) => Some(raw),
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => None,
            Err(error) => {
                log::warn!("Cannot read stored value for {key}: {error}");
                None
            }
        }
    }

    fn set(&self, key: &str, value: &str) -> Result<(), KbaseError> {
        // Readers only ever see a complete entry.
        let path = self.entry_path(key);
        let staging = path.with_extension("json.tmp");
        std::fs::write(&staging, value)?;
        std::fs::rename(&staging, &path)?;
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), KbaseError> {
        match std::fs::remove_file(self.entry_path(key)) {
            Err(error) if error.kind() != std::io::ErrorKind::NotFound => Err(error.into()),
            _ => Ok(()),
        }
    }

    fn keys(&self) -> Vec<String> {
        let Ok(read_dir) = std::fs::read_dir(&self.dir) else {
            return Vec::new();
        };
        read_dir
            .filter_map(|entry| entry.ok())
            .filter_map(|entry| {
                let name = entry.file_name().to_string_lossy().to_string();
                let encoded = name.strip_suffix(".json")?;
                urlencoding::decode(encoded).ok().map(|key| key.into_owned())
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use tempfile::TempDir;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Sample {
        count: u32,
    }

    #[test]
    fn memory_store_round_trip() {
        let store = MemoryStore::new();
        save_json(&store, "a", &Sample { count: 3 }).unwrap();
        assert_eq!(load_json::<Sample>(&store, "a"), Some(Sample { count: 3 }));
        store.remove("a").unwrap();
        assert_eq!(load_json::<Sample>(&store, "a"), None);
    }

    #[test]
    fn corrupt_entry_is_absent() {
        let store = MemoryStore::new();
        store.set("a", "{not json").unwrap();
        assert_eq!(load_json::<Sample>(&store, "a"), None);
    }

    #[test]
    fn file_store_encodes_keys_with_slashes() {
        let temp = TempDir::new().unwrap();
        let store = FileStore::open(temp.path()).unwrap();

        store.set("kbase:note-state:/a/b.md", "{}").unwrap();

        assert_eq!(store.get("kbase:note-state:/a/b.md").as_deref(), Some("{}"));
        assert_eq!(store.keys(), vec!["kbase:note-state:/a/b.md".to_string()]);
        assert_eq!(std::fs::read_dir(temp.path()).unwrap().count(), 1);
    }

    #[test]
    fn file_store_survives_reopen() {
        let temp = TempDir::new().unwrap();
        FileStore::open(temp.path()).unwrap().set("k", "\"v\"").unwrap();

        let reopened = FileStore::open(temp.path()).unwrap();
        assert_eq!(load_json::<String>(&reopened, "k").as_deref(), Some("v"));
    }

    #[test]
    fn removing_missing_key_is_fine() {
        let temp = TempDir::new().unwrap();
        let store = FileStore::open(temp.path()).unwrap();
        assert!(store.remove("nothing").is_ok());
        assert_eq!(store.get("nothing"), None);
    }
}
