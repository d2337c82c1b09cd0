//! Key-value storage for local saves.
//!
//! A save is one JSON blob under a fixed key. [`FileStore`] keeps each key
//! in its own file and replaces it atomically; [`MemoryStore`] is the
//! in-process variant used by tests and tools.

use parking_lot::RwLock;
use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

/// Storage error types.
#[derive(Debug, Error)]
pub enum StorageError {
    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Key is not usable as a file name.
    #[error("Invalid key: {0:?}")]
    InvalidKey(String),

    /// Atomic rename failed.
    #[error("Atomic write failed: {0}")]
    AtomicWriteFailed(String),
}

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Synchronous string key-value store.
pub trait KeyValueStore: Send + Sync {
    /// Backend name.
    fn name(&self) -> &str;

    /// Reads a value. `Ok(None)` if the key is absent.
    fn get(&self, key: &str) -> StorageResult<Option<String>>;

    /// Writes a value, replacing any previous one.
    fn set(&self, key: &str, value: &str) -> StorageResult<()>;

    /// Deletes a value. Returns whether it existed.
    fn remove(&self, key: &str) -> StorageResult<bool>;

    /// Checks if a key is present.
    fn contains(&self, key: &str) -> StorageResult<bool> {
        Ok(self.get(key)?.is_some())
    }
}

/// In-memory store.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: RwLock<HashMap<String, String>>,
}

impl MemoryStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored keys.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Checks if nothing is stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

impl KeyValueStore for MemoryStore {
    fn name(&self) -> &str {
        "Memory"
    }

    fn get(&self, key: &str) -> StorageResult<Option<String>> {
        Ok(self.entries.read().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> StorageResult<()> {
        self.entries
            .write()
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> StorageResult<bool> {
        Ok(self.entries.write().remove(key).is_some())
    }
}

/// Directory-backed store: one `<key>.json` file per key.
#[derive(Debug, Clone)]
pub struct FileStore {
    base_path: PathBuf,
}

impl FileStore {
    /// Creates a store rooted at `base_path`. The directory is created on
    /// first write.
    #[must_use]
    pub fn new(base_path: impl AsRef<Path>) -> Self {
        Self {
            base_path: base_path.as_ref().to_path_buf(),
        }
    }

    /// Returns the base path.
    #[must_use]
    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    fn key_path(&self, key: &str) -> StorageResult<PathBuf> {
        let valid = !key.is_empty()
            && key
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'))
            && !key.starts_with('.');
        if !valid {
            return Err(StorageError::InvalidKey(key.to_string()));
        }
        Ok(self.base_path.join(format!("{key}.json")))
    }
}

impl KeyValueStore for FileStore {
    fn name(&self) -> &str {
        "File"
    }

    fn get(&self, key: &str) -> StorageResult<Option<String>> {
        let path = self.key_path(key)?;
        if !path.exists() {
            return Ok(None);
        }
        let data = fs::read_to_string(&path)?;
        debug!("Read {} bytes from {}", data.len(), path.display());
        Ok(Some(data))
    }

    fn set(&self, key: &str, value: &str) -> StorageResult<()> {
        let final_path = self.key_path(key)?;
        fs::create_dir_all(&self.base_path)?;
        let temp_path = final_path.with_extension("json.tmp");

        {
            let file = File::create(&temp_path)?;
            let mut writer = BufWriter::new(file);
            writer.write_all(value.as_bytes())?;
            writer.flush()?;
        }

        fs::rename(&temp_path, &final_path).map_err(|e| {
            let _ = fs::remove_file(&temp_path);
            StorageError::AtomicWriteFailed(e.to_string())
        })?;

        debug!("Wrote {} bytes to {}", value.len(), final_path.display());
        Ok(())
    }

    fn remove(&self, key: &str) -> StorageResult<bool> {
        let path = self.key_path(key)?;
        if !path.exists() {
            return Ok(false);
        }
        fs::remove_file(&path)?;
        debug!("Deleted {}", path.display());
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_memory_store() {
        let store = MemoryStore::new();
        assert_eq!(store.get("save").expect("get"), None);
        store.set("save", "{}").expect("set");
        assert!(store.contains("save").expect("contains"));
        assert_eq!(store.len(), 1);
        assert!(store.remove("save").expect("remove"));
        assert!(!store.remove("save").expect("remove"));
        assert!(store.is_empty());
    }

    #[test]
    fn test_file_store_round_trip() {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let store = FileStore::new(dir.path().join("saves"));

        assert_eq!(store.get("slot_1").expect("get"), None);
        store.set("slot_1", "first").expect("set");
        store.set("slot_1", "second").expect("overwrite");
        assert_eq!(store.get("slot_1").expect("get").as_deref(), Some("second"));

        assert!(dir.path().join("saves/slot_1.json").exists());
        assert!(!dir.path().join("saves/slot_1.json.tmp").exists());

        assert!(store.remove("slot_1").expect("remove"));
        assert!(!store.contains("slot_1").expect("contains"));
    }

    #[test]
    fn test_file_store_rejects_path_keys() {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let store = FileStore::new(dir.path());
        assert!(matches!(
            store.set("../escape", "x"),
            Err(StorageError::InvalidKey(_))
        ));
        assert!(matches!(store.get(""), Err(StorageError::InvalidKey(_))));
    }
}
