//! Storage media that a [`CredentialStore`](crate::CredentialStore) can sit on.
//!
//! A backend is a flat string-to-string map scoped to one origin, the
//! same shape as a browser's `localStorage`. Two backends ship with the
//! crate:
//!
//! - [`MemoryStorage`]: lives as long as the process. Clones share the
//!   same map, so a client rebuilt from a clone behaves like a page reload.
//! - [`FileStorage`]: one JSON file per origin. Survives restarts.

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use crate::StoreError;

/// A key/value medium for persisted credentials.
///
/// Every `set`/`remove` must be visible to a `get` issued right after it
/// on the same thread. No buffering, no write-behind.
pub trait StorageBackend: Send + Sync + 'static {
    /// Returns the value stored under `key`, if any.
    fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Stores `value` under `key`, replacing any previous value.
    fn set(&self, key: &str, value: &str) -> Result<(), StoreError>;

    /// Removes `key`. Removing a missing key is not an error.
    fn remove(&self, key: &str) -> Result<(), StoreError>;
}

// ---------------------------------------------------------------------------
// MemoryStorage
// ---------------------------------------------------------------------------

/// In-process storage. Cheap to clone; clones share entries.
#[derive(Debug, Clone, Default)]
pub struct MemoryStorage {
    entries: Arc<Mutex<HashMap<String, String>>>,
}

impl MemoryStorage {
    /// Creates an empty storage.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of stored keys.
    pub fn len(&self) -> usize {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Returns `true` if nothing is stored.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl StorageBackend for MemoryStorage {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let entries =
            self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(entries.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let mut entries =
            self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StoreError> {
        let mut entries =
            self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.remove(key);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// FileStorage
// ---------------------------------------------------------------------------

/// Persistent storage: one JSON object per origin under a directory.
///
/// The file name is derived from the origin with an injective escape, so
/// `http://a:1` and `http://a_1` never share a file. Writes go to a
/// sibling temp file and are renamed into place, so a crash mid-write
/// leaves the previous contents intact.
#[derive(Debug)]
pub struct FileStorage {
    path: PathBuf,
    /// Serializes read-modify-write cycles within this process.
    lock: Mutex<()>,
}

impl FileStorage {
    /// Creates storage for `origin` inside `dir`. Nothing is touched on
    /// disk until the first write.
    pub fn new(dir: impl Into<PathBuf>, origin: &str) -> Self {
        let path = dir.into().join(format!("{}.json", escape_origin(origin)));
        Self {
            path,
            lock: Mutex::new(()),
        }
    }

    /// Returns the file backing this storage.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_entries(&self) -> Result<BTreeMap<String, String>, StoreError> {
        match fs::read(&self.path) {
            Ok(bytes) if bytes.is_empty() => Ok(BTreeMap::new()),
            Ok(bytes) => serde_json::from_slice(&bytes).map_err(|e| {
                tracing::warn!(
                    path = %self.path.display(),
                    error = %e,
                    "credential file is not a JSON object of strings"
                );
                StoreError::Corrupt(e)
            }),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(BTreeMap::new()),
            Err(e) => Err(StoreError::Io(e)),
        }
    }

    fn write_entries(
        &self,
        entries: &BTreeMap<String, String>,
    ) -> Result<(), StoreError> {
        if entries.is_empty() {
            return match fs::remove_file(&self.path) {
                Err(e) if e.kind() != ErrorKind::NotFound => Err(e.into()),
                _ => Ok(()),
            };
        }

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let bytes =
            serde_json::to_vec_pretty(entries).map_err(StoreError::Corrupt)?;
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, bytes)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

impl StorageBackend for FileStorage {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(self.read_entries()?.remove(key))
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        let mut entries = self.read_entries()?;
        entries.insert(key.to_string(), value.to_string());
        self.write_entries(&entries)
    }

    fn remove(&self, key: &str) -> Result<(), StoreError> {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        let mut entries = self.read_entries()?;
        if entries.remove(key).is_none() {
            return Ok(());
        }
        self.write_entries(&entries)
    }
}

/// Maps an origin to a file-name-safe string. ASCII alphanumerics, `-`
/// and `.` pass through; every other byte becomes `_xx` (lowercase hex).
fn escape_origin(origin: &str) -> String {
    let mut out = String::with_capacity(origin.len());
    for byte in origin.bytes() {
        if byte.is_ascii_alphanumeric() || byte == b'-' || byte == b'.' {
            out.push(byte as char);
        } else {
            out.push_str(&format!("_{byte:02x}"));
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_set_then_get_returns_value() {
        let storage = MemoryStorage::new();
        storage.set("k", "v").unwrap();
        assert_eq!(storage.get("k").unwrap().as_deref(), Some("v"));
    }

    #[test]
    fn test_memory_clone_shares_entries() {
        let a = MemoryStorage::new();
        let b = a.clone();
        a.set("k", "v").unwrap();
        assert_eq!(b.get("k").unwrap().as_deref(), Some("v"));
        b.remove("k").unwrap();
        assert!(a.is_empty());
    }

    #[test]
    fn test_memory_remove_missing_key_is_ok() {
        let storage = MemoryStorage::new();
        assert!(storage.remove("nope").is_ok());
    }

    #[test]
    fn test_escape_origin_keeps_safe_chars() {
        assert_eq!(escape_origin("example.com"), "example.com");
        assert_eq!(escape_origin("a-b"), "a-b");
    }

    #[test]
    fn test_escape_origin_is_injective_for_underscore() {
        // `_` itself is escaped, so an escaped `:` can't collide with it.
        assert_ne!(escape_origin("a:1"), escape_origin("a_1"));
        assert_eq!(escape_origin("a:1"), "a_3a1");
        assert_eq!(escape_origin("a_1"), "a_5f1");
    }

    #[test]
    fn test_file_get_missing_file_returns_none() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FileStorage::new(dir.path(), "http://localhost:3000");
        assert_eq!(storage.get("k").unwrap(), None);
        assert!(!storage.path().exists());
    }

    #[test]
    fn test_file_set_is_immediately_visible() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FileStorage::new(dir.path(), "http://localhost:3000");
        storage.set("k", "v1").unwrap();
        assert_eq!(storage.get("k").unwrap().as_deref(), Some("v1"));
        storage.set("k", "v2").unwrap();
        assert_eq!(storage.get("k").unwrap().as_deref(), Some("v2"));
    }

    #[test]
    fn test_file_removing_last_key_deletes_file() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FileStorage::new(dir.path(), "origin");
        storage.set("k", "v").unwrap();
        assert!(storage.path().exists());

        storage.remove("k").unwrap();

        assert!(!storage.path().exists());
        assert_eq!(storage.get("k").unwrap(), None);
    }

    #[test]
    fn test_file_garbage_contents_is_corrupt() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FileStorage::new(dir.path(), "origin");
        fs::write(storage.path(), b"not json").unwrap();

        let result = storage.get("k");

        assert!(matches!(result, Err(StoreError::Corrupt(_))));
    }
}
