//! Local key/value persistence.
//!
//! The storefront keeps three small pieces of state on the customer's
//! machine: the cart, the session token, and the page to return to after
//! login. They live behind [`KeyValueStorage`] so the cart store and session
//! never touch a backend directly and tests can use [`MemoryStorage`].
//!
//! Values are whole JSON documents. A write replaces the previous value, so
//! two processes sharing a data directory follow last-writer-wins.

use std::collections::HashMap;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use thiserror::Error;

/// Storage keys used by the storefront.
pub mod keys {
    /// JSON array of cart line items.
    pub const CART: &str = "cart";
    /// Session bearer token.
    pub const TOKEN: &str = "token";
    /// Route to open after a successful login.
    pub const LAST_PAGE: &str = "lastPage";
}

/// Errors that can occur when reading or writing local storage.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Key contains characters that cannot be used as a file name.
    #[error("invalid storage key: {0:?}")]
    InvalidKey(String),

    /// Filesystem operation failed.
    #[error("storage I/O error for key {key}: {source}")]
    Io {
        key: String,
        #[source]
        source: io::Error,
    },
}

/// Injectable string key/value store.
pub trait KeyValueStorage: Send + Sync {
    /// Read a value; `Ok(None)` when the key was never written or was removed.
    ///
    /// # Errors
    ///
    /// Returns an error if the backing store cannot be read.
    fn get(&self, key: &str) -> Result<Option<String>, StorageError>;

    /// Write a value, replacing any previous one.
    ///
    /// # Errors
    ///
    /// Returns an error if the backing store cannot be written.
    fn set(&self, key: &str, value: &str) -> Result<(), StorageError>;

    /// Remove a value. Removing a missing key is not an error.
    ///
    /// # Errors
    ///
    /// Returns an error if the backing store cannot be written.
    fn remove(&self, key: &str) -> Result<(), StorageError>;
}

// =============================================================================
// MemoryStorage
// =============================================================================

/// In-process storage, lost when dropped.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryStorage {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Storage pre-seeded with one value.
    #[must_use]
    pub fn with_entry(key: &str, value: &str) -> Self {
        let storage = Self::default();
        storage.lock().insert(key.to_string(), value.to_string());
        storage
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, String>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl KeyValueStorage for MemoryStorage {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self.lock().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        self.lock().insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        self.lock().remove(key);
        Ok(())
    }
}

// =============================================================================
// FileStorage
// =============================================================================

/// One file per key under a data directory.
///
/// Writes go to a temporary sibling first and are renamed into place, so a
/// crash mid-write leaves the previous value intact.
#[derive(Debug, Clone)]
pub struct FileStorage {
    dir: PathBuf,
}

impl FileStorage {
    /// Open (and create if needed) a storage directory.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let dir = dir.into();
        fs::create_dir_all(&dir).map_err(|source| StorageError::Io {
            key: dir.display().to_string(),
            source,
        })?;
        Ok(Self { dir })
    }

    /// Directory holding the stored values.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> Result<PathBuf, StorageError> {
        let valid = !key.is_empty()
            && key
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
        if !valid {
            return Err(StorageError::InvalidKey(key.to_string()));
        }
        Ok(self.dir.join(format!("{key}.json")))
    }
}

impl KeyValueStorage for FileStorage {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        let path = self.path_for(key)?;
        match fs::read_to_string(&path) {
            Ok(value) => Ok(Some(value)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(source) => Err(StorageError::Io {
                key: key.to_string(),
                source,
            }),
        }
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let path = self.path_for(key)?;
        let tmp = path.with_extension("json.tmp");
        let io_err = |source| StorageError::Io {
            key: key.to_string(),
            source,
        };

        let mut file = fs::File::create(&tmp).map_err(io_err)?;
        file.write_all(value.as_bytes()).map_err(io_err)?;
        file.sync_all().map_err(io_err)?;
        drop(file);
        fs::rename(&tmp, &path).map_err(io_err)
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        let path = self.path_for(key)?;
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(StorageError::Io {
                key: key.to_string(),
                source,
            }),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_storage_roundtrip() {
        let storage = MemoryStorage::new();
        assert_eq!(storage.get(keys::CART).unwrap(), None);

        storage.set(keys::CART, "[]").unwrap();
        assert_eq!(storage.get(keys::CART).unwrap().as_deref(), Some("[]"));

        storage.remove(keys::CART).unwrap();
        storage.remove(keys::CART).unwrap();
        assert_eq!(storage.get(keys::CART).unwrap(), None);
    }

    #[test]
    fn test_file_storage_persists_across_instances() {
        let dir = tempfile::tempdir().unwrap();

        let first = FileStorage::open(dir.path().join("data")).unwrap();
        first.set(keys::TOKEN, "abc").unwrap();
        first.set(keys::TOKEN, "def").unwrap();

        let second = FileStorage::open(dir.path().join("data")).unwrap();
        assert_eq!(second.get(keys::TOKEN).unwrap().as_deref(), Some("def"));
        assert!(!second.dir().join("token.json.tmp").exists());
    }

    #[test]
    fn test_file_storage_remove_missing_is_ok() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FileStorage::open(dir.path()).unwrap();
        storage.remove(keys::LAST_PAGE).unwrap();
        assert_eq!(storage.get(keys::LAST_PAGE).unwrap(), None);
    }

    #[test]
    fn test_file_storage_rejects_path_keys() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FileStorage::open(dir.path()).unwrap();
        assert!(matches!(
            storage.set("../escape", "x"),
            Err(StorageError::InvalidKey(_))
        ));
        assert!(matches!(storage.get(""), Err(StorageError::InvalidKey(_))));
    }
}
