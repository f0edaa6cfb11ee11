//! Key/value persistence for the local caches
//!
//! Each key maps to one JSON document. The on-disk backend writes documents
//! atomically so a crash never leaves a half-written cache behind.

use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::{debug, info};

/// Text storage keyed by name, the local equivalent of browser local storage
pub trait KeyValueStore: Send + Sync {
    /// Read the document stored under `key`, or None if nothing was ever written
    fn get(&self, key: &str) -> Result<Option<String>>;

    /// Replace the document stored under `key`
    fn set(&self, key: &str, value: &str) -> Result<()>;
}

/// Stores each key as `<dir>/<key>.json`
pub struct FileStore {
    /// Root directory for the documents
    dir: PathBuf,
}

impl FileStore {
    /// Open a store rooted at `dir`, creating the directory if needed
    pub fn open(dir: PathBuf) -> Result<Self> {
        fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create data directory: {:?}", dir))?;

        info!(data_dir = %dir.display(), "Local store opened");
        Ok(Self { dir })
    }

    /// Get the data directory path
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> PathBuf {
        // Keys are plain names; keep them from escaping the directory
        let safe_key = key.replace(['/', '\\', ':'], "_");
        self.dir.join(format!("{}.json", safe_key))
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let path = self.path_for(key);
        match fs::read_to_string(&path) {
            Ok(text) => Ok(Some(text)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e).with_context(|| format!("Failed to read {:?}", path)),
        }
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let path = self.path_for(key);

        let mut tmp = tempfile::NamedTempFile::new_in(&self.dir)
            .context("Failed to create temp file for store")?;
        tmp.write_all(value.as_bytes())
            .context("Failed to write store document")?;
        tmp.persist(&path)
            .with_context(|| format!("Failed to persist store document: {:?}", path))?;

        debug!(key = key, size = value.len(), "Stored document");
        Ok(())
    }
}

/// In-memory stand-in for tests
#[cfg(test)]
#[derive(Default)]
pub struct MemoryStore {
    entries: std::sync::Mutex<std::collections::HashMap<String, String>>,
}

#[cfg(test)]
impl MemoryStore {
    pub fn with_entry(key: &str, value: &str) -> Self {
        let store = Self::default();
        store.set(key, value).unwrap();
        store
    }
}

#[cfg(test)]
impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.entries.lock().unwrap().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        self.entries
            .lock()
            .unwrap()
            .insert(key.to_string(), value.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_key_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::open(dir.path().to_path_buf()).unwrap();
        assert!(store.get("uploadedFiles").unwrap().is_none());
    }

    #[test]
    fn test_set_then_get_and_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::open(dir.path().join("nested")).unwrap();

        store.set("uploadedFiles", "{\"a\":1}").unwrap();
        assert_eq!(store.get("uploadedFiles").unwrap().as_deref(), Some("{\"a\":1}"));

        store.set("uploadedFiles", "{}").unwrap();
        assert_eq!(store.get("uploadedFiles").unwrap().as_deref(), Some("{}"));
        assert!(store.dir().join("uploadedFiles.json").exists());
    }

    #[test]
    fn test_key_cannot_escape_directory() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::open(dir.path().to_path_buf()).unwrap();

        store.set("../evil", "x").unwrap();
        assert!(store.dir().join(".._evil.json").exists());
        assert_eq!(store.get("../evil").unwrap().as_deref(), Some("x"));
    }

    #[test]
    fn test_memory_store() {
        let store = MemoryStore::with_entry("k", "v");
        assert_eq!(store.get("k").unwrap().as_deref(), Some("v"));
        assert!(store.get("other").unwrap().is_none());
    }
}
