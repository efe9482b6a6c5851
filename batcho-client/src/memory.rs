//! In-process store
//!
//! Keeps keys and blobs in memory. Conditional writes are atomic because every
//! operation holds the map's mutex for its whole duration.

use async_trait::async_trait;
use batcho_core::dto::blob::hash_from_address;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::error::{Result, StoreError};
use crate::store::{KeyValueStore, content_address};

/// In-memory implementation of KeyValueStore
#[derive(Debug)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, String>>,
    blobs: Mutex<HashMap<String, Vec<u8>>>,
    cache_dir: PathBuf,
}

impl MemoryStore {
    /// Creates an empty store caching realized files in the default directory
    pub fn new() -> Self {
        Self::with_cache_dir(crate::default_cache_dir())
    }

    /// Creates an empty store caching realized files in `cache_dir`
    pub fn with_cache_dir(cache_dir: impl Into<PathBuf>) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            blobs: Mutex::new(HashMap::new()),
            cache_dir: cache_dir.into(),
        }
    }

    /// Number of keys currently stored
    pub fn len(&self) -> usize {
        self.entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries().is_empty()
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<String, String>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn blobs(&self) -> MutexGuard<'_, HashMap<String, Vec<u8>>> {
        self.blobs.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

fn write_entry(entries: &mut HashMap<String, String>, key: &str, value: Option<&str>) {
    match value {
        Some(value) => {
            entries.insert(key.to_string(), value.to_string());
        }
        None => {
            entries.remove(key);
        }
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.entries().get(key).cloned())
    }

    async fn set(&self, key: &str, value: Option<&str>, overwrite: bool) -> Result<bool> {
        let mut entries = self.entries();

        if !overwrite && entries.contains_key(key) {
            return Ok(false);
        }

        write_entry(&mut entries, key, value);
        Ok(true)
    }

    async fn compare_and_set(
        &self,
        key: &str,
        expected: Option<&str>,
        value: Option<&str>,
    ) -> Result<bool> {
        let mut entries = self.entries();

        if entries.get(key).map(String::as_str) != expected {
            return Ok(false);
        }

        write_entry(&mut entries, key, value);
        Ok(true)
    }

    async fn put_blob(&self, content: Vec<u8>) -> Result<String> {
        let address = content_address(&content);
        self.blobs().entry(address.clone()).or_insert(content);
        Ok(address)
    }

    async fn get_blob(&self, address: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.blobs().get(address).cloned())
    }

    fn blob_url(&self, address: &str) -> Result<String> {
        let hash = hash_from_address(address).ok_or_else(|| {
            StoreError::InvalidRequest(format!("Invalid blob address: {}", address))
        })?;
        Ok(format!("memory://blobs/{}", hash))
    }

    fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }
}
