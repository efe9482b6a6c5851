//! The shared key/value store abstraction
//!
//! Short string values live directly under their key. Larger payloads (objects
//! and files) are written as content-addressed blobs and the key holds a
//! pointer to the blob's address.

use async_trait::async_trait;
use batcho_core::dto::blob::{address_from_hash, hash_from_address};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::error::{Result, StoreError};

/// Computes the content address of a blob
pub fn content_address(content: &[u8]) -> String {
    address_from_hash(&hex::encode(Sha256::digest(content)))
}

/// Store operations required by the batch coordinator
///
/// Implementations provide the key and blob primitives; the object and file
/// helpers are built on top of them.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Reads the value stored under `key`
    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// Writes (or deletes, when `value` is `None`) the value under `key`
    ///
    /// With `overwrite = false` the write only happens if the key is absent.
    /// Returns whether the key now holds `value` because of this call.
    async fn set(&self, key: &str, value: Option<&str>, overwrite: bool) -> Result<bool>;

    /// Replaces the value under `key` only if it currently equals `expected`
    async fn compare_and_set(
        &self,
        key: &str,
        expected: Option<&str>,
        value: Option<&str>,
    ) -> Result<bool>;

    /// Uploads a blob and returns its content address
    async fn put_blob(&self, content: Vec<u8>) -> Result<String>;

    /// Downloads a blob by address
    async fn get_blob(&self, address: &str) -> Result<Option<Vec<u8>>>;

    /// URL under which a blob can be fetched directly
    fn blob_url(&self, address: &str) -> Result<String>;

    /// Directory where realized files are cached
    fn cache_dir(&self) -> &Path;

    /// Stores a JSON object and points `key` at it
    async fn save_object(&self, key: &str, object: &Value) -> Result<String> {
        let content = serde_json::to_vec(object)?;
        let address = self.put_blob(content).await?;
        self.set(key, Some(&address), true).await?;
        Ok(address)
    }

    /// Loads the JSON object `key` points at
    async fn load_object(&self, key: &str) -> Result<Option<Value>> {
        let Some(address) = self.get(key).await? else {
            return Ok(None);
        };
        let Some(content) = self.get_blob(&address).await? else {
            return Ok(None);
        };
        Ok(Some(serde_json::from_slice(&content)?))
    }

    /// Uploads a local file and points `key` at it
    async fn save_file(&self, key: &str, path: &Path) -> Result<String> {
        let content = tokio::fs::read(path).await?;
        let address = self.put_blob(content).await?;
        self.set(key, Some(&address), true).await?;
        Ok(address)
    }

    /// Makes the file `key` points at available locally and returns its path
    async fn realize_file(&self, key: &str) -> Result<Option<PathBuf>> {
        let Some(address) = self.get(key).await? else {
            return Ok(None);
        };
        let hash = hash_from_address(&address)
            .ok_or_else(|| StoreError::Parse(format!("Invalid blob address: {}", address)))?;

        let path = self.cache_dir().join(hash);
        if tokio::fs::try_exists(&path).await? {
            debug!("Realized {} from cache", key);
            return Ok(Some(path));
        }

        let Some(content) = self.get_blob(&address).await? else {
            return Ok(None);
        };

        tokio::fs::create_dir_all(self.cache_dir()).await?;
        let partial = path.with_extension("part");
        tokio::fs::write(&partial, content).await?;
        tokio::fs::rename(&partial, &path).await?;
        debug!("Downloaded {} to {}", key, path.display());

        Ok(Some(path))
    }

    /// Returns a URL for the file `key` points at
    async fn find_file(&self, key: &str) -> Result<Option<String>> {
        match self.get(key).await? {
            Some(address) => Ok(Some(self.blob_url(&address)?)),
            None => Ok(None),
        }
    }
}
