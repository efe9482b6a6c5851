//! Batcho Store Client
//!
//! Access to the shared key/value store that batch coordination is built on.
//!
//! This crate provides:
//! - `KeyValueStore`: the store operations the coordinator needs
//! - `HttpStoreClient`: a client for the `batcho-store` HTTP service
//! - `MemoryStore`: an in-process store for tests and single-host setups
//!
//! # Example
//!
//! ```no_run
//! use batcho_client::{HttpStoreClient, KeyValueStore};
//!
//! #[tokio::main]
//! async fn main() -> batcho_client::Result<()> {
//!     let store = HttpStoreClient::new("http://localhost:8080");
//!
//!     // Set-if-absent: only the first writer wins
//!     let won = store.set("batcho/job_lock/b1/0", Some("abc123"), false).await?;
//!     println!("lock acquired: {}", won);
//!     Ok(())
//! }
//! ```

mod blobs;
pub mod error;
mod kv;
mod memory;
mod store;

// Re-export commonly used types
pub use error::{Result, StoreError};
pub use memory::MemoryStore;
pub use store::{KeyValueStore, content_address};

use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};

/// Default directory for realized files
pub fn default_cache_dir() -> PathBuf {
    std::env::temp_dir().join("batcho-cache")
}

/// HTTP client for the batcho store service
///
/// Methods are organized into logical groups:
/// - Key/value reads and (conditional) writes
/// - Blob upload and download
#[derive(Debug, Clone)]
pub struct HttpStoreClient {
    /// Base URL of the store (e.g., "http://localhost:8080")
    base_url: String,
    /// HTTP client instance
    client: Client,
    /// Where realized files are written
    cache_dir: PathBuf,
}

impl HttpStoreClient {
    /// Create a new store client
    ///
    /// # Arguments
    /// * `base_url` - The base URL of the store API (e.g., "http://localhost:8080")
    ///
    /// # Example
    /// ```
    /// use batcho_client::HttpStoreClient;
    ///
    /// let client = HttpStoreClient::new("http://localhost:8080");
    /// ```
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_client(base_url, Client::new())
    }

    /// Create a new store client with a custom HTTP client
    ///
    /// This allows you to configure timeouts, proxies, TLS settings, etc.
    pub fn with_client(base_url: impl Into<String>, client: Client) -> Self {
        let base_url = base_url.into();
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
            cache_dir: default_cache_dir(),
        }
    }

    /// Use a different directory for realized files
    pub fn with_cache_dir(mut self, cache_dir: impl Into<PathBuf>) -> Self {
        self.cache_dir = cache_dir.into();
        self
    }

    /// Get the base URL of the store
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Check that the store service is up and can reach its database
    pub async fn health(&self) -> Result<()> {
        let url = format!("{}/health", self.base_url);
        let response = self.client.get(&url).send().await?;

        if !response.status().is_success() {
            return Err(api_error_from(response).await);
        }
        Ok(())
    }

    // =============================================================================
    // Response Handlers
    // =============================================================================

    /// Deserialize a JSON body, or turn an error status into `StoreError::Api`
    async fn handle_response<T: DeserializeOwned>(&self, response: reqwest::Response) -> Result<T> {
        if !response.status().is_success() {
            return Err(api_error_from(response).await);
        }

        response
            .json()
            .await
            .map_err(|e| StoreError::Parse(format!("Failed to parse JSON response: {}", e)))
    }

    /// Read a raw body; a 404 means the blob is absent
    async fn handle_bytes_response(&self, response: reqwest::Response) -> Result<Option<Vec<u8>>> {
        match response.status() {
            reqwest::StatusCode::NOT_FOUND => Ok(None),
            status if status.is_success() => Ok(Some(response.bytes().await?.to_vec())),
            _ => Err(api_error_from(response).await),
        }
    }
}

/// Builds an API error from a failed response, keeping its body as the message
async fn api_error_from(response: reqwest::Response) -> StoreError {
    let status = response.status().as_u16();
    let message = match response.text().await {
        Ok(body) if !body.is_empty() => body,
        _ => "Unknown error".to_string(),
    };
    StoreError::api_error(status, message)
}

#[async_trait]
impl KeyValueStore for HttpStoreClient {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        self.get_value(key).await
    }

    async fn set(&self, key: &str, value: Option<&str>, overwrite: bool) -> Result<bool> {
        self.set_value(key, value, overwrite).await
    }

    async fn compare_and_set(
        &self,
        key: &str,
        expected: Option<&str>,
        value: Option<&str>,
    ) -> Result<bool> {
        self.compare_and_set_value(key, expected, value).await
    }

    async fn put_blob(&self, content: Vec<u8>) -> Result<String> {
        self.upload_blob(content).await
    }

    async fn get_blob(&self, address: &str) -> Result<Option<Vec<u8>>> {
        self.download_blob(address).await
    }

    fn blob_url(&self, address: &str) -> Result<String> {
        self.blob_url_for(address)
    }

    fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_creation() {
        let client = HttpStoreClient::new("http://localhost:8080");
        assert_eq!(client.base_url(), "http://localhost:8080");
    }

    #[test]
    fn test_client_trims_trailing_slash() {
        let client = HttpStoreClient::new("http://localhost:8080/");
        assert_eq!(client.base_url(), "http://localhost:8080");
    }

    #[test]
    fn test_client_with_cache_dir() {
        let client = HttpStoreClient::with_client("http://localhost:8080", Client::new())
            .with_cache_dir("/var/cache/batcho");
        assert_eq!(client.cache_dir(), Path::new("/var/cache/batcho"));
    }
}
