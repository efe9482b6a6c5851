//! Blob API endpoints

use batcho_core::dto::blob::{BlobAddressResponse, hash_from_address};

use crate::HttpStoreClient;
use crate::error::{Result, StoreError};

impl HttpStoreClient {
    /// Upload a blob
    ///
    /// # Returns
    /// The blob's content address (`sha256://...`)
    pub async fn upload_blob(&self, content: Vec<u8>) -> Result<String> {
        let url = format!("{}/api/blobs", self.base_url);
        let response = self.client.put(&url).body(content).send().await?;

        let body: BlobAddressResponse = self.handle_response(response).await?;
        Ok(body.address)
    }

    /// Download a blob by address
    ///
    /// # Returns
    /// `None` when the store has no blob with that address
    pub async fn download_blob(&self, address: &str) -> Result<Option<Vec<u8>>> {
        let url = self.blob_url_for(address)?;
        let response = self.client.get(&url).send().await?;

        self.handle_bytes_response(response).await
    }

    /// URL of a blob on the store service
    pub fn blob_url_for(&self, address: &str) -> Result<String> {
        let hash = hash_from_address(address).ok_or_else(|| {
            StoreError::InvalidRequest(format!("Invalid blob address: {}", address))
        })?;
        Ok(format!("{}/api/blobs/{}", self.base_url, hash))
    }
}
