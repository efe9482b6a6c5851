//! Key/value API endpoints

use batcho_core::dto::kv::{
    CompareAndSetRequest, GetValueResponse, SetValueRequest, WriteResponse,
};

use crate::HttpStoreClient;
use crate::error::Result;

impl HttpStoreClient {
    /// Read the value stored under a key
    ///
    /// # Returns
    /// `None` when the key is absent
    pub async fn get_value(&self, key: &str) -> Result<Option<String>> {
        let url = format!("{}/api/kv", self.base_url);
        let response = self.client.get(&url).query(&[("key", key)]).send().await?;

        let body: GetValueResponse = self.handle_response(response).await?;
        Ok(body.value)
    }

    /// Write (or delete) the value stored under a key
    ///
    /// # Arguments
    /// * `key` - The key to write
    /// * `value` - New value, `None` to delete
    /// * `overwrite` - When false, only write if the key is absent
    ///
    /// # Returns
    /// Whether the write took effect
    pub async fn set_value(&self, key: &str, value: Option<&str>, overwrite: bool) -> Result<bool> {
        let url = format!("{}/api/kv", self.base_url);
        let response = self
            .client
            .put(&url)
            .json(&SetValueRequest {
                key: key.to_string(),
                value: value.map(str::to_string),
                overwrite,
            })
            .send()
            .await?;

        let body: WriteResponse = self.handle_response(response).await?;
        Ok(body.success)
    }

    /// Replace the value under a key only if it currently equals `expected`
    pub async fn compare_and_set_value(
        &self,
        key: &str,
        expected: Option<&str>,
        value: Option<&str>,
    ) -> Result<bool> {
        let url = format!("{}/api/kv/cas", self.base_url);
        let response = self
            .client
            .post(&url)
            .json(&CompareAndSetRequest {
                key: key.to_string(),
                expected: expected.map(str::to_string),
                value: value.map(str::to_string),
            })
            .send()
            .await?;

        let body: WriteResponse = self.handle_response(response).await?;
        Ok(body.success)
    }
}
