//! Blob Service
//!
//! Content addressing for uploaded blobs.

use batcho_core::dto::blob::{address_from_hash, hash_from_address};
use sha2::{Digest, Sha256};
use sqlx::PgPool;

use crate::repository::blob_repository;

/// Service error type
#[derive(Debug)]
pub enum BlobError {
    NotFound(String),
    InvalidHash(String),
    DatabaseError(sqlx::Error),
}

impl From<sqlx::Error> for BlobError {
    fn from(err: sqlx::Error) -> Self {
        BlobError::DatabaseError(err)
    }
}

/// Hex sha256 digest of a blob
pub fn hash_content(content: &[u8]) -> String {
    hex::encode(Sha256::digest(content))
}

/// Store a blob and return its address
pub async fn store_blob(pool: &PgPool, content: &[u8]) -> Result<String, BlobError> {
    let hash = hash_content(content);
    blob_repository::insert(pool, &hash, content).await?;

    tracing::debug!("Stored blob {} ({} bytes)", hash, content.len());

    Ok(address_from_hash(&hash))
}

/// Fetch a blob by its hex hash
pub async fn fetch_blob(pool: &PgPool, hash: &str) -> Result<Vec<u8>, BlobError> {
    validate_hash(hash)?;

    blob_repository::find_by_hash(pool, hash)
        .await?
        .ok_or_else(|| BlobError::NotFound(hash.to_string()))
}

fn validate_hash(hash: &str) -> Result<(), BlobError> {
    hash_from_address(&address_from_hash(hash))
        .map(|_| ())
        .ok_or_else(|| BlobError::InvalidHash(hash.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_content_known_value() {
        assert_eq!(
            hash_content(b""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn test_validate_hash() {
        assert!(validate_hash(&hash_content(b"x")).is_ok());
        assert!(validate_hash("../etc/passwd").is_err());
        assert!(validate_hash("ABC").is_err());
    }
}
