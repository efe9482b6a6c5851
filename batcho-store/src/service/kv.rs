//! Key/Value Service
//!
//! Set, set-if-absent and compare-and-set semantics over the kv repository.

use batcho_core::dto::kv::{CompareAndSetRequest, SetValueRequest};
use sqlx::PgPool;

use crate::repository::kv_repository;

/// Longest key accepted by the store
pub const MAX_KEY_LEN: usize = 1024;

/// Service error type
#[derive(Debug)]
pub enum KvError {
    ValidationError(String),
    DatabaseError(sqlx::Error),
}

impl From<sqlx::Error> for KvError {
    fn from(err: sqlx::Error) -> Self {
        KvError::DatabaseError(err)
    }
}

/// Read a key
pub async fn get_value(pool: &PgPool, key: &str) -> Result<Option<String>, KvError> {
    validate_key(key)?;
    Ok(kv_repository::find_value(pool, key).await?)
}

/// Write (or delete) a key
///
/// Returns whether the key now holds the requested value because of this call.
pub async fn set_value(pool: &PgPool, req: SetValueRequest) -> Result<bool, KvError> {
    validate_key(&req.key)?;

    let written = match (req.value.as_deref(), req.overwrite) {
        (Some(value), true) => {
            kv_repository::upsert(pool, &req.key, value).await?;
            true
        }
        (Some(value), false) => kv_repository::insert_if_absent(pool, &req.key, value).await?,
        (None, true) => {
            kv_repository::delete(pool, &req.key).await?;
            true
        }
        // Deleting without overwrite only "succeeds" if there was nothing to delete
        (None, false) => !kv_repository::exists(pool, &req.key).await?,
    };

    if !written {
        tracing::debug!("Conditional set rejected for key: {}", req.key);
    }

    Ok(written)
}

/// Replace a key only if it currently holds the expected value
pub async fn compare_and_set(pool: &PgPool, req: CompareAndSetRequest) -> Result<bool, KvError> {
    validate_key(&req.key)?;

    let swapped = match (req.expected.as_deref(), req.value.as_deref()) {
        (None, Some(value)) => kv_repository::insert_if_absent(pool, &req.key, value).await?,
        (None, None) => !kv_repository::exists(pool, &req.key).await?,
        (Some(expected), Some(value)) => {
            kv_repository::update_if_equal(pool, &req.key, expected, value).await?
        }
        (Some(expected), None) => kv_repository::delete_if_equal(pool, &req.key, expected).await?,
    };

    if !swapped {
        tracing::debug!("Compare-and-set conflict for key: {}", req.key);
    }

    Ok(swapped)
}

// =============================================================================
// Validation
// =============================================================================

fn validate_key(key: &str) -> Result<(), KvError> {
    if key.is_empty() {
        return Err(KvError::ValidationError("Key cannot be empty".to_string()));
    }

    if key.len() > MAX_KEY_LEN {
        return Err(KvError::ValidationError(format!(
            "Key exceeds {} bytes",
            MAX_KEY_LEN
        )));
    }

    Ok(())
}
