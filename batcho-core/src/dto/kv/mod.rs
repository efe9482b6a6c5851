//! Key/value DTOs

use serde::{Deserialize, Serialize};

/// Query for reading a single key
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetValueQuery {
    pub key: String,
}

/// Current value of a key (`None` when absent)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetValueResponse {
    pub value: Option<String>,
}

/// Request to write a key
///
/// A `None` value deletes the key. With `overwrite = false` the write only
/// happens when the key is absent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SetValueRequest {
    pub key: String,
    pub value: Option<String>,
    #[serde(default = "default_overwrite")]
    pub overwrite: bool,
}

fn default_overwrite() -> bool {
    true
}

/// Request to replace a key only if it currently holds `expected`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompareAndSetRequest {
    pub key: String,
    pub expected: Option<String>,
    pub value: Option<String>,
}

/// Outcome of a conditional or unconditional write
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WriteResponse {
    pub success: bool,
}
