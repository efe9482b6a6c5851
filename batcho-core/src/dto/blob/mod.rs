//! Blob DTOs

use serde::{Deserialize, Serialize};

/// Scheme prefix of content-addressed blob addresses
pub const ADDRESS_SCHEME: &str = "sha256://";

/// Address of an uploaded blob
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlobAddressResponse {
    pub address: String,
}

/// Builds a blob address from a hex digest
pub fn address_from_hash(hash: &str) -> String {
    format!("{ADDRESS_SCHEME}{hash}")
}

/// Extracts the hex digest from a blob address
///
/// Returns `None` when the address does not use the expected scheme or the
/// digest is not a lowercase hex sha256.
pub fn hash_from_address(address: &str) -> Option<&str> {
    let hash = address.strip_prefix(ADDRESS_SCHEME)?;
    let valid = hash.len() == 64
        && hash
            .chars()
            .all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c));
    valid.then_some(hash)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_from_address() {
        let hash = "a".repeat(64);
        let address = address_from_hash(&hash);
        assert_eq!(hash_from_address(&address), Some(hash.as_str()));
    }

    #[test]
    fn test_rejects_foreign_addresses() {
        assert_eq!(hash_from_address("sha1://abc"), None);
        assert_eq!(hash_from_address(&format!("sha256://{}", "Z".repeat(64))), None);
        assert_eq!(hash_from_address("sha256://abc"), None);
    }
}
