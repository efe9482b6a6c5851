//! Service Module
//!
//! Business logic layer for the store.
//! Services validate requests and translate write semantics onto repositories.

pub mod blob;
pub mod kv;

// Re-export for convenience
pub use blob as blob_service;
pub use kv as kv_service;
