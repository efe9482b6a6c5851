//! Repository Module
//!
//! Data access layer for the store.
//! Each repository handles database operations for one kind of record.

pub mod blob;
pub mod kv;

// Re-export for convenience
pub use blob as blob_repository;
pub use kv as kv_repository;
