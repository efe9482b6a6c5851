//! Repository layer
//!
//! Typed access to the records batcho keeps in the shared key/value store.
//! No coordination logic lives here beyond the guarded-write check.

mod batch_store;

pub use batch_store::BatchStore;
