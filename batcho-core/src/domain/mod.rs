//! Core domain types
//!
//! These types are shared between the coordinator (which reads and writes them
//! through the store) and operators inspecting batches from the command line.

pub mod batch;
pub mod job;
