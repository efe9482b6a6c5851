//! Batcho Core
//!
//! Core types and abstractions for the batcho batch coordination system.
//!
//! This crate contains:
//! - Domain types: Batches, jobs and their per-job status records
//! - Keys: The key schema used to lay batch state out in the shared store
//! - DTOs: Data transfer objects for the store service's HTTP API

pub mod domain;
pub mod dto;
pub mod keys;
