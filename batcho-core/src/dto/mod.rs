//! Data Transfer Objects for the store service
//!
//! This module contains the request and response bodies exchanged between
//! `batcho-client` and the `batcho-store` HTTP service.

pub mod blob;
pub mod kv;
