//! API Module
//!
//! HTTP API layer for the store.
//! Each submodule handles endpoints for one kind of record.

pub mod blob;
pub mod error;
pub mod health;
pub mod kv;

use axum::{
    Router,
    extract::DefaultBodyLimit,
    routing::{get, post, put},
};
use sqlx::PgPool;
use tower_http::trace::TraceLayer;

/// Create the main API router with all endpoints
pub fn create_router(pool: PgPool, max_blob_bytes: usize) -> Router {
    Router::new()
        // Health check
        .route("/health", get(health::health_check))
        // Key/value endpoints
        .route("/api/kv", get(kv::get_value))
        .route("/api/kv", put(kv::set_value))
        .route("/api/kv/cas", post(kv::compare_and_set))
        // Blob endpoints
        .route("/api/blobs", put(blob::upload_blob))
        .route("/api/blobs/{hash}", get(blob::download_blob))
        // Add state and middleware
        .with_state(pool)
        .layer(DefaultBodyLimit::max(max_blob_bytes))
        .layer(TraceLayer::new_for_http())
}
