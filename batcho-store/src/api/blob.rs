//! Blob API Handlers
//!
//! HTTP endpoints for content-addressed blobs.

use axum::{
    Json,
    body::Bytes,
    extract::{Path, State},
};
use batcho_core::dto::blob::BlobAddressResponse;
use sqlx::PgPool;

use crate::api::error::ApiResult;
use crate::service::blob_service;

/// PUT /api/blobs
/// Upload raw bytes and return their address
pub async fn upload_blob(
    State(pool): State<PgPool>,
    body: Bytes,
) -> ApiResult<Json<BlobAddressResponse>> {
    tracing::debug!("Uploading blob ({} bytes)", body.len());

    let address = blob_service::store_blob(&pool, &body).await?;

    Ok(Json(BlobAddressResponse { address }))
}

/// GET /api/blobs/{hash}
/// Download a blob's raw bytes
pub async fn download_blob(
    State(pool): State<PgPool>,
    Path(hash): Path<String>,
) -> ApiResult<Vec<u8>> {
    tracing::debug!("Downloading blob: {}", hash);

    let content = blob_service::fetch_blob(&pool, &hash).await?;

    Ok(content)
}
