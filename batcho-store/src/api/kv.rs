//! Key/Value API Handlers
//!
//! HTTP endpoints for reading and (conditionally) writing short values.

use axum::{
    Json,
    extract::{Query, State},
};
use batcho_core::dto::kv::{
    CompareAndSetRequest, GetValueQuery, GetValueResponse, SetValueRequest, WriteResponse,
};
use sqlx::PgPool;

use crate::api::error::ApiResult;
use crate::service::kv_service;

/// GET /api/kv?key=...
/// Read the value stored under a key
pub async fn get_value(
    State(pool): State<PgPool>,
    Query(query): Query<GetValueQuery>,
) -> ApiResult<Json<GetValueResponse>> {
    tracing::debug!("Reading key: {}", query.key);

    let value = kv_service::get_value(&pool, &query.key).await?;

    Ok(Json(GetValueResponse { value }))
}

/// PUT /api/kv
/// Write, set-if-absent or delete a key
pub async fn set_value(
    State(pool): State<PgPool>,
    Json(req): Json<SetValueRequest>,
) -> ApiResult<Json<WriteResponse>> {
    tracing::debug!("Writing key: {} (overwrite: {})", req.key, req.overwrite);

    let success = kv_service::set_value(&pool, req).await?;

    Ok(Json(WriteResponse { success }))
}

/// POST /api/kv/cas
/// Replace a key only if it holds the expected value
pub async fn compare_and_set(
    State(pool): State<PgPool>,
    Json(req): Json<CompareAndSetRequest>,
) -> ApiResult<Json<WriteResponse>> {
    tracing::debug!("Compare-and-set key: {}", req.key);

    let success = kv_service::compare_and_set(&pool, req).await?;

    Ok(Json(WriteResponse { success }))
}
