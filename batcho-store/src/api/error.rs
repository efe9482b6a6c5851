//! API errors
//!
//! Service errors are mapped onto HTTP statuses here and rendered as
//! `{ "error": message }`.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;

use crate::service::{blob_service::BlobError, kv_service::KvError};

#[derive(Debug)]
pub enum ApiError {
    NotFound(String),
    BadRequest(String),
    DatabaseError(sqlx::Error),
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::DatabaseError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Client-facing message; database details stay in the server log
    fn message(self) -> String {
        match self {
            ApiError::NotFound(msg) | ApiError::BadRequest(msg) => msg,
            ApiError::DatabaseError(err) => {
                tracing::error!("Database error: {:?}", err);
                "Internal server error".to_string()
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = ErrorBody {
            error: self.message(),
        };
        (status, Json(body)).into_response()
    }
}

impl From<KvError> for ApiError {
    fn from(err: KvError) -> Self {
        match err {
            KvError::ValidationError(msg) => ApiError::BadRequest(msg),
            KvError::DatabaseError(err) => ApiError::DatabaseError(err),
        }
    }
}

impl From<BlobError> for ApiError {
    fn from(err: BlobError) -> Self {
        match err {
            BlobError::NotFound(hash) => ApiError::NotFound(format!("Blob {} not found", hash)),
            BlobError::InvalidHash(hash) => ApiError::BadRequest(format!("Invalid blob hash: {}", hash)),
            BlobError::DatabaseError(err) => ApiError::DatabaseError(err),
        }
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            ApiError::from(BlobError::NotFound("ab".into())).status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            ApiError::from(KvError::ValidationError("empty key".into())).status(),
            StatusCode::BAD_REQUEST
        );
    }

    #[test]
    fn test_database_error_is_not_leaked() {
        let err = ApiError::DatabaseError(sqlx::Error::PoolTimedOut);
        assert_eq!(err.message(), "Internal server error");
    }
}
