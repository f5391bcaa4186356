//! API Error Handling
//!
//! Maps service errors onto HTTP responses of the form `{"error": "..."}`.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};

use crate::service::app_service::AppError;
use crate::service::run_service::{RunError, TriggerError};
use crate::store::StoreError;

/// API error type
#[derive(Debug)]
pub enum ApiError {
    NotFound(String),
    BadRequest(String),
    Conflict(String),
    Store(StoreError),
    InternalError(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, msg),
            ApiError::Store(err) => {
                tracing::error!("Store error: {}", err);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
            ApiError::InternalError(msg) => {
                tracing::error!("Internal error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, msg)
            }
        };

        (status, Json(serde_json::json!({ "error": message }))).into_response()
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        ApiError::Store(err)
    }
}

impl From<TriggerError> for ApiError {
    fn from(err: TriggerError) -> Self {
        match err {
            TriggerError::AppNotFound(_) => ApiError::NotFound(err.to_string()),
            TriggerError::MissingCredential(_) => ApiError::BadRequest(err.to_string()),
            TriggerError::Store(err) => ApiError::Store(err),
        }
    }
}

impl From<RunError> for ApiError {
    fn from(err: RunError) -> Self {
        match err {
            RunError::NotFound(_) => ApiError::NotFound(err.to_string()),
            RunError::Store(err) => ApiError::Store(err),
        }
    }
}

impl From<AppError> for ApiError {
    fn from(err: AppError) -> Self {
        match err {
            AppError::NotFound(_) => ApiError::NotFound(err.to_string()),
            AppError::AlreadyExists(_) => ApiError::Conflict(err.to_string()),
            AppError::Invalid(_) => ApiError::BadRequest(err.to_string()),
            AppError::Store(err) => ApiError::Store(err),
            AppError::Io(_) | AppError::Json(_) => ApiError::InternalError(err.to_string()),
        }
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        let cases = [
            (
                ApiError::from(TriggerError::AppNotFound("web".to_string())),
                StatusCode::NOT_FOUND,
            ),
            (
                ApiError::from(TriggerError::MissingCredential("key".to_string())),
                StatusCode::BAD_REQUEST,
            ),
            (
                ApiError::from(AppError::AlreadyExists("web".to_string())),
                StatusCode::CONFLICT,
            ),
            (
                ApiError::from(RunError::NotFound(uuid::Uuid::nil())),
                StatusCode::NOT_FOUND,
            ),
        ];

        for (err, status) in cases {
            assert_eq!(err.into_response().status(), status);
        }
    }
}
