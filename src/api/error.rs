//! API error handling for consistent JSON error responses.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

use crate::engine::{ConflictError, EngineError, IoError};

/// API error type that converts to JSON responses.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, message)
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(json!({
            "error": true,
            "message": self.message,
        }));
        (self.status, body).into_response()
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        Self::internal(err.to_string())
    }
}

impl From<EngineError> for ApiError {
    fn from(err: EngineError) -> Self {
        let status = match &err {
            EngineError::Io(IoError::NotFound { .. }) => StatusCode::NOT_FOUND,
            EngineError::Io(IoError::UnsupportedFormat { .. }) => {
                StatusCode::UNSUPPORTED_MEDIA_TYPE
            }
            EngineError::Io(IoError::SeekOutOfRange) => StatusCode::BAD_REQUEST,
            EngineError::Io(IoError::Timeout { .. }) => StatusCode::GATEWAY_TIMEOUT,
            EngineError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
            EngineError::Conflict(ConflictError::AlreadyActive { .. }) => StatusCode::CONFLICT,
            EngineError::Conflict(ConflictError::PermissionDenied { .. }) => {
                StatusCode::SERVICE_UNAVAILABLE
            }
        };
        Self::new(status, err.to_string())
    }
}

/// Result type for API handlers.
pub type ApiResult<T> = Result<T, ApiError>;
