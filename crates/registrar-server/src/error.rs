//! Error handling for the HTTP API.

use axum::{
    extract::rejection::{JsonRejection, PathRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use registrar_core::ErrorKind;
use serde::Serialize;
use thiserror::Error;

/// Application error type.
#[derive(Debug, Error)]
pub enum AppError {
    /// A policy refused the operation.
    #[error("{0}")]
    PermissionDenied(String),
    /// Missing or invalid credentials.
    #[error("{0}")]
    Unauthenticated(String),
    /// Row does not exist or is not visible.
    #[error("{0}")]
    NotFound(String),
    /// Unique value already taken.
    #[error("{0}")]
    Duplicate(String),
    /// Payload or reference failed validation.
    #[error("{0}")]
    Validation(String),
    /// Identity provisioning failed.
    #[error("{0}")]
    Provisioning(String),
    /// Malformed request.
    #[error("{0}")]
    BadRequest(String),
    /// Internal server error.
    #[error("{0}")]
    Internal(String),
}

/// Error response body.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    /// Error flag.
    pub error: bool,
    /// Error code.
    pub code: String,
    /// Error message.
    pub message: String,
}

impl AppError {
    /// HTTP status and machine-readable code for the error.
    pub fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            AppError::PermissionDenied(_) => (StatusCode::FORBIDDEN, "PERMISSION_DENIED"),
            AppError::Unauthenticated(_) => (StatusCode::UNAUTHORIZED, "UNAUTHENTICATED"),
            AppError::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
            AppError::Duplicate(_) => (StatusCode::CONFLICT, "DUPLICATE"),
            AppError::Validation(_) => (StatusCode::UNPROCESSABLE_ENTITY, "VALIDATION_FAILED"),
            AppError::Provisioning(_) => (StatusCode::CONFLICT, "PROVISIONING_FAILED"),
            AppError::BadRequest(_) => (StatusCode::BAD_REQUEST, "BAD_REQUEST"),
            AppError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();
        if let AppError::Internal(msg) = &self {
            tracing::error!(error = %msg, "internal error");
        }

        let body = ErrorResponse {
            error: true,
            code: code.to_string(),
            message: self.to_string(),
        };

        (status, Json(body)).into_response()
    }
}

impl From<registrar_core::Error> for AppError {
    fn from(err: registrar_core::Error) -> Self {
        let message = err.to_string();
        match err.kind() {
            ErrorKind::Denied => AppError::PermissionDenied(message),
            ErrorKind::Unauthenticated => AppError::Unauthenticated(message),
            ErrorKind::NotFound => AppError::NotFound(message),
            ErrorKind::Duplicate => AppError::Duplicate(message),
            ErrorKind::Invalid => AppError::Validation(message),
            ErrorKind::Provisioning => AppError::Provisioning(message),
            ErrorKind::Internal => AppError::Internal(message),
        }
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::BadRequest(format!("JSON error: {}", rejection.body_text()))
    }
}

impl From<PathRejection> for AppError {
    fn from(rejection: PathRejection) -> Self {
        AppError::BadRequest(format!("invalid path: {}", rejection.body_text()))
    }
}

/// Result alias for handlers.
pub type AppResult<T> = Result<T, AppError>;
