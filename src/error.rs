//! Error types for the sync service
//!
//! Provides unified error handling using thiserror.

use axum::{
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use thiserror::Error;

use crate::backend::{BackendError, BackendErrorKind};
use crate::models::ErrorResponse;

// == App Error Enum ==
/// Unified error type for the sync service.
#[derive(Error, Debug)]
pub enum AppError {
    /// Malformed or missing input
    #[error("Validation failed: {0}")]
    Validation(String),

    /// Requested resource does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// Query or mutation rejected by the backend
    #[error("Backend error: {0}")]
    Backend(String),

    /// Change feed or connection unavailable
    #[error("Transport error: {0}")]
    Transport(String),

    /// Internal server error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// HTTP status class the error maps to.
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Backend(_) => StatusCode::BAD_GATEWAY,
            AppError::Transport(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<BackendError> for AppError {
    fn from(err: BackendError) -> Self {
        match err.kind {
            BackendErrorKind::NotFound => AppError::NotFound(err.message),
            BackendErrorKind::Client => AppError::Validation(err.message),
            BackendErrorKind::Server => AppError::Backend(err.message),
            BackendErrorKind::Transport => AppError::Transport(err.message),
        }
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::Validation(rejection.body_text())
    }
}

// == IntoResponse Implementation ==
impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match self {
            AppError::Validation(msg)
            | AppError::NotFound(msg)
            | AppError::Backend(msg)
            | AppError::Transport(msg)
            | AppError::Internal(msg) => msg,
        };

        (status, Json(ErrorResponse::new(message))).into_response()
    }
}

// == Result Type Alias ==
/// Convenience Result type for the sync service.
pub type Result<T> = std::result::Result<T, AppError>;
