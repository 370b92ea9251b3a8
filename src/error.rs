//! Error handling module
//!
//! Centralized error types and HTTP response conversion.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use crate::service::ExportError;
use crate::store::StoreError;

/// Application-wide Result type
pub type AppResult<T> = Result<T, AppError>;

/// Message returned for every failure whose detail stays in the logs
const INTERNAL_MESSAGE: &str = "internal server error";

/// Application error types
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    // Client errors (4xx)
    #[error("validation failed: {0}")]
    Validation(#[from] validator::ValidationErrors),

    #[error("{0}")]
    InvalidRequest(String),

    #[error("empty body")]
    EmptyBody,

    #[error("request timed out")]
    Timeout,

    // Ledger errors, status depends on the variant
    #[error(transparent)]
    Store(#[from] StoreError),

    // Server errors (5xx)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<ExportError> for AppError {
    fn from(err: ExportError) -> Self {
        match err {
            ExportError::Io(e) => AppError::Io(e),
            ExportError::Csv(e) => AppError::Csv(e),
        }
    }
}

/// Error response body
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub msg: String,
}

impl AppError {
    /// HTTP status for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::Validation(_) | AppError::InvalidRequest(_) | AppError::EmptyBody => {
                StatusCode::BAD_REQUEST
            }
            AppError::Timeout => StatusCode::REQUEST_TIMEOUT,
            AppError::Store(err) => match err {
                StoreError::UnknownUser { .. } | StoreError::UnknownTransaction { .. } => {
                    StatusCode::NOT_FOUND
                }
                StoreError::InsufficientFunds { .. } | StoreError::BalanceLimitExceeded { .. } => {
                    StatusCode::BAD_REQUEST
                }
                StoreError::DuplicateTransaction { .. } => StatusCode::CONFLICT,
                StoreError::Database(_) | StoreError::Backend(_) => {
                    StatusCode::INTERNAL_SERVER_ERROR
                }
            },
            AppError::Io(_) | AppError::Csv(_) | AppError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        let msg = if status.is_server_error() {
            tracing::error!(error = ?self, "Request failed: {}", self);
            INTERNAL_MESSAGE.to_string()
        } else {
            self.to_string()
        };

        (status, Json(ErrorResponse { msg })).into_response()
    }
}
