use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use serde_json::json;
use thiserror::Error;

use crate::models::import::ImportReport;

/// Per-item failure detail carried by a partially failed bulk operation.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ItemFailure {
    pub filename: String,
    pub error: String,
}

/// Application-level error type.
/// Implements `IntoResponse` so Axum handlers can return `Result<T, AppError>`.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Duplicate content: {0}")]
    DuplicateContent(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error(
        "Partial failure: {} succeeded, {} failed, {} skipped",
        .0.successful.len(),
        .0.failed.len(),
        .0.skipped.len()
    )]
    PartialFailure(ImportReport),

    #[error("Unsupported: {0}")]
    Unsupported(String),

    #[error("Already undone: {0}")]
    AlreadyUndone(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Timed out: {0}")]
    Timeout(String),

    /// A batch ran out of time; `report` lists what was committed before.
    #[error("Timed out: {message}")]
    BatchTimeout {
        message: String,
        report: ImportReport,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Internal server error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    /// Stable machine-readable code used in response bodies and log fields.
    pub fn code(&self) -> &'static str {
        match self {
            AppError::NotFound(_) => "NOT_FOUND",
            AppError::Validation(_) => "VALIDATION_ERROR",
            AppError::DuplicateContent(_) => "DUPLICATE_CONTENT",
            AppError::Conflict(_) => "CONFLICT",
            AppError::PartialFailure(_) => "PARTIAL_FAILURE",
            AppError::Unsupported(_) => "UNSUPPORTED",
            AppError::AlreadyUndone(_) => "ALREADY_UNDONE",
            AppError::InvalidState(_) => "INVALID_STATE",
            AppError::Timeout(_) | AppError::BatchTimeout { .. } => "TIMEOUT",
            AppError::Io(_) => "IO_ERROR",
            AppError::Serialization(_) => "SERIALIZATION_ERROR",
            AppError::Internal(_) => "INTERNAL_ERROR",
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let code = self.code();

        let (status, message) = match &self {
            AppError::PartialFailure(report) => {
                return batch_response(StatusCode::MULTI_STATUS, code, self.to_string(), report);
            }
            AppError::BatchTimeout { message, report } => {
                return batch_response(StatusCode::GATEWAY_TIMEOUT, code, message.clone(), report);
            }
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone()),
            AppError::Validation(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            AppError::DuplicateContent(msg) | AppError::Conflict(msg) => {
                (StatusCode::CONFLICT, msg.clone())
            }
            AppError::Unsupported(msg) | AppError::AlreadyUndone(msg) => {
                (StatusCode::UNPROCESSABLE_ENTITY, msg.clone())
            }
            AppError::InvalidState(msg) => (StatusCode::CONFLICT, msg.clone()),
            AppError::Timeout(msg) => (StatusCode::GATEWAY_TIMEOUT, msg.clone()),
            AppError::Io(e) => {
                tracing::error!("I/O error: {e}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "A storage error occurred".to_string(),
                )
            }
            AppError::Serialization(e) => {
                tracing::error!("Serialization error: {e}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "A stored document could not be decoded".to_string(),
                )
            }
            AppError::Internal(e) => {
                tracing::error!("Internal error: {e:?}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "An internal server error occurred".to_string(),
                )
            }
        };

        let body = Json(json!({
            "error": {
                "code": code,
                "message": message
            }
        }));

        (status, body).into_response()
    }
}

/// Error envelope plus the per-item outcome of a batch.
fn batch_response(status: StatusCode, code: &str, message: String, report: &ImportReport) -> Response {
    let body = Json(json!({
        "error": {
            "code": code,
            "message": message,
        },
        "successful": report.successful,
        "failed": report.failed,
        "skipped": report.skipped,
    }));
    (status, body).into_response()
}
