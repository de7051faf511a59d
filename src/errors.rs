// src/errors.rs

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    // Database errors
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Record not found: {0}")]
    NotFound(String),

    // Validation errors: bad date ranges, overlapping periods, invalid state
    // transitions, duplicate records. Rejected synchronously, never retried.
    #[error("Validation error: {0}")]
    Validation(String),

    // Consistency guards: modifying a finalized record via the draft path,
    // deleting a period with records or in a locked status.
    #[error("Conflict: {0}")]
    Conflict(String),

    // External payment provider errors. Transient: retried by the
    // reconciliation poll up to the attempt ceiling.
    #[error("Payment provider error: {0}")]
    Provider(String),

    #[error("Invalid webhook signature")]
    InvalidSignature,

    #[error("Internal server error: {0}")]
    Internal(String),
}

impl AppError {
    fn status_code(&self) -> StatusCode {
        match self {
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::InvalidSignature => StatusCode::UNAUTHORIZED,
            AppError::Provider(_) => StatusCode::BAD_GATEWAY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = json!({
            "error": {
                "code": status.as_u16(),
                "message": self.to_string(),
            }
        });
        (status, Json(body)).into_response()
    }
}

// Convenience alias
pub type AppResult<T> = Result<T, AppError>;
