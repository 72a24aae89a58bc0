//! Error types for the circulation server

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

/// Stable numeric error codes returned to API clients
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum ErrorCode {
    Failure = 1,
    NotAuthorized = 2,
    DbFailure = 3,
    NoSuchLoan = 4,
    NoSuchItem = 5,
    ItemNotAvailable = 7,
    BadValue = 18,
    NotOwner = 22,
    InvalidState = 23,
    Timeout = 24,
    InvariantViolation = 25,
}

/// Main application error type
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Authentication failed: {0}")]
    Authentication(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Actor {actor_id} does not own loan {loan_id}")]
    NotOwner { loan_id: i32, actor_id: i32 },

    #[error("No copy of item {item_id} is available")]
    ItemUnavailable { item_id: i32 },

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Operation timed out: {0}")]
    Timeout(String),

    #[error("Inventory invariant violated: {0}")]
    InvariantViolation(String),

    #[error("Internal server error: {0}")]
    Internal(String),
}

impl AppError {
    /// Storage and timeout failures leave no partial state and may be retried as-is
    pub fn is_transient(&self) -> bool {
        matches!(self, AppError::Database(_) | AppError::Timeout(_))
    }

    pub fn code(&self) -> ErrorCode {
        match self {
            AppError::Authentication(_) | AppError::Forbidden(_) => ErrorCode::NotAuthorized,
            AppError::NotOwner { .. } => ErrorCode::NotOwner,
            AppError::ItemUnavailable { .. } => ErrorCode::ItemNotAvailable,
            AppError::InvalidState(_) => ErrorCode::InvalidState,
            AppError::NotFound(msg) if msg.starts_with("Loan") => ErrorCode::NoSuchLoan,
            AppError::NotFound(_) => ErrorCode::NoSuchItem,
            AppError::Validation(_) => ErrorCode::BadValue,
            AppError::Database(_) => ErrorCode::DbFailure,
            AppError::Timeout(_) => ErrorCode::Timeout,
            AppError::InvariantViolation(_) => ErrorCode::InvariantViolation,
            AppError::Internal(_) => ErrorCode::Failure,
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Authentication(_) => StatusCode::UNAUTHORIZED,
            AppError::Forbidden(_) | AppError::NotOwner { .. } => StatusCode::FORBIDDEN,
            AppError::ItemUnavailable { .. } | AppError::InvalidState(_) => StatusCode::CONFLICT,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::Database(_) | AppError::Timeout(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::InvariantViolation(_) | AppError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

/// Error response body
#[derive(Serialize, utoipa::ToSchema)]
pub struct ErrorResponse {
    pub code: u32,
    pub error: String,
    pub message: String,
    /// True when the request can be retried unchanged
    pub retriable: bool,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let message = match &self {
            AppError::Database(e) => {
                tracing::error!("Database error: {:?}", e);
                "Database temporarily unavailable".to_string()
            }
            AppError::InvariantViolation(msg) => {
                tracing::error!(alert = true, "Inventory invariant violated: {}", msg);
                "Internal server error".to_string()
            }
            AppError::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                "Internal server error".to_string()
            }
            other => other.to_string(),
        };

        let code = self.code();
        let body = Json(ErrorResponse {
            code: code as u32,
            error: format!("{:?}", code),
            message,
            retriable: self.is_transient(),
        });

        (self.status(), body).into_response()
    }
}

/// Result type alias for application operations
pub type AppResult<T> = Result<T, AppError>;
