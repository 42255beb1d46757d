/// Error types for listing-service
///
/// Input-shape problems (bad cursor, unknown sort key, half a geo filter)
/// never reach this type: the query compiler degrades them to defaults.
/// What remains are store, cache and lookup failures, rendered to HTTP
/// clients as a uniform `{ success, code, message, timestamp }` envelope.
use actix_web::{http::StatusCode, HttpResponse, ResponseError};
use chrono::Utc;
use std::time::Duration;
use thiserror::Error;

use crate::cache::CacheError;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),

    #[error("Store call timed out after {0:?}")]
    Timeout(Duration),

    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Machine-readable code carried in the error envelope
    pub fn code(&self) -> &'static str {
        match self {
            AppError::Database(_) | AppError::StoreUnavailable(_) => "FETCH_FAILED",
            AppError::Timeout(_) => "FETCH_TIMEOUT",
            AppError::Cache(_) => "CACHE_ERROR",
            AppError::NotFound(_) => "NOT_FOUND",
            AppError::BadRequest(_) => "BAD_REQUEST",
            AppError::Config(_) | AppError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Store-side failures that a caller may reasonably retry later
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            AppError::Database(_) | AppError::Timeout(_) | AppError::StoreUnavailable(_)
        )
    }
}

impl ResponseError for AppError {
    fn status_code(&self) -> StatusCode {
        match self {
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            AppError::Database(_) | AppError::StoreUnavailable(_) => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            AppError::Cache(_) | AppError::Config(_) | AppError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    fn error_response(&self) -> HttpResponse {
        // Store internals stay in the logs, not in the response body.
        let message = match self {
            AppError::Database(_) | AppError::StoreUnavailable(_) => "fetch failed".to_string(),
            AppError::Cache(_) | AppError::Config(_) | AppError::Internal(_) => {
                "internal error".to_string()
            }
            other => other.to_string(),
        };

        HttpResponse::build(self.status_code()).json(serde_json::json!({
            "success": false,
            "code": self.code(),
            "message": message,
            "timestamp": Utc::now().to_rfc3339(),
        }))
    }
}

/// Result type alias for service operations
pub type Result<T> = std::result::Result<T, AppError>;
