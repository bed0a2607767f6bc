//! # HTTP API Errors
//!
//! Maps record operation failures onto status codes and a JSON body of
//! the form `{"error": "...", "code": 409}`.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;

use crate::coordinator::CoordinatorError;

/// Result type for handlers
pub type ApiResult<T> = Result<T, ApiError>;

/// Errors surfaced to HTTP clients
#[derive(Debug, Error)]
pub enum ApiError {
    // ==================
    // Client Errors (4xx)
    // ==================
    /// Path segment is not a record id
    #[error("Invalid user id: {0}")]
    InvalidId(String),

    /// Body is not valid JSON or has the wrong field types
    #[error("Invalid request body: {0}")]
    InvalidBody(String),

    /// Record-level failure from the coordinator
    #[error("{0}")]
    Record(#[from] CoordinatorError),

    /// The blocking worker running the store work panicked or was aborted
    #[error("Request worker failed: {0}")]
    Worker(String),
}

impl ApiError {
    /// Get HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::InvalidId(_) => StatusCode::BAD_REQUEST,
            ApiError::InvalidBody(_) => StatusCode::BAD_REQUEST,
            ApiError::Record(err) => match err {
                CoordinatorError::InvalidInput(_) => StatusCode::BAD_REQUEST,
                CoordinatorError::Conflict { .. } => StatusCode::CONFLICT,
                CoordinatorError::NotFound(_) => StatusCode::NOT_FOUND,
                CoordinatorError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
                CoordinatorError::Cancelled => StatusCode::SERVICE_UNAVAILABLE,
            },
            ApiError::Worker(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Error response body
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: u16,
}

impl From<ApiError> for ErrorResponse {
    fn from(err: ApiError) -> Self {
        Self {
            code: err.status_code().as_u16(),
            error: err.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = Json(ErrorResponse::from(self));
        (status, body).into_response()
    }
}
