/// Unified error types for the Plaza server
use crate::moderation::state::TransitionError;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Main error type for the server
#[derive(Error, Debug)]
pub enum HubError {
    /// Database errors
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Authentication errors
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// Authorization errors
    #[error("Not authorized: {0}")]
    Authorization(String),

    /// Validation errors (business-rule violations)
    #[error("Validation error: {0}")]
    Validation(String),

    /// Illegal workflow state transition
    #[error("Illegal transition: {0}")]
    Transition(#[from] TransitionError),

    /// Rate limiting errors
    #[error("Rate limit exceeded")]
    RateLimitExceeded { retry_after: std::time::Duration },

    /// Not found errors
    #[error("Not found: {0}")]
    NotFound(String),

    /// Conflict errors (e.g., duplicate department code)
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Account sanctioned (active ban or suspension)
    #[error("Account sanctioned: {0}")]
    Sanctioned(String),

    /// Internal server errors
    #[error("Internal error: {0}")]
    Internal(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JWT errors
    #[error("JWT error: {0}")]
    Jwt(String),
}

/// Error response body
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}

/// Convert HubError to HTTP response
impl IntoResponse for HubError {
    fn into_response(self) -> Response {
        let (status, error_code, message) = match self {
            HubError::Authentication(_) => (
                StatusCode::UNAUTHORIZED,
                "AuthenticationRequired",
                self.to_string(),
            ),
            HubError::Authorization(_) | HubError::Jwt(_) => (
                StatusCode::FORBIDDEN,
                "Forbidden",
                self.to_string(),
            ),
            HubError::Validation(_) => (
                StatusCode::BAD_REQUEST,
                "InvalidRequest",
                self.to_string(),
            ),
            HubError::Transition(_) => (
                StatusCode::CONFLICT,
                "IllegalTransition",
                self.to_string(),
            ),
            HubError::NotFound(_) => (StatusCode::NOT_FOUND, "NotFound", self.to_string()),
            HubError::Conflict(_) => (StatusCode::CONFLICT, "Conflict", self.to_string()),
            HubError::Sanctioned(_) => (
                StatusCode::FORBIDDEN,
                "AccountSanctioned",
                self.to_string(),
            ),
            HubError::RateLimitExceeded { .. } => (
                StatusCode::TOO_MANY_REQUESTS,
                "RateLimitExceeded",
                "Rate limit exceeded".to_string(),
            ),
            HubError::Database(_) | HubError::Internal(_) | HubError::Io(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "InternalServerError",
                "Internal server error".to_string(), // Don't leak details
            ),
        };

        let body = Json(ErrorResponse {
            error: error_code.to_string(),
            message,
        });

        (status, body).into_response()
    }
}

/// Result type alias for server operations
pub type HubResult<T> = Result<T, HubError>;
