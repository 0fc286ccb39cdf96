//! services/api/src/error.rs
//!
//! Defines the primary error type for the entire API service and how it is
//! rendered as an HTTP response.

use crate::config::ConfigError;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use studypod_core::ports::PortError;
use tracing::error;

/// The primary error type for the `api` service.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Represents an error that occurred during configuration loading.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Represents an error that propagated up from one of the core service ports.
    #[error("{0}")]
    Port(#[from] PortError),

    /// A malformed request the handlers rejected before reaching the core.
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Represents a standard Input/Output error (e.g., binding to a network socket).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A catch-all for any other unexpected errors.
    #[error("An unexpected internal error occurred: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Port(port) => match port {
                PortError::NotFound(_) => StatusCode::NOT_FOUND,
                PortError::InvalidInput(_) => StatusCode::BAD_REQUEST,
                PortError::Conflict(_) => StatusCode::CONFLICT,
                PortError::Extraction(_) => StatusCode::UNPROCESSABLE_ENTITY,
                PortError::LlmFatal(_) | PortError::Embedding(_) => StatusCode::BAD_GATEWAY,
                PortError::RateLimited(_)
                | PortError::Timeout(_)
                | PortError::ServerError(_)
                | PortError::ModelUnavailable(_)
                | PortError::LlmUnavailable(_)
                | PortError::Speech(_) => StatusCode::SERVICE_UNAVAILABLE,
                PortError::Storage(_) | PortError::Unexpected(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Config(_) | ApiError::Io(_) | ApiError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = if status.is_server_error() && !matches!(self, ApiError::Port(_)) {
            error!(error = %self, "Request failed");
            "internal server error".to_string()
        } else {
            if status.is_server_error() {
                error!(error = %self, "Request failed");
            }
            self.to_string()
        };
        (status, Json(json!({ "error": message }))).into_response()
    }
}
