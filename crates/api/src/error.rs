//! API error types with HTTP response mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use common::IdError;
use engine::EngineError;
use thiserror::Error;

/// API-level error type that maps to HTTP responses.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Resource not found.
    #[error("{0}")]
    NotFound(String),
    /// Bad request from the client.
    #[error("{0}")]
    BadRequest(String),
    /// Engine error.
    #[error(transparent)]
    Engine(#[from] EngineError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Engine(err) => engine_error_to_response(err),
        };

        let body = serde_json::json!({ "error": message });
        (status, axum::Json(body)).into_response()
    }
}

fn engine_error_to_response(err: EngineError) -> (StatusCode, String) {
    match &err {
        EngineError::Validation(_)
        | EngineError::InvalidId(_)
        | EngineError::InvalidQuantity { .. } => (StatusCode::BAD_REQUEST, err.to_string()),
        EngineError::UnknownEvent(_) | EngineError::UnknownItem(_) => {
            (StatusCode::NOT_FOUND, err.to_string())
        }
        EngineError::StoreUnavailable(_) => {
            tracing::error!(error = %err, "store unavailable");
            (StatusCode::SERVICE_UNAVAILABLE, err.to_string())
        }
        EngineError::CorruptRecord { .. } | EngineError::Serialization(_) => {
            tracing::error!(error = %err, "internal server error");
            (StatusCode::INTERNAL_SERVER_ERROR, err.to_string())
        }
    }
}

impl From<IdError> for ApiError {
    fn from(err: IdError) -> Self {
        ApiError::BadRequest(err.to_string())
    }
}
