//! Error types for the cache layer
//!
//! Provides unified error handling using thiserror.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use thiserror::Error;

use crate::models::ErrorResponse;

// == Cache Error Enum ==
/// Unified error type for every backend and the facade.
#[derive(Error, Debug)]
pub enum CacheError {
    /// Invalid cache or decorator configuration, reported at construction time
    #[error("Configuration error: {0}")]
    Config(String),

    /// Operation not offered by the selected backend
    #[error("Unsupported operation: {0}")]
    Unsupported(String),

    /// Serializer or deserializer name could not be resolved
    #[error("Unknown codec: {0}")]
    UnknownCodec(String),

    /// Value could not be serialized or deserialized
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Key cannot be used with the facade
    #[error("Invalid key: {0}")]
    InvalidKey(String),

    /// Backend could not be reached
    #[error("Cache connection failed: {0}")]
    ConnectionFailed(String),

    /// Backend accepted the connection but the operation failed
    #[error("Cache operation failed: {0}")]
    OperationFailed(String),

    /// The wrapped computation returned an error; nothing was cached
    #[error("Computation failed: {0}")]
    Computation(anyhow::Error),

    /// Key not found (HTTP surface)
    #[error("Key not found: {0}")]
    NotFound(String),

    /// Invalid request data (HTTP surface)
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

impl From<serde_json::Error> for CacheError {
    fn from(err: serde_json::Error) -> Self {
        CacheError::Serialization(err.to_string())
    }
}

// == IntoResponse Implementation ==
impl IntoResponse for CacheError {
    fn into_response(self) -> Response {
        let status = match &self {
            CacheError::NotFound(_) => StatusCode::NOT_FOUND,
            CacheError::InvalidRequest(_)
            | CacheError::InvalidKey(_)
            | CacheError::Config(_)
            | CacheError::Serialization(_) => StatusCode::BAD_REQUEST,
            CacheError::Unsupported(_) => StatusCode::NOT_IMPLEMENTED,
            CacheError::ConnectionFailed(_) => StatusCode::SERVICE_UNAVAILABLE,
            CacheError::UnknownCodec(_)
            | CacheError::OperationFailed(_)
            | CacheError::Computation(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let body = Json(ErrorResponse::new(self.to_string()));

        (status, body).into_response()
    }
}

// == Result Type Alias ==
/// Convenience Result type for the cache layer.
pub type Result<T> = std::result::Result<T, CacheError>;
