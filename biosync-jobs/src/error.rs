//! Error types for biosync-jobs
//!
//! Service errors are mapped onto HTTP responses here. Engine diagnostics and
//! storage paths stay in the logs; clients get a generic message.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::models::{IdentifierError, JobKind};
use crate::services::{CorrelationError, FetchError, InvocationError, ValidationError};

/// API error type
#[derive(Debug, Error)]
pub enum ApiError {
    /// Resource not found (404)
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// Invalid request (400)
    #[error("Invalid request: {0}")]
    BadRequest(String),

    /// Upload exceeds the configured size limit (413)
    #[error("Payload too large: {0}")]
    PayloadTooLarge(String),

    /// Engine run failed (500)
    #[error("Engine failure: {0}")]
    EngineFailure(String),

    /// Stored result could not be parsed (500)
    #[error("Malformed result: {0}")]
    MalformedResult(String),

    /// Storage I/O failed (500)
    #[error("Storage error: {0}")]
    Storage(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_code, message) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg),
            ApiError::PayloadTooLarge(msg) => {
                (StatusCode::PAYLOAD_TOO_LARGE, "PAYLOAD_TOO_LARGE", msg)
            }
            ApiError::EngineFailure(msg) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "ENGINE_FAILURE", msg)
            }
            ApiError::MalformedResult(msg) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "MALFORMED_RESULT", msg)
            }
            ApiError::Storage(msg) => (StatusCode::INTERNAL_SERVER_ERROR, "STORAGE_ERROR", msg),
        };

        let body = Json(json!({
            "error": {
                "code": error_code,
                "message": message,
            }
        }));

        (status, body).into_response()
    }
}

impl From<ValidationError> for ApiError {
    fn from(err: ValidationError) -> Self {
        ApiError::BadRequest(err.to_string())
    }
}

impl From<IdentifierError> for ApiError {
    fn from(err: IdentifierError) -> Self {
        ApiError::BadRequest(err.to_string())
    }
}

impl From<InvocationError> for ApiError {
    fn from(err: InvocationError) -> Self {
        match err {
            InvocationError::Validation(e) => e.into(),
            InvocationError::Engine(_) => ApiError::EngineFailure("Error processing signal".to_string()),
            InvocationError::Store(_) => ApiError::Storage("Failed to store analysis job".to_string()),
        }
    }
}

impl From<CorrelationError> for ApiError {
    fn from(err: CorrelationError) -> Self {
        match err {
            CorrelationError::MissingDependency(id) => {
                ApiError::NotFound(format!("Analysis results not found for {}", id))
            }
            CorrelationError::Engine(_) => {
                ApiError::EngineFailure("Error processing correlation".to_string())
            }
            CorrelationError::Store(_) => {
                ApiError::Storage("Failed to store correlation job".to_string())
            }
        }
    }
}

impl From<FetchError> for ApiError {
    fn from(err: FetchError) -> Self {
        match err {
            FetchError::InvalidIdentifier(e) => e.into(),
            FetchError::NotFound { kind, .. } => ApiError::NotFound(match kind {
                JobKind::Analysis => "Analysis results not found".to_string(),
                JobKind::Correlation => "Correlation results not found".to_string(),
            }),
            FetchError::MalformedResult { .. } => {
                ApiError::MalformedResult("Invalid JSON format in results file".to_string())
            }
            FetchError::Store(_) => ApiError::Storage("Failed to read results".to_string()),
        }
    }
}

/// Result type for API handlers
pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::JobId;
    use crate::services::EngineFailure;

    #[test]
    fn test_engine_diagnostics_not_exposed() {
        let err: ApiError = InvocationError::Engine(EngineFailure::Diagnostics(
            "Traceback in /srv/engine/process_signal.py".to_string(),
        ))
        .into();
        assert!(!err.to_string().contains("Traceback"));
        assert_eq!(err.into_response().status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_status_mapping() {
        let missing: ApiError =
            CorrelationError::MissingDependency(JobId::parse("ecg-1").unwrap()).into();
        assert_eq!(missing.into_response().status(), StatusCode::NOT_FOUND);

        let invalid: ApiError = FetchError::InvalidIdentifier(IdentifierError::Empty).into();
        assert_eq!(invalid.into_response().status(), StatusCode::BAD_REQUEST);

        let empty: ApiError = InvocationError::Validation(ValidationError::EmptyPayload).into();
        assert_eq!(empty.into_response().status(), StatusCode::BAD_REQUEST);
    }
}
