//! API Error Types
//!
//! Converts service errors into HTTP responses with a stable error code.

use crate::error::{DatalensError, ErrorCode};
use crate::query::QueryError;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// API error types
#[derive(Error, Debug)]
pub enum ApiError {
    /// Error raised by the dataset service
    #[error(transparent)]
    Service(#[from] DatalensError),

    /// Internal server error
    #[error("Internal error: {0}")]
    Internal(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<QueryError> for ApiError {
    fn from(err: QueryError) -> Self {
        ApiError::Service(err.into())
    }
}

/// Error response body
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: ErrorBody,
    pub request_id: String,
}

/// Error details
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
    /// Set when the same request may succeed later
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub retryable: bool,
}

fn status_of(code: ErrorCode) -> StatusCode {
    match code {
        ErrorCode::NotFound => StatusCode::NOT_FOUND,
        ErrorCode::InvalidFilter | ErrorCode::InvalidUnit => StatusCode::BAD_REQUEST,
        ErrorCode::IndexNotReady => StatusCode::SERVICE_UNAVAILABLE,
        ErrorCode::Timeout => StatusCode::GATEWAY_TIMEOUT,
        ErrorCode::Decode | ErrorCode::Store | ErrorCode::Internal => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code, retryable) = match &self {
            ApiError::Service(e) => (status_of(e.code()), e.code().as_str(), e.is_retryable()),
            ApiError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR", false),
            ApiError::Io(_) => (StatusCode::INTERNAL_SERVER_ERROR, "IO_ERROR", false),
        };

        let request_id = uuid::Uuid::new_v4().to_string();

        if status.is_server_error() && !retryable {
            tracing::error!(
                request_id = %request_id,
                error_code = %code,
                error_message = %self,
                "API error occurred"
            );
        } else {
            tracing::warn!(
                request_id = %request_id,
                error_code = %code,
                error_message = %self,
                "Request rejected"
            );
        }

        let body = ErrorResponse {
            error: ErrorBody {
                code: code.to_string(),
                message: self.to_string(),
                retryable,
            },
            request_id,
        };

        if retryable && status == StatusCode::SERVICE_UNAVAILABLE {
            return (status, [("retry-after", "1")], Json(body)).into_response();
        }
        (status, Json(body)).into_response()
    }
}

/// Result type for API operations
pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        let cases = [
            (DatalensError::NotFound("x".into()), StatusCode::NOT_FOUND),
            (DatalensError::InvalidFilter("x".into()), StatusCode::BAD_REQUEST),
            (DatalensError::InvalidUnit("x".into()), StatusCode::BAD_REQUEST),
            (DatalensError::IndexNotReady("x".into()), StatusCode::SERVICE_UNAVAILABLE),
            (DatalensError::Timeout("x".into()), StatusCode::GATEWAY_TIMEOUT),
            (DatalensError::Store("x".into()), StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (err, status) in cases {
            let response = ApiError::from(err).into_response();
            assert_eq!(response.status(), status);
        }
    }

    #[test]
    fn test_not_ready_carries_retry_hint() {
        let response = ApiError::from(DatalensError::IndexNotReady("b@t".into())).into_response();
        assert_eq!(response.headers()["retry-after"], "1");
    }
}
