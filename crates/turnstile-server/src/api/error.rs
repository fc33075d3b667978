//! API error type and its JSON rendering.
//!
//! Rejected codes are not errors here: they are 200 responses with
//! `is_valid: false`. `ApiError` covers bad input on the read endpoints and
//! store trouble.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use turnstile_core::{StoreError, TurnstileError};
use utoipa::ToSchema;

/// Result type alias for API handlers.
pub type ApiResult<T> = Result<T, ApiError>;

/// Errors a handler can return.
#[derive(Debug, Clone, Error)]
pub enum ApiError {
    /// 400: malformed hour key, date or body.
    #[error("Bad Request: {message}")]
    BadRequest { error_code: String, message: String },

    /// 404: no such bucket.
    #[error("Not Found: {message}")]
    NotFound { error_code: String, message: String },

    /// 500: corrupt documents and other faults that retrying will not fix.
    #[error("Internal Error: {message}")]
    InternalError {
        error_code: String,
        message: String,
        details: Option<String>,
    },

    /// 503: the store is unreachable, slow or too contended. When `retryable`
    /// is false a write may have landed.
    #[error("Service Unavailable: {message}")]
    ServiceUnavailable {
        error_code: String,
        message: String,
        retryable: bool,
    },
}

/// JSON body of every non-2xx response.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[schema(example = json!({
    "error": "STORE_TIMEOUT",
    "message": "Store call timed out after 5000 ms",
    "details": { "retryable": true }
}))]
pub struct ErrorResponse {
    /// Machine-readable code, SCREAMING_SNAKE_CASE.
    #[schema(example = "INVALID_HOUR_KEY")]
    pub error: String,

    #[schema(example = "Invalid hour key: 'yesterday'")]
    pub message: String,

    #[schema(nullable)]
    pub details: Option<serde_json::Value>,
}

impl ApiError {
    /// HTTP status for this error.
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        match self {
            Self::BadRequest { .. } => StatusCode::BAD_REQUEST,
            Self::NotFound { .. } => StatusCode::NOT_FOUND,
            Self::InternalError { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            Self::ServiceUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
        }
    }

    fn into_body(self) -> ErrorResponse {
        let (error, message, details) = match self {
            Self::BadRequest { error_code, message } | Self::NotFound { error_code, message } => {
                (error_code, message, None)
            }
            Self::InternalError {
                error_code,
                message,
                details,
            } => (error_code, message, details.map(serde_json::Value::String)),
            Self::ServiceUnavailable {
                error_code,
                message,
                retryable,
            } => (error_code, message, Some(serde_json::json!({ "retryable": retryable }))),
        };
        ErrorResponse {
            error,
            message,
            details,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        match &self {
            Self::InternalError { error_code, message, details } => {
                tracing::error!(%error_code, %message, ?details, "request failed");
            }
            Self::ServiceUnavailable { error_code, message, .. } => {
                tracing::warn!(%error_code, %message, "store unavailable");
            }
            Self::BadRequest { .. } | Self::NotFound { .. } => {}
        }
        (status, Json(self.into_body())).into_response()
    }
}

impl From<TurnstileError> for ApiError {
    fn from(err: TurnstileError) -> Self {
        let error_code = err.error_code().to_string();
        let message = err.to_string();

        if err.is_request_error() {
            Self::BadRequest { error_code, message }
        } else if err.http_status_code() == 503 {
            Self::ServiceUnavailable {
                error_code,
                message,
                retryable: err.is_recoverable(),
            }
        } else {
            Self::InternalError {
                error_code,
                message,
                details: None,
            }
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        Self::from(TurnstileError::from(err))
    }
}
