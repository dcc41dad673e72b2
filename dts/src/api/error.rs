//! Maps the store's closed error taxonomy (and a few request-validation
//! failures that never reach the repository) onto HTTP responses.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use dts_store::{ErrorCode, StoreError};
use serde::Serialize;
use serde_json::Value;
use utoipa::ToSchema;

#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
    pub details: Value,
}

/// Errors the HTTP layer can produce: every [`StoreError`] plus request
/// shapes the repository never sees because a handler rejects them first.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("{0}")]
    Validation(String),
}

impl ApiError {
    fn code(&self) -> ErrorCode {
        match self {
            ApiError::Store(e) => e.code(),
            ApiError::Validation(_) => ErrorCode::ValidationError,
        }
    }

    fn details(&self) -> Value {
        match self {
            ApiError::Store(e) => e.details(),
            ApiError::Validation(_) => Value::Null,
        }
    }

    fn status(&self) -> StatusCode {
        match self.code() {
            ErrorCode::ValidationError => StatusCode::BAD_REQUEST,
            ErrorCode::NotFound => StatusCode::NOT_FOUND,
            ErrorCode::Conflict => StatusCode::CONFLICT,
            ErrorCode::DependencyError => StatusCode::BAD_REQUEST,
            ErrorCode::CycleDetected => StatusCode::BAD_REQUEST,
            ErrorCode::DtsError => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::error!(error = %self, "internal error handling request");
        }
        let body = ErrorResponse {
            error: self.to_string(),
            code: self.code().as_str().to_string(),
            details: self.details(),
        };
        (status, Json(body)).into_response()
    }
}

pub fn validation(message: impl Into<String>) -> ApiError {
    ApiError::Validation(message.into())
}

pub fn validation_with_details(message: impl Into<String>, details: Value) -> ApiError {
    // Folded into the Store variant so the response carries structured
    // details consistently with repository-raised validation errors.
    ApiError::Store(StoreError::Validation {
        message: message.into(),
        details,
    })
}
