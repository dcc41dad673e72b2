use serde_json::{json, Value};

/// The closed taxonomy of errors the repository can raise.
///
/// Each variant carries a `details` map so API callers can act on the
/// failure programmatically instead of parsing the message.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("validation error: {message}")]
    Validation { message: String, details: Value },

    #[error("task not found: {id}")]
    NotFound { id: String },

    #[error("conflict: {message}")]
    Conflict { message: String, details: Value },

    #[error("dependency error: missing {missing:?}")]
    DependencyMissing { missing: Vec<String> },

    #[error("cycle detected")]
    CycleDetected { details: Value },

    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Stable machine-readable code for each error kind, matching the HTTP
/// surface's `ErrorResponse.code` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    ValidationError,
    NotFound,
    Conflict,
    DependencyError,
    CycleDetected,
    DtsError,
}

impl ErrorCode {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorCode::ValidationError => "VALIDATION_ERROR",
            ErrorCode::NotFound => "NOT_FOUND",
            ErrorCode::Conflict => "CONFLICT",
            ErrorCode::DependencyError => "DEPENDENCY_ERROR",
            ErrorCode::CycleDetected => "CYCLE_DETECTED",
            ErrorCode::DtsError => "DTS_ERROR",
        }
    }
}

impl StoreError {
    pub fn code(&self) -> ErrorCode {
        match self {
            StoreError::Validation { .. } => ErrorCode::ValidationError,
            StoreError::NotFound { .. } => ErrorCode::NotFound,
            StoreError::Conflict { .. } => ErrorCode::Conflict,
            StoreError::DependencyMissing { .. } => ErrorCode::DependencyError,
            StoreError::CycleDetected { .. } => ErrorCode::CycleDetected,
            StoreError::Sqlite(_) | StoreError::Io(_) => ErrorCode::DtsError,
        }
    }

    pub fn details(&self) -> Value {
        match self {
            StoreError::Validation { details, .. } => details.clone(),
            StoreError::NotFound { id } => json!({ "id": id }),
            StoreError::Conflict { details, .. } => details.clone(),
            StoreError::DependencyMissing { missing } => json!({ "missing": missing }),
            StoreError::CycleDetected { details } => details.clone(),
            StoreError::Sqlite(e) => json!({ "reason": e.to_string() }),
            StoreError::Io(e) => json!({ "reason": e.to_string() }),
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        StoreError::Validation {
            message: message.into(),
            details: Value::Null,
        }
    }

    pub fn conflict_existing(ids: Vec<String>) -> Self {
        StoreError::Conflict {
            message: "one or more task ids already exist".to_string(),
            details: json!({ "existing": ids }),
        }
    }

    pub fn conflict_status(id: impl Into<String>, status: &str) -> Self {
        let id = id.into();
        StoreError::Conflict {
            message: format!("task {id} is not in a state that allows this transition"),
            details: json!({ "id": id, "status": status }),
        }
    }

    pub fn cycle_in_batch(batch_ids: Vec<String>) -> Self {
        StoreError::CycleDetected {
            details: json!({ "batch_ids": batch_ids }),
        }
    }

    pub fn cycle_single(new_id: impl Into<String>) -> Self {
        StoreError::CycleDetected {
            details: json!({ "id": new_id.into() }),
        }
    }
}
