//! Request/response bodies for the task endpoints, validated beyond what
//! serde's schema check alone can express (self-deps, duplicate deps).

use dts_store::{NewTask, TaskView};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::error::{validation, ApiError};

/// A task submission. `type` is a Rust keyword, so the field is named
/// `task_type` and renamed on the wire.
#[derive(Debug, Clone, Deserialize, ToSchema)]
#[serde(deny_unknown_fields)]
pub struct TaskCreateRequest {
    pub id: String,
    #[serde(rename = "type")]
    pub task_type: String,
    pub duration_ms: i64,
    #[serde(default)]
    pub dependencies: Vec<String>,
}

impl TaskCreateRequest {
    /// Semantic checks the JSON schema can't express on its own: field
    /// lengths, duration bounds, no self-dependency, no duplicate deps.
    pub fn validate(&self) -> Result<(), ApiError> {
        if self.id.is_empty() || self.id.chars().count() > 256 {
            return Err(validation("id must be 1..256 characters"));
        }
        if self.task_type.is_empty() || self.task_type.chars().count() > 256 {
            return Err(validation("type must be 1..256 characters"));
        }
        if self.duration_ms < 1 || self.duration_ms > 86_400_000 {
            return Err(validation("duration_ms must be in 1..=86400000"));
        }
        if self.dependencies.iter().any(|d| d == &self.id) {
            return Err(validation("a task may not depend on itself"));
        }
        let mut seen = std::collections::HashSet::with_capacity(self.dependencies.len());
        for dep in &self.dependencies {
            if !seen.insert(dep.as_str()) {
                return Err(validation(format!("duplicate dependency id: {dep}")));
            }
        }
        Ok(())
    }

    pub fn into_new_task(self) -> NewTask {
        NewTask {
            id: self.id,
            task_type: self.task_type,
            duration_ms: self.duration_ms,
            dependencies: self.dependencies,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct TaskCreateResponse {
    pub id: String,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
#[serde(deny_unknown_fields)]
pub struct TaskBatchCreateRequest {
    pub tasks: Vec<TaskCreateRequest>,
}

impl TaskBatchCreateRequest {
    pub fn validate(&self) -> Result<(), ApiError> {
        if self.tasks.is_empty() {
            return Err(validation("batch must not be empty"));
        }
        for task in &self.tasks {
            task.validate()?;
        }
        Ok(())
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct TaskBatchCreateResponse {
    pub created: Vec<String>,
    pub count: usize,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct TaskListResponse {
    pub tasks: Vec<TaskView>,
    pub total: i64,
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

impl ListQuery {
    pub const DEFAULT_LIMIT: i64 = 50;

    pub fn limit(&self) -> i64 {
        self.limit.filter(|v| *v > 0).unwrap_or(Self::DEFAULT_LIMIT)
    }

    pub fn offset(&self) -> i64 {
        self.offset.filter(|v| *v >= 0).unwrap_or(0)
    }
}
