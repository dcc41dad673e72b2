//! The persisted data model: [`Task`], [`Dependency`] edges and their status enum.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Lifecycle state of a [`Task`].
///
/// `Blocked` is reserved for a future policy switch (see the design notes on
/// failure non-propagation) and is never written by this crate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "UPPERCASE")]
pub enum TaskStatus {
    Queued,
    Running,
    Completed,
    Failed,
    Blocked,
}

impl TaskStatus {
    pub fn as_db_str(self) -> &'static str {
        match self {
            TaskStatus::Queued => "QUEUED",
            TaskStatus::Running => "RUNNING",
            TaskStatus::Completed => "COMPLETED",
            TaskStatus::Failed => "FAILED",
            TaskStatus::Blocked => "BLOCKED",
        }
    }

    pub fn from_db_str(value: &str) -> Self {
        match value {
            "QUEUED" => TaskStatus::Queued,
            "RUNNING" => TaskStatus::Running,
            "COMPLETED" => TaskStatus::Completed,
            "FAILED" => TaskStatus::Failed,
            "BLOCKED" => TaskStatus::Blocked,
            other => unreachable!("unrecognized status stored in db: {other}"),
        }
    }
}

impl rusqlite::types::ToSql for TaskStatus {
    fn to_sql(&self) -> rusqlite::Result<rusqlite::types::ToSqlOutput<'_>> {
        Ok(rusqlite::types::ToSqlOutput::from(self.as_db_str()))
    }
}

impl rusqlite::types::FromSql for TaskStatus {
    fn column_result(value: rusqlite::types::ValueRef<'_>) -> rusqlite::types::FromSqlResult<Self> {
        value.as_str().map(TaskStatus::from_db_str)
    }
}

/// A request to create a single task, prior to persistence.
#[derive(Debug, Clone, Deserialize)]
pub struct NewTask {
    pub id: String,
    pub task_type: String,
    pub duration_ms: i64,
    pub dependencies: Vec<String>,
}

/// The full persisted record for a task, as read back from the store.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct Task {
    pub id: String,
    pub task_type: String,
    pub duration_ms: i64,
    pub status: TaskStatus,
    pub remaining_deps: i64,
    pub attempts: i64,
    pub max_attempts: i64,
    pub created_at: i64,
    pub updated_at: i64,
    pub started_at: Option<i64>,
    pub finished_at: Option<i64>,
    pub lease_expires_at: Option<i64>,
    pub last_error: Option<String>,
}

/// A [`Task`] together with the ids of the tasks it depends on, sorted ascending.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct TaskView {
    #[serde(flatten)]
    pub task: Task,
    pub dependencies: Vec<String>,
}

/// A `(task_id, duration_ms)` descriptor handed from the scheduler to a
/// worker, returned by `claim_runnable_tasks`.
#[derive(Debug, Clone)]
pub struct Claim {
    pub id: String,
    pub duration_ms: i64,
}

/// Current wall-clock time, expressed as the millisecond Unix timestamp used
/// throughout the schema.
pub fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

pub fn ms_to_datetime(ms: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(ms).unwrap_or_else(Utc::now)
}
