//! Server-side asynchronous tasks.
//!
//! Write operations on the search service are queued and answered with a
//! [`TaskInfo`]; the task's progress is read back as a [`Task`] through
//! [`SearchClient::get_task`](crate::SearchClient::get_task) or waited on with
//! [`SearchClient::wait_for_task`](crate::SearchClient::wait_for_task).
//! Tasks are owned by the server; the client only reads them.

use crate::error::ApiError;
use serde::{Deserialize, Serialize};

/// Lifecycle state of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TaskStatus {
    /// Queued, not started.
    Enqueued,
    /// Being processed.
    Processing,
    /// Finished successfully.
    Succeeded,
    /// Finished with an error.
    Failed,
    /// Cancelled before completion.
    Canceled,
    /// Status not known to this client version.
    #[serde(other)]
    Unknown,
}

impl TaskStatus {
    /// `true` while the task is enqueued or processing.
    pub fn is_pending(&self) -> bool {
        matches!(self, TaskStatus::Enqueued | TaskStatus::Processing)
    }
}

/// Full view of a task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    /// Server-assigned id.
    pub uid: u64,
    /// Index the task works on, if any.
    #[serde(default)]
    pub index_uid: Option<String>,
    /// Current status.
    pub status: TaskStatus,
    /// Task type, e.g. `documentAdditionOrUpdate`.
    #[serde(rename = "type", default)]
    pub task_type: String,
    /// Type-specific details.
    #[serde(default)]
    pub details: Option<serde_json::Value>,
    /// Failure description when `status` is `failed`.
    #[serde(default)]
    pub error: Option<ApiError>,
    /// Id of the task that cancelled this one.
    #[serde(default)]
    pub canceled_by: Option<u64>,
    /// ISO 8601 processing duration.
    #[serde(default)]
    pub duration: Option<String>,
    /// RFC 3339 enqueue time.
    #[serde(default)]
    pub enqueued_at: Option<String>,
    /// RFC 3339 start time.
    #[serde(default)]
    pub started_at: Option<String>,
    /// RFC 3339 finish time.
    #[serde(default)]
    pub finished_at: Option<String>,
    /// Batch the task was processed in.
    #[serde(default)]
    pub batch_uid: Option<u64>,
}

/// Summary returned when a task is enqueued.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskInfo {
    /// Id to hand to the task poller.
    pub task_uid: u64,
    /// Index the task works on, if any.
    #[serde(default)]
    pub index_uid: Option<String>,
    /// Status at enqueue time.
    pub status: TaskStatus,
    /// Task type.
    #[serde(rename = "type", default)]
    pub task_type: String,
    /// RFC 3339 enqueue time.
    #[serde(default)]
    pub enqueued_at: Option<String>,
}
