use std::fmt::Display;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Structured document as stored in the result fields. The storage layer
/// serializes these to TEXT; callers only ever see the decoded map.
pub type Document = serde_json::Map<String, serde_json::Value>;

/// Marker written into `result_payload` when the provider reports a
/// terminal failure for a task.
pub const PROVIDER_FAILED_MARKER: &str = "AliCloud Task Failed";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskStatus {
    /// Discovered in the bucket, not yet submitted to the provider.
    Pending,
    /// Submitted; the provider owns the job until it reports a terminal state.
    InFlight,
    Completed,
    Failed,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "PENDING",
            TaskStatus::InFlight => "IN_FLIGHT",
            TaskStatus::Completed => "COMPLETED",
            TaskStatus::Failed => "FAILED",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Failed)
    }
}

impl Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<&str> for TaskStatus {
    type Error = anyhow::Error;

    fn try_from(status: &str) -> Result<Self, Self::Error> {
        match status {
            "PENDING" => Ok(TaskStatus::Pending),
            "IN_FLIGHT" => Ok(TaskStatus::InFlight),
            "COMPLETED" => Ok(TaskStatus::Completed),
            "FAILED" => Ok(TaskStatus::Failed),
            _ => Err(anyhow::anyhow!("Invalid task status: {}", status)),
        }
    }
}

/// One unit of work tracking a single storage object's transcription job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    pub object_key: String,
    pub region: String,
    pub size: i64,
    /// Object mtime mirrored from the bucket, refreshed on each discovery pass.
    pub last_modified: String,
    pub status: TaskStatus,
    /// Empty until a submission succeeds; cleared only by explicit resubmission.
    pub provider_task_id: String,
    pub result_payload: Document,
    pub chapters: Document,
    pub summary: Document,
    pub transcript: Document,
    pub created_at: DateTime<Utc>,
    /// Last mutation to this record, distinct from the object's `last_modified`.
    pub updated_at: DateTime<Utc>,
}

impl Task {
    pub fn new(object_key: String, region: String, size: i64, last_modified: String) -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            object_key,
            region,
            size,
            last_modified,
            status: TaskStatus::Pending,
            provider_task_id: String::new(),
            result_payload: Document::new(),
            chapters: Document::new(),
            summary: Document::new(),
            transcript: Document::new(),
            created_at: now,
            updated_at: now,
        }
    }
}
