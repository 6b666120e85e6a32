use anyhow::Result;
use async_trait::async_trait;

use crate::pipeline::types::{Document, Task, TaskStatus};
use crate::web::Pagination;

pub mod entity;
pub mod mapping;
pub mod sqlite;

/// Partial update applied to a single task row in one statement. Fields
/// left as `None` keep their current value; `updated_at` is always stamped.
#[derive(Debug, Default, Clone)]
pub struct TaskPatch {
    pub status: Option<TaskStatus>,
    pub provider_task_id: Option<String>,
    pub size: Option<i64>,
    pub last_modified: Option<String>,
    pub result_payload: Option<Document>,
    pub chapters: Option<Document>,
    pub summary: Option<Document>,
    pub transcript: Option<Document>,
}

/// Durable record of discovered objects and their transcription lifecycle.
/// The store owns the JSON encode/decode of the document fields; callers
/// only ever see [`Task`] with decoded documents.
#[async_trait]
pub trait TaskStorage: Send + Sync + 'static {
    /// Insert or replace by `object_key`.
    async fn upsert(&self, task: &Task) -> Result<()>;
    async fn get(&self, id: &str) -> Result<Option<Task>>;
    async fn get_by_key(&self, object_key: &str) -> Result<Option<Task>>;
    async fn list(&self, pagination: &Pagination) -> Result<Vec<Task>>;
    /// Snapshot of all tasks in `status`, ordered by creation time. The
    /// returned rows are decoupled from the pool so callers can do network
    /// I/O without holding a connection.
    async fn list_by_status(&self, status: TaskStatus) -> Result<Vec<Task>>;
    /// Apply `patch` atomically and stamp `updated_at`.
    async fn apply(&self, id: &str, patch: &TaskPatch) -> Result<()>;
    async fn delete(&self, id: &str) -> Result<()>;
}
