use anyhow::{Context, Result};

use crate::pipeline::types::{Document, Task, TaskStatus};
use crate::storage::task::entity::Model as TaskModel;

fn decode_document(text: &str, field: &str) -> Result<Document> {
    if text.is_empty() {
        return Ok(Document::new());
    }
    serde_json::from_str(text).with_context(|| format!("invalid JSON in column {}", field))
}

impl TryFrom<TaskModel> for Task {
    type Error = anyhow::Error;

    fn try_from(model: TaskModel) -> Result<Self> {
        Ok(Task {
            status: TaskStatus::try_from(model.status.as_str())?,
            result_payload: decode_document(&model.result_payload, "result_payload")?,
            chapters: decode_document(&model.chapters, "chapters")?,
            summary: decode_document(&model.summary, "summary")?,
            transcript: decode_document(&model.transcript, "transcript")?,
            id: model.id,
            object_key: model.object_key,
            region: model.region,
            size: model.size,
            last_modified: model.last_modified,
            provider_task_id: model.provider_task_id,
            created_at: model.created_at,
            updated_at: model.updated_at,
        })
    }
}

impl TryFrom<&Task> for TaskModel {
    type Error = anyhow::Error;

    fn try_from(task: &Task) -> Result<Self> {
        Ok(TaskModel {
            id: task.id.clone(),
            object_key: task.object_key.clone(),
            region: task.region.clone(),
            size: task.size,
            last_modified: task.last_modified.clone(),
            status: task.status.to_string(),
            provider_task_id: task.provider_task_id.clone(),
            result_payload: serde_json::to_string(&task.result_payload)?,
            chapters: serde_json::to_string(&task.chapters)?,
            summary: serde_json::to_string(&task.summary)?,
            transcript: serde_json::to_string(&task.transcript)?,
            created_at: task.created_at,
            updated_at: task.updated_at,
        })
    }
}
