use std::sync::Arc;

use anyhow::{anyhow, Result};

pub mod discovery;
pub mod poll;
pub mod scheduler;
pub mod submit;
pub mod types;

pub use scheduler::Scheduler;
pub use types::{Document, Task, TaskStatus, PROVIDER_FAILED_MARKER};

use crate::blobstore::BlobStore;
use crate::provider::SttProvider;
use crate::storage::task::{TaskPatch, TaskStorage};
use crate::web::Pagination;
use discovery::Discovery;
use poll::PollStage;
use submit::SubmitStage;

/// The transcription pipeline: discovery sync plus the two lifecycle
/// stages, sharing one store and one pair of external adapters. Invoked
/// by the scheduler loop and by the HTTP handlers.
pub struct Pipeline {
    storage: Arc<dyn TaskStorage>,
    blobs: Arc<dyn BlobStore>,
    submit: SubmitStage,
    poll: PollStage,
    discovery: Discovery,
}

impl Pipeline {
    pub fn new(
        storage: Arc<dyn TaskStorage>,
        blobs: Arc<dyn BlobStore>,
        provider: Arc<dyn SttProvider>,
        region: String,
    ) -> Self {
        let submit = SubmitStage::new(storage.clone(), blobs.clone(), provider.clone());
        let poll = PollStage::new(storage.clone(), provider);
        let discovery = Discovery::new(storage.clone(), blobs.clone(), region);
        Self {
            storage,
            blobs,
            submit,
            poll,
            discovery,
        }
    }

    pub fn storage(&self) -> &Arc<dyn TaskStorage> {
        &self.storage
    }

    pub async fn submit_pending(&self) -> Result<usize> {
        self.submit.submit_pending().await
    }

    pub async fn poll_inflight(&self) -> Result<usize> {
        self.poll.poll_inflight().await
    }

    pub async fn sync_bucket(&self) -> Result<usize> {
        self.discovery.sync_bucket().await
    }

    pub async fn list(&self, pagination: &Pagination) -> Result<Vec<Task>> {
        self.storage.list(pagination).await
    }

    pub async fn get_by_key(&self, object_key: &str) -> Result<Option<Task>> {
        self.storage.get_by_key(object_key).await
    }

    pub async fn presign(&self, object_key: &str) -> Result<String> {
        self.blobs.presign_get(object_key).await
    }

    /// Explicit operator action: push a FAILED task back to PENDING so
    /// the next tick resubmits it. The provider task id and all result
    /// documents are cleared. FAILED tasks are never retried on their own.
    pub async fn resubmit(&self, object_key: &str) -> Result<Task> {
        let task = self
            .storage
            .get_by_key(object_key)
            .await?
            .ok_or_else(|| anyhow!("no task for object {}", object_key))?;

        if task.status != TaskStatus::Failed {
            return Err(anyhow!(
                "only FAILED tasks can be resubmitted (current status: {})",
                task.status
            ));
        }

        let patch = TaskPatch {
            status: Some(TaskStatus::Pending),
            provider_task_id: Some(String::new()),
            result_payload: Some(Document::new()),
            chapters: Some(Document::new()),
            summary: Some(Document::new()),
            transcript: Some(Document::new()),
            ..Default::default()
        };
        self.storage.apply(&task.id, &patch).await?;

        self.storage
            .get(&task.id)
            .await?
            .ok_or_else(|| anyhow!("task disappeared during resubmission: {}", object_key))
    }
}

#[cfg(test)]
mod tests;
