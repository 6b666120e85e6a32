use std::sync::Arc;

use anyhow::{anyhow, Result};
use serde_json::Value;
use tracing::{debug, error, info, warn};

use crate::pipeline::types::{Document, Task, TaskStatus, PROVIDER_FAILED_MARKER};
use crate::provider::{ProviderTaskState, SttProvider};
use crate::storage::task::{TaskPatch, TaskStorage};
use crate::utils::http::fetch_json;

const CHAPTERS_KEY: &str = "AutoChapters";
const SUMMARY_KEY: &str = "Summarization";
const TRANSCRIPT_KEY: &str = "Transcription";

/// Settles in-flight tasks: IN_FLIGHT → COMPLETED | FAILED.
///
/// Transient failures (transport errors, malformed responses, artifact
/// fetch failures) leave the row untouched; the next tick retries the
/// whole task. Only an explicit FAILED/ERROR status from the provider is
/// recorded as terminal.
pub struct PollStage {
    storage: Arc<dyn TaskStorage>,
    provider: Arc<dyn SttProvider>,
}

impl PollStage {
    pub fn new(storage: Arc<dyn TaskStorage>, provider: Arc<dyn SttProvider>) -> Self {
        Self { storage, provider }
    }

    /// Query the provider for every IN_FLIGHT task. Returns how many
    /// reached a terminal state this tick.
    pub async fn poll_inflight(&self) -> Result<usize> {
        let inflight = self.storage.list_by_status(TaskStatus::InFlight).await?;

        let mut settled = 0;
        for task in inflight {
            // A row can end up IN_FLIGHT without a provider id if a prior
            // submission half-failed; skip it rather than query with "".
            if task.provider_task_id.is_empty() {
                warn!(
                    "[Poll] Task {} is IN_FLIGHT without a provider task id, skipping",
                    task.object_key
                );
                continue;
            }

            match self.poll_one(&task).await {
                Ok(true) => settled += 1,
                Ok(false) => {}
                Err(e) => {
                    error!("[Poll] Error querying {}: {}", task.provider_task_id, e);
                }
            }
        }

        Ok(settled)
    }

    async fn poll_one(&self, task: &Task) -> Result<bool> {
        let state = self.provider.query(&task.provider_task_id).await?;

        match state {
            ProviderTaskState::Running(status) => {
                debug!("[Poll] Task {} still {}", task.object_key, status);
                Ok(false)
            }
            ProviderTaskState::Completed(result) => {
                self.complete(task, result).await?;
                Ok(true)
            }
            ProviderTaskState::Failed(status) => {
                let mut payload = Document::new();
                payload.insert(
                    "error".to_string(),
                    Value::String(PROVIDER_FAILED_MARKER.to_string()),
                );
                let patch = TaskPatch {
                    status: Some(TaskStatus::Failed),
                    result_payload: Some(payload),
                    ..Default::default()
                };
                self.storage.apply(&task.id, &patch).await?;
                error!(
                    "[Poll] Task {} FAILED remotely ({})",
                    task.object_key, status
                );
                Ok(true)
            }
        }
    }

    async fn complete(&self, task: &Task, result: Document) -> Result<()> {
        let chapters_url = artifact_url(&result, CHAPTERS_KEY)?;
        let summary_url = artifact_url(&result, SUMMARY_KEY)?;
        let transcript_url = artifact_url(&result, TRANSCRIPT_KEY)?;

        // Any single fetch failure aborts this update; the row stays
        // IN_FLIGHT and the whole task is retried next tick.
        let chapters = fetch_json(&chapters_url).await?;
        let summary = fetch_json(&summary_url).await?;
        let transcript = fetch_json(&transcript_url).await?;

        let patch = TaskPatch {
            status: Some(TaskStatus::Completed),
            result_payload: Some(result),
            chapters: Some(chapters),
            summary: Some(summary),
            transcript: Some(transcript),
            ..Default::default()
        };
        self.storage.apply(&task.id, &patch).await?;

        info!("[Poll] Task {} COMPLETED.", task.object_key);
        Ok(())
    }
}

fn artifact_url(result: &Document, key: &str) -> Result<String> {
    result
        .get(key)
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| anyhow!("result payload missing {} url", key))
}
