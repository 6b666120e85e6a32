use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Result};
use governor::{DefaultDirectRateLimiter, Jitter, Quota, RateLimiter};
use tracing::{error, info};

use crate::blobstore::BlobStore;
use crate::pipeline::types::{Task, TaskStatus};
use crate::provider::SttProvider;
use crate::storage::task::{TaskPatch, TaskStorage};

const SUBMITS_PER_MINUTE: u32 = 30;

/// Moves discovered tasks into the provider's queue: PENDING → IN_FLIGHT.
///
/// Submissions run sequentially and paced; the provider rate-limits task
/// creation. A failed submission leaves the row PENDING and the next tick
/// retries it, so submission is at-least-once — the provider deduplicates
/// on the correlation key.
pub struct SubmitStage {
    storage: Arc<dyn TaskStorage>,
    blobs: Arc<dyn BlobStore>,
    provider: Arc<dyn SttProvider>,
    limiter: DefaultDirectRateLimiter,
    jitter: Jitter,
}

impl SubmitStage {
    pub fn new(
        storage: Arc<dyn TaskStorage>,
        blobs: Arc<dyn BlobStore>,
        provider: Arc<dyn SttProvider>,
    ) -> Self {
        // Burst of one: the quota must space consecutive submissions,
        // not just bound the per-minute total.
        let quota = Quota::per_minute(NonZeroU32::new(SUBMITS_PER_MINUTE).unwrap())
            .allow_burst(NonZeroU32::new(1).unwrap());
        Self {
            storage,
            blobs,
            provider,
            limiter: RateLimiter::direct(quota),
            jitter: Jitter::up_to(Duration::from_millis(500)),
        }
    }

    /// Submit every PENDING task once. Returns how many moved to IN_FLIGHT.
    pub async fn submit_pending(&self) -> Result<usize> {
        // Snapshot first; the pool connection is released before any
        // network call below.
        let pending = self.storage.list_by_status(TaskStatus::Pending).await?;

        let mut submitted = 0;
        for task in pending {
            self.limiter.until_ready_with_jitter(self.jitter).await;
            match self.submit_one(&task).await {
                Ok(()) => submitted += 1,
                Err(e) => {
                    error!("[Submit] Error processing {}: {}", task.object_key, e);
                }
            }
        }

        Ok(submitted)
    }

    async fn submit_one(&self, task: &Task) -> Result<()> {
        info!("[Submit] Processing pending task: {}", task.object_key);

        let source_url = self.blobs.presign_get(&task.object_key).await?;
        let receipt = self.provider.submit(&source_url, &task.object_key).await?;
        if receipt.task_id.is_empty() {
            return Err(anyhow!("provider returned an empty task id"));
        }

        // Re-fetch by key: the row may have been mutated while the
        // provider call was in flight.
        let current = self
            .storage
            .get_by_key(&task.object_key)
            .await?
            .ok_or_else(|| anyhow!("task disappeared during submission: {}", task.object_key))?;

        let patch = TaskPatch {
            status: Some(TaskStatus::InFlight),
            provider_task_id: Some(receipt.task_id.clone()),
            ..Default::default()
        };
        self.storage.apply(&current.id, &patch).await?;

        info!(
            "[Submit] Submitted {}, Task ID: {}",
            task.object_key, receipt.task_id
        );
        Ok(())
    }
}
