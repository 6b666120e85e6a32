use std::sync::Arc;

use anyhow::Result;
use chrono::{DateTime, Utc};
use tracing::info;

use crate::blobstore::BlobStore;
use crate::pipeline::types::Task;
use crate::storage::task::{TaskPatch, TaskStorage};

/// Mirrors the bucket listing into the task store. New objects become
/// PENDING rows; known objects only get their metadata refreshed —
/// discovery never touches status or provider fields.
pub struct Discovery {
    storage: Arc<dyn TaskStorage>,
    blobs: Arc<dyn BlobStore>,
    region: String,
}

impl Discovery {
    pub fn new(storage: Arc<dyn TaskStorage>, blobs: Arc<dyn BlobStore>, region: String) -> Self {
        Self {
            storage,
            blobs,
            region,
        }
    }

    /// Returns how many new tasks were created this pass.
    pub async fn sync_bucket(&self) -> Result<usize> {
        let objects = self.blobs.list("").await?;

        let mut created = 0;
        for item in objects {
            match self.storage.get_by_key(&item.key).await? {
                None => {
                    let task = Task::new(
                        item.key.clone(),
                        self.region.clone(),
                        item.size,
                        format_mtime(&item.last_modified),
                    );
                    self.storage.upsert(&task).await?;
                    info!("Synced new file: {}", item.key);
                    created += 1;
                }
                Some(existing) => {
                    let patch = TaskPatch {
                        size: Some(item.size),
                        last_modified: Some(format_mtime(&item.last_modified)),
                        ..Default::default()
                    };
                    self.storage.apply(&existing.id, &patch).await?;
                }
            }
        }

        Ok(created)
    }
}

fn format_mtime(mtime: &DateTime<Utc>) -> String {
    mtime.format("%Y-%m-%d %H:%M:%S").to_string()
}
