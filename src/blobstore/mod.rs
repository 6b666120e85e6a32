use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub mod gateway;

pub use gateway::StorageGateway;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObjectMeta {
    pub key: String,
    pub size: i64,
    pub last_modified: DateTime<Utc>,
}

/// Object storage collaborator. The core only needs to enumerate source
/// media and obtain a time-limited download URL; upload/download
/// mechanics live elsewhere.
#[async_trait]
pub trait BlobStore: Send + Sync + 'static {
    async fn list(&self, prefix: &str) -> Result<Vec<ObjectMeta>>;
    async fn presign_get(&self, object_key: &str) -> Result<String>;
}
