use anyhow::Result;
use async_trait::async_trait;

use crate::pipeline::types::Document;

pub mod tingwu;

pub use tingwu::TingwuClient;

/// Acknowledgement returned by a successful submission.
#[derive(Debug, Clone)]
pub struct SubmitReceipt {
    pub task_id: String,
    pub status: String,
}

/// Remote job state, decoded once at the adapter boundary so the polling
/// stage never inspects raw provider responses.
#[derive(Debug, Clone)]
pub enum ProviderTaskState {
    /// ONGOING or any other non-terminal marker the provider emits.
    Running(String),
    /// Terminal success; carries the provider's raw result document
    /// (artifact URLs keyed by result type).
    Completed(Document),
    /// Terminal failure (FAILED/ERROR).
    Failed(String),
}

/// Speech-to-text job service collaborator: submit a source URL, then
/// poll by provider task id until a terminal state.
#[async_trait]
pub trait SttProvider: Send + Sync + 'static {
    async fn submit(&self, source_url: &str, correlation_key: &str) -> Result<SubmitReceipt>;
    async fn query(&self, provider_task_id: &str) -> Result<ProviderTaskState>;
}
