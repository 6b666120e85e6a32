use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::info;

use super::{ProviderTaskState, SttProvider, SubmitReceipt};
use crate::pipeline::types::Document;

const SOURCE_LANGUAGE: &str = "fspk";

/// Client for the Tingwu-style offline transcription API: one PUT to
/// create a job with chapters/summary/transcription enabled, then GETs
/// by task id until the job settles.
pub struct TingwuClient {
    base_url: String,
    app_key: String,
    api_key: String,
    client: reqwest::Client,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct CreateTaskRequest {
    app_key: String,
    input: TaskInput,
    parameters: TaskParameters,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct TaskInput {
    source_language: String,
    file_url: String,
    task_key: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct TaskParameters {
    auto_chapters_enabled: bool,
    summarization_enabled: bool,
    summarization: SummarizationParams,
    meeting_assistance_enabled: bool,
    meeting_assistance: MeetingAssistanceParams,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct SummarizationParams {
    types: Vec<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct MeetingAssistanceParams {
    types: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct TaskResponse {
    #[serde(default)]
    code: String,
    #[serde(default)]
    message: String,
    data: Option<TaskData>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct TaskData {
    #[serde(default)]
    task_id: String,
    #[serde(default)]
    task_status: String,
    result: Option<Document>,
}

impl TingwuClient {
    pub fn new(base_url: String, app_key: String, api_key: String) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            app_key,
            api_key,
            client,
        })
    }

    fn authorize(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        if self.api_key.is_empty() {
            req
        } else {
            req.bearer_auth(&self.api_key)
        }
    }
}

#[async_trait]
impl SttProvider for TingwuClient {
    async fn submit(&self, source_url: &str, correlation_key: &str) -> Result<SubmitReceipt> {
        let request = CreateTaskRequest {
            app_key: self.app_key.clone(),
            input: TaskInput {
                source_language: SOURCE_LANGUAGE.to_string(),
                file_url: source_url.to_string(),
                task_key: correlation_key.to_string(),
            },
            parameters: TaskParameters {
                auto_chapters_enabled: true,
                summarization_enabled: true,
                summarization: SummarizationParams {
                    types: vec!["Paragraph".to_string()],
                },
                meeting_assistance_enabled: true,
                meeting_assistance: MeetingAssistanceParams {
                    types: vec!["KeyInformation".to_string()],
                },
            },
        };

        let url = format!("{}/openapi/tingwu/v2/tasks", self.base_url);
        let response = self
            .authorize(self.client.put(&url).query(&[("type", "offline")]))
            .json(&request)
            .send()
            .await
            .context("provider submit request failed")?
            .error_for_status()?;

        let body: TaskResponse = response.json().await?;
        if body.message != "success" {
            return Err(anyhow!(
                "provider rejected submission: code={} message={}",
                body.code,
                body.message
            ));
        }

        let data = body
            .data
            .ok_or_else(|| anyhow!("submission response missing data"))?;
        if data.task_id.is_empty() {
            return Err(anyhow!("submission accepted without a task id"));
        }

        info!(
            "Submitted {} to provider, task id {}",
            correlation_key, data.task_id
        );
        Ok(SubmitReceipt {
            task_id: data.task_id,
            status: data.task_status,
        })
    }

    async fn query(&self, provider_task_id: &str) -> Result<ProviderTaskState> {
        let url = format!("{}/openapi/tingwu/v2/tasks/{}", self.base_url, provider_task_id);
        let response = self
            .authorize(self.client.get(&url))
            .send()
            .await
            .context("provider query request failed")?
            .error_for_status()?;

        let body: TaskResponse = response.json().await?;
        let data = body
            .data
            .ok_or_else(|| anyhow!("query response missing data"))?;

        match data.task_status.as_str() {
            "COMPLETED" => {
                let result = data
                    .result
                    .ok_or_else(|| anyhow!("completed task missing result payload"))?;
                Ok(ProviderTaskState::Completed(result))
            }
            "FAILED" | "ERROR" => Ok(ProviderTaskState::Failed(data.task_status)),
            _ => Ok(ProviderTaskState::Running(data.task_status)),
        }
    }
}
