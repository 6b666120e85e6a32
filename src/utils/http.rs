use anyhow::Result;

use crate::pipeline::types::Document;

/// Fetch one result artifact as a JSON document. Non-2xx responses and
/// non-object bodies are errors.
pub async fn fetch_json(url: &str) -> Result<Document> {
    let response = reqwest::get(url)
        .await
        .map_err(|e| anyhow::anyhow!("HTTP request failed: {}", e))?;

    if !response.status().is_success() {
        return Err(anyhow::anyhow!(
            "HTTP request failed with status: {}",
            response.status()
        ));
    }

    let document = response
        .json()
        .await
        .map_err(|e| anyhow::anyhow!("Failed to decode response: {}", e))?;

    Ok(document)
}
