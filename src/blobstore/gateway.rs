use anyhow::{Context, Result};
use async_trait::async_trait;
use percent_encoding::{utf8_percent_encode, AsciiSet, CONTROLS};
use serde::Deserialize;

use super::{BlobStore, ObjectMeta};

// Path-segment escaping for object keys, which routinely contain spaces
// and CJK characters.
const PATH_SEGMENT: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'/')
    .add(b'?')
    .add(b'{')
    .add(b'}');

/// Client for the deployment's object-storage gateway, which proxies the
/// bucket behind JSON list/presign endpoints.
pub struct StorageGateway {
    base_url: String,
    bucket: String,
    client: reqwest::Client,
}

#[derive(Debug, Deserialize)]
struct ListResponse {
    objects: Vec<ObjectMeta>,
}

#[derive(Debug, Deserialize)]
struct PresignResponse {
    url: String,
}

impl StorageGateway {
    pub fn new(base_url: String, bucket: String) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            bucket,
            client,
        })
    }
}

#[async_trait]
impl BlobStore for StorageGateway {
    async fn list(&self, prefix: &str) -> Result<Vec<ObjectMeta>> {
        let url = format!("{}/buckets/{}/objects", self.base_url, self.bucket);
        let response = self
            .client
            .get(&url)
            .query(&[("prefix", prefix)])
            .send()
            .await
            .context("storage gateway list request failed")?
            .error_for_status()?;

        let body: ListResponse = response.json().await?;
        Ok(body.objects)
    }

    async fn presign_get(&self, object_key: &str) -> Result<String> {
        let key = utf8_percent_encode(object_key, PATH_SEGMENT);
        let url = format!("{}/buckets/{}/presign/{}", self.base_url, self.bucket, key);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .context("storage gateway presign request failed")?
            .error_for_status()?;

        let body: PresignResponse = response.json().await?;
        Ok(body.url)
    }
}
