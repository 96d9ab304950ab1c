use crate::error::PipelineError;
use crate::media::VideoMetadata;
use crate::retry::RetryPolicy;
use crate::storage::ObjectStorage;
use anyhow::Context;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// Every upload is declared as mp4, whatever container the fetcher produced.
pub const VIDEO_CONTENT_TYPE: &str = "video/mp4";

/// Seven days.
pub const DEFAULT_LINK_EXPIRY: Duration = Duration::from_secs(604_800);

pub struct Publisher {
    storage: Arc<dyn ObjectStorage>,
    retry: RetryPolicy,
    link_expiry: Duration,
}

impl Publisher {
    pub fn new(storage: Arc<dyn ObjectStorage>, retry: RetryPolicy, link_expiry: Duration) -> Self {
        Self {
            storage,
            retry,
            link_expiry,
        }
    }

    /// `videos/<platform>/<local file name>`
    pub fn object_key(metadata: &VideoMetadata) -> Result<String, PipelineError> {
        let path = metadata
            .local_path
            .as_ref()
            .ok_or_else(|| PipelineError::MissingLocalFile(metadata.original_url.clone()))?;
        let filename = path
            .file_name()
            .and_then(|name| name.to_str())
            .ok_or_else(|| PipelineError::MissingLocalFile(path.display().to_string()))?;

        Ok(format!("videos/{}/{}", metadata.source_platform, filename))
    }

    /// Upload the local file and store a presigned link in `metadata.published_url`.
    pub async fn publish(&self, metadata: &mut VideoMetadata) -> Result<String, PipelineError> {
        let key = Self::object_key(metadata)?;
        let path = metadata
            .local_path
            .clone()
            .ok_or_else(|| PipelineError::MissingLocalFile(metadata.original_url.clone()))?;

        if !tokio::fs::try_exists(&path).await.unwrap_or(false) {
            return Err(PipelineError::MissingLocalFile(path.display().to_string()));
        }

        let storage = &self.storage;
        let expiry = self.link_expiry;
        let outcome = self
            .retry
            .run("publish", |_| {
                let key = key.clone();
                let path = path.clone();
                async move {
                    let data = tokio::fs::read(&path)
                        .await
                        .with_context(|| format!("Failed to read {}", path.display()))?;
                    storage.put(&key, data, VIDEO_CONTENT_TYPE).await?;
                    let url = storage.presigned_get_url(&key, expiry).await?;
                    Ok(url)
                }
            })
            .await
            .map_err(|e| PipelineError::PublishFailed {
                url: metadata.original_url.clone(),
                cause: format!("{e:#}"),
            })?;

        info!(
            bucket = %self.storage.bucket(),
            key = %key,
            attempts = outcome.attempts,
            "Published video"
        );

        metadata.published_url = Some(outcome.result.clone());
        Ok(outcome.result)
    }
}
