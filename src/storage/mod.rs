//! Object storage used by the publish stage.
//!
//! Only the two capabilities the pipeline needs are exposed: storing bytes
//! under a key with a declared content type, and producing a time-limited
//! GET URL for a stored key.

mod s3;

pub use s3::S3Storage;

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Upload failed: {0}")]
    UploadFailed(String),

    #[error("Presign failed: {0}")]
    PresignFailed(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),
}

pub type StorageResult<T> = Result<T, StorageError>;

/// Must be safe to share between concurrent pipeline tasks.
#[async_trait]
pub trait ObjectStorage: Send + Sync {
    async fn put(&self, key: &str, data: Vec<u8>, content_type: &str) -> StorageResult<()>;

    async fn presigned_get_url(&self, key: &str, expires_in: Duration) -> StorageResult<String>;

    fn bucket(&self) -> &str;
}
