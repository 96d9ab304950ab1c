use super::types::{Platform, VideoMetadata};
use anyhow::Result;
use async_trait::async_trait;
use std::path::Path;

#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Human-readable name of the extraction backend
    fn name(&self) -> &'static str;

    /// Platform whose URLs this fetcher handles
    fn platform(&self) -> Platform;

    /// Download the video behind `url` into `scratch_dir`, which belongs to
    /// this call alone.
    ///
    /// On success `local_path` points at exactly one existing file named
    /// after the item id the extractor reported.
    async fn fetch(&self, url: &str, scratch_dir: &Path) -> Result<VideoMetadata>;

    /// Test if the extraction tool is available on the system
    async fn test_availability(&self) -> bool;
}
