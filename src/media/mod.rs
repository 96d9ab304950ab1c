mod fetcher;
mod gallery_dl;
pub mod platform;
mod types;
mod ytdlp;

pub use fetcher::Fetcher;
pub use gallery_dl::GalleryDlFetcher;
pub use types::{Platform, VideoMetadata};
pub use ytdlp::YtDlpFetcher;

use crate::config::Config;
use anyhow::{Context, Result};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, warn};

/// One fetcher per supported platform, built once and shared by every task.
#[derive(Clone)]
pub struct FetcherRegistry {
    fetchers: HashMap<Platform, Arc<dyn Fetcher>>,
}

impl FetcherRegistry {
    pub fn new(fetchers: Vec<Arc<dyn Fetcher>>) -> Self {
        let fetchers = fetchers
            .into_iter()
            .map(|fetcher| (fetcher.platform(), fetcher))
            .collect();
        Self { fetchers }
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        let pipeline = &config.pipeline;
        info!(
            "Media fetchers initialized - yt-dlp for youtube, gallery-dl for instagram, scratch dir {}",
            pipeline.scratch_dir.display()
        );

        let youtube = YtDlpFetcher::new(pipeline.extract_timeout(), pipeline.download_timeout());
        let instagram = GalleryDlFetcher::new(
            config.instagram.cookies_file.clone(),
            pipeline.extract_timeout(),
            pipeline.download_timeout(),
        )
        .context("Failed to initialize instagram fetcher")?;

        Ok(Self::new(vec![Arc::new(youtube), Arc::new(instagram)]))
    }

    pub fn get(&self, platform: Platform) -> Option<Arc<dyn Fetcher>> {
        self.fetchers.get(&platform).cloned()
    }

    pub async fn test_setup(&self) -> Result<()> {
        info!("Testing media fetcher setup...");

        let mut missing = Vec::new();
        for fetcher in self.fetchers.values() {
            if !fetcher.test_availability().await {
                warn!("{} is not available for {}", fetcher.name(), fetcher.platform());
                missing.push(fetcher.name());
            }
        }

        if missing.is_empty() {
            info!("All media fetchers are available");
            Ok(())
        } else {
            Err(anyhow::anyhow!(
                "Missing extraction tools: {}. Please install them.",
                missing.join(", ")
            ))
        }
    }
}
