use super::{
    fetcher::Fetcher,
    types::{Platform, VideoMetadata},
};
use anyhow::{Context, Result};
use async_trait::async_trait;
use serde_json::Value;
use std::path::Path;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, info, warn};

/// Fields of `yt-dlp --dump-json` the pipeline cares about.
#[derive(Debug, PartialEq)]
pub struct YtDlpInfo {
    pub id: String,
    pub title: String,
    pub description: String,
    pub thumbnail: Option<String>,
}

impl YtDlpInfo {
    pub fn from_json(json: &Value) -> Result<Self> {
        let id = json["id"]
            .as_str()
            .filter(|id| !id.is_empty())
            .context("yt-dlp metadata has no video id")?;

        Ok(Self {
            id: sanitize_file_stem(id),
            title: json["title"]
                .as_str()
                .unwrap_or("Unknown Title")
                .to_string(),
            description: json["description"].as_str().unwrap_or_default().to_string(),
            thumbnail: json["thumbnail"].as_str().map(|s| s.to_string()),
        })
    }
}

/// Keeps ids usable as file names.
pub fn sanitize_file_stem(id: &str) -> String {
    id.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

pub struct YtDlpFetcher {
    extract_timeout: Duration,
    download_timeout: Duration,
}

impl YtDlpFetcher {
    pub fn new(extract_timeout: Duration, download_timeout: Duration) -> Self {
        Self {
            extract_timeout,
            download_timeout,
        }
    }

    async fn extract_metadata(&self, url: &str) -> Result<YtDlpInfo> {
        debug!("Extracting metadata with yt-dlp for: {}", url);

        let output = tokio::time::timeout(
            self.extract_timeout,
            Command::new("yt-dlp")
                .arg("--dump-json")
                .arg("--no-download")
                .arg("--no-playlist")
                .arg("--no-warnings")
                .arg(url)
                .output(),
        )
        .await
        .context("Video metadata extraction timed out")?
        .context("Failed to run yt-dlp")?;

        if !output.status.success() {
            let error = String::from_utf8_lossy(&output.stderr);
            return Err(anyhow::anyhow!(
                "Video metadata extraction failed: {}",
                error.trim()
            ));
        }

        let json: Value =
            serde_json::from_slice(&output.stdout).context("Failed to parse video metadata")?;

        YtDlpInfo::from_json(&json)
    }

    async fn download_to_file(&self, url: &str, destination: &Path) -> Result<()> {
        info!("Downloading video with yt-dlp to {}", destination.display());

        let output = tokio::time::timeout(
            self.download_timeout,
            Command::new("yt-dlp")
                .arg("--output")
                .arg(destination)
                .arg("--format")
                .arg("bestvideo[ext=mp4]+bestaudio[ext=m4a]/best[ext=mp4]/best")
                .arg("--merge-output-format")
                .arg("mp4")
                .arg("--no-playlist")
                .arg("--no-warnings")
                .arg("--force-overwrites")
                .arg(url)
                .output(),
        )
        .await
        .context("Video download timed out")?
        .context("Failed to run yt-dlp")?;

        if !output.status.success() {
            let error = String::from_utf8_lossy(&output.stderr);
            return Err(anyhow::anyhow!("Video download failed: {}", error.trim()));
        }

        let size = tokio::fs::metadata(destination)
            .await
            .with_context(|| format!("Downloaded file not found at {}", destination.display()))?
            .len();
        if size == 0 {
            anyhow::bail!("Downloaded file is empty");
        }

        Ok(())
    }
}

#[async_trait]
impl Fetcher for YtDlpFetcher {
    fn name(&self) -> &'static str {
        "yt-dlp"
    }

    fn platform(&self) -> Platform {
        Platform::Youtube
    }

    async fn fetch(&self, url: &str, scratch_dir: &Path) -> Result<VideoMetadata> {
        let info = self.extract_metadata(url).await?;
        let destination = scratch_dir.join(format!("{}.mp4", info.id));

        self.download_to_file(url, &destination).await?;

        Ok(VideoMetadata {
            title: info.title,
            description: info.description,
            thumbnail: info.thumbnail,
            source_platform: Platform::Youtube,
            original_url: url.to_string(),
            local_path: Some(destination),
            published_url: None,
        })
    }

    async fn test_availability(&self) -> bool {
        let yt_dlp_available = match Command::new("yt-dlp").arg("--version").output().await {
            Ok(output) if output.status.success() => {
                let version = String::from_utf8_lossy(&output.stdout);
                info!("yt-dlp is available, version: {}", version.trim());
                true
            }
            Ok(_) => {
                warn!("yt-dlp command failed");
                false
            }
            Err(e) => {
                warn!("yt-dlp not found: {}", e);
                false
            }
        };

        // Merging separate audio/video streams into mp4 needs ffmpeg
        match Command::new("ffmpeg").arg("-version").output().await {
            Ok(output) if output.status.success() => {
                let version_line = String::from_utf8_lossy(&output.stdout)
                    .lines()
                    .next()
                    .unwrap_or("unknown")
                    .to_string();
                info!("ffmpeg is available: {}", version_line);
            }
            _ => {
                warn!("ffmpeg not found, yt-dlp will fall back to single-file formats");
            }
        }

        yt_dlp_available
    }
}
