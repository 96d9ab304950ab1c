use super::{
    fetcher::Fetcher,
    platform::instagram_shortcode,
    types::{Platform, VideoMetadata},
    ytdlp::sanitize_file_stem,
};
use crate::error::PipelineError;
use anyhow::{Context, Result};
use async_trait::async_trait;
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, info, warn};

const VIDEO_EXTENSIONS: &[&str] = &["mp4", "mov", "webm", "m4v"];

/// What a `gallery-dl --dump-json` run says about one post.
#[derive(Debug, PartialEq)]
pub struct InstagramPost {
    pub shortcode: Option<String>,
    pub description: String,
    pub thumbnail: Option<String>,
    /// First video item of the post, if it has one
    pub video_url: Option<String>,
}

impl InstagramPost {
    /// gallery-dl format: `[[type, metadata], [type, url, metadata], ...]`
    pub fn from_dump(json: &Value) -> Result<Self> {
        let array = json
            .as_array()
            .ok_or_else(|| anyhow::anyhow!("Invalid media metadata format"))?;

        if array.is_empty() {
            return Err(anyhow::anyhow!("No media found for this URL"));
        }

        let mut first_meta: Option<&Value> = None;
        let mut video: Option<(String, &Value)> = None;

        for item in array {
            let Some(item_array) = item.as_array() else {
                continue;
            };
            if item_array.len() != 3 {
                continue;
            }
            let (Some(url), Some(meta)) = (item_array[1].as_str(), item_array.get(2)) else {
                continue;
            };

            first_meta.get_or_insert(meta);

            if video.is_none() {
                if let Some(video_url) = Self::video_url_of(url, meta) {
                    video = Some((video_url, meta));
                }
            }
        }

        let meta = video
            .as_ref()
            .map(|(_, meta)| *meta)
            .or(first_meta)
            .ok_or_else(|| anyhow::anyhow!("No media metadata found"))?;

        Ok(Self {
            shortcode: meta["post_shortcode"]
                .as_str()
                .or(meta["shortcode"].as_str())
                .map(|s| s.to_string()),
            description: meta["description"]
                .as_str()
                .or(meta["content"].as_str())
                .unwrap_or_default()
                .to_string(),
            thumbnail: meta["display_url"]
                .as_str()
                .or(meta["thumbnail"].as_str())
                .map(|s| s.to_string()),
            video_url: video.map(|(url, _)| url),
        })
    }

    fn video_url_of(url: &str, meta: &Value) -> Option<String> {
        if let Some(video_url) = meta["video_url"].as_str() {
            return Some(video_url.to_string());
        }
        let extension = meta["extension"].as_str()?.to_ascii_lowercase();
        VIDEO_EXTENSIONS
            .contains(&extension.as_str())
            .then(|| url.to_string())
    }

    /// Instagram posts have no title: the caption stands in, then the shortcode.
    pub fn title(&self) -> String {
        if !self.description.trim().is_empty() {
            return self.description.clone();
        }
        self.shortcode
            .clone()
            .unwrap_or_else(|| "Instagram post".to_string())
    }

    /// File stem for the download. The extractor's shortcode wins; the URL
    /// path is only a fallback.
    pub fn file_stem(&self, url: &str) -> Option<String> {
        self.shortcode
            .clone()
            .filter(|code| !code.is_empty())
            .or_else(|| instagram_shortcode(url))
            .map(|code| sanitize_file_stem(&code))
    }
}

pub struct GalleryDlFetcher {
    cookies_file: Option<PathBuf>,
    http: reqwest::Client,
    extract_timeout: Duration,
}

impl GalleryDlFetcher {
    pub fn new(
        cookies_file: Option<PathBuf>,
        extract_timeout: Duration,
        download_timeout: Duration,
    ) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(download_timeout)
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            cookies_file,
            http,
            extract_timeout,
        })
    }

    async fn extract_post(&self, url: &str) -> Result<InstagramPost> {
        debug!("Extracting metadata with gallery-dl for: {}", url);

        let mut command = Command::new("gallery-dl");
        command.arg("--dump-json");
        if let Some(cookies) = &self.cookies_file {
            command.arg("--cookies").arg(cookies);
        }
        command.arg(url);

        let output = tokio::time::timeout(self.extract_timeout, command.output())
            .await
            .context("Media metadata extraction timed out")?
            .context("Failed to run gallery-dl")?;

        if !output.status.success() {
            let error = String::from_utf8_lossy(&output.stderr);
            return Err(anyhow::anyhow!(
                "Media metadata extraction failed: {}",
                error.trim()
            ));
        }

        let json: Value =
            serde_json::from_slice(&output.stdout).context("Failed to parse media metadata")?;

        InstagramPost::from_dump(&json)
    }

    async fn download_to_file(&self, media_url: &str, destination: &Path) -> Result<()> {
        debug!("Downloading {} to {}", media_url, destination.display());

        let mut response = self
            .http
            .get(media_url)
            .send()
            .await
            .context("Failed to fetch media URL")?;

        if !response.status().is_success() {
            return Err(anyhow::anyhow!(
                "Failed to download media: HTTP {}",
                response.status()
            ));
        }

        let mut file = tokio::fs::File::create(destination)
            .await
            .with_context(|| format!("Failed to create {}", destination.display()))?;

        let mut written = 0u64;
        while let Some(chunk) = response.chunk().await.context("Failed to read media data")? {
            file.write_all(&chunk)
                .await
                .context("Failed to write media data")?;
            written += chunk.len() as u64;
        }
        file.flush().await.context("Failed to flush media data")?;

        if written == 0 {
            anyhow::bail!("Downloaded file is empty");
        }

        info!("Wrote {} bytes to {}", written, destination.display());
        Ok(())
    }

    /// Download the post's video, or fail with `NotAVideo` before touching
    /// the network or the scratch directory.
    async fn save_post(
        &self,
        url: &str,
        post: &InstagramPost,
        scratch_dir: &Path,
    ) -> Result<VideoMetadata> {
        let Some(video_url) = post.video_url.as_deref() else {
            return Err(PipelineError::NotAVideo(url.to_string()).into());
        };

        let stem = post
            .file_stem(url)
            .context("Could not determine post shortcode")?;
        let destination = scratch_dir.join(format!("{}.mp4", stem));

        self.download_to_file(video_url, &destination).await?;

        Ok(VideoMetadata {
            title: post.title(),
            description: post.description.clone(),
            thumbnail: post.thumbnail.clone(),
            source_platform: Platform::Instagram,
            original_url: url.to_string(),
            local_path: Some(destination),
            published_url: None,
        })
    }
}

#[async_trait]
impl Fetcher for GalleryDlFetcher {
    fn name(&self) -> &'static str {
        "gallery-dl"
    }

    fn platform(&self) -> Platform {
        Platform::Instagram
    }

    async fn fetch(&self, url: &str, scratch_dir: &Path) -> Result<VideoMetadata> {
        info!("Starting gallery-dl fetch for: {}", url);
        let post = self.extract_post(url).await?;
        self.save_post(url, &post, scratch_dir).await
    }

    async fn test_availability(&self) -> bool {
        match Command::new("gallery-dl").arg("--version").output().await {
            Ok(output) if output.status.success() => {
                let version = String::from_utf8_lossy(&output.stdout);
                info!("gallery-dl is available, version: {}", version.trim());
                true
            }
            Ok(_) => {
                warn!("gallery-dl command failed");
                false
            }
            Err(e) => {
                warn!("gallery-dl not found: {}", e);
                false
            }
        }
    }
}
