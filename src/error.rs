use thiserror::Error;

/// Per-URL failures. Every variant ends up inside a `ResultRecord`; none of
/// them abort a batch.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Unsupported platform for URL: {0}")]
    UnsupportedPlatform(String),

    #[error("Post does not contain a video: {0}")]
    NotAVideo(String),

    #[error("Fetch failed for {url}: {cause}")]
    FetchFailed { url: String, cause: String },

    #[error("Publish failed for {url}: {cause}")]
    PublishFailed { url: String, cause: String },

    #[error("Local file missing: {0}")]
    MissingLocalFile(String),
}

impl PipelineError {
    /// Stable machine-readable code carried in error records.
    pub fn code(&self) -> &'static str {
        match self {
            PipelineError::UnsupportedPlatform(_) => "unsupported_platform",
            PipelineError::NotAVideo(_) => "not_a_video",
            PipelineError::FetchFailed { .. } => "fetch_failed",
            PipelineError::PublishFailed { .. } => "publish_failed",
            PipelineError::MissingLocalFile(_) => "missing_local_file",
        }
    }
}
