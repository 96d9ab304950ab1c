use crate::error::PipelineError;
use crate::media::{Platform, VideoMetadata};
use serde::{Deserialize, Serialize};

/// What a consumer gets back for a published video.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PublishedVideo {
    pub title: String,
    pub description: String,
    #[serde(rename = "thumbnail_url")]
    pub thumbnail: Option<String>,
    pub source_platform: Platform,
    pub original_url: String,
    #[serde(rename = "upload_url")]
    pub published_url: String,
}

/// Outcome of one URL, serialized with a `status` tag.
///
/// `{"status":"success","metadata":{...}}` or
/// `{"status":"error","url":...,"error":...,"kind":...}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum ResultRecord {
    Success {
        metadata: PublishedVideo,
    },
    Error {
        url: String,
        error: String,
        kind: String,
    },
}

impl ResultRecord {
    pub fn success(metadata: VideoMetadata, published_url: String) -> Self {
        ResultRecord::Success {
            metadata: PublishedVideo {
                title: metadata.title,
                description: metadata.description,
                thumbnail: metadata.thumbnail,
                source_platform: metadata.source_platform,
                original_url: metadata.original_url,
                published_url,
            },
        }
    }

    pub fn failure(url: &str, error: &PipelineError) -> Self {
        ResultRecord::Error {
            url: url.to_string(),
            error: error.to_string(),
            kind: error.code().to_string(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, ResultRecord::Success { .. })
    }

    pub fn url(&self) -> &str {
        match self {
            ResultRecord::Success { metadata } => &metadata.original_url,
            ResultRecord::Error { url, .. } => url,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BatchSummary {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
}

impl BatchSummary {
    pub fn from_records(records: &[ResultRecord]) -> Self {
        let succeeded = records.iter().filter(|r| r.is_success()).count();
        Self {
            total: records.len(),
            succeeded,
            failed: records.len() - succeeded,
        }
    }
}
