use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct StorageConfig {
    /// Custom endpoint for S3-compatible providers (MinIO, R2, Spaces...)
    pub endpoint: Option<String>,
    pub region: String,
    pub bucket: String,
    pub access_key_id: Option<String>,
    pub secret_access_key: Option<String>,
    pub presign_expiry_secs: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            region: "us-east-1".to_string(),
            bucket: String::new(),
            access_key_id: None,
            secret_access_key: None,
            presign_expiry_secs: crate::pipeline::DEFAULT_LINK_EXPIRY.as_secs(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
#[serde(default)]
pub struct InstagramConfig {
    /// Netscape cookie file holding a logged-in session
    pub cookies_file: Option<PathBuf>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct PipelineConfig {
    pub scratch_dir: PathBuf,
    /// `None` runs every URL of a batch at once
    pub max_concurrency: Option<usize>,
    pub extract_timeout_secs: u64,
    pub download_timeout_secs: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            scratch_dir: PathBuf::from("downloads"),
            max_concurrency: None,
            extract_timeout_secs: 30,
            download_timeout_secs: 300,
        }
    }
}

impl PipelineConfig {
    pub fn extract_timeout(&self) -> Duration {
        Duration::from_secs(self.extract_timeout_secs)
    }

    pub fn download_timeout(&self) -> Duration {
        Duration::from_secs(self.download_timeout_secs)
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct RetryConfig {
    pub max_attempts: usize,
    pub initial_backoff_secs: u64,
    pub max_backoff_secs: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff_secs: 4,
            max_backoff_secs: 10,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct LoggingConfig {
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            format: "json".to_string(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:8000".to_string(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
#[serde(default)]
pub struct Config {
    pub storage: StorageConfig,
    pub instagram: InstagramConfig,
    pub pipeline: PipelineConfig,
    pub retry: RetryConfig,
    pub logging: LoggingConfig,
    pub server: ServerConfig,
}

impl Config {
    pub fn from_file(path: &str) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path))?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content).context("Failed to parse config file")
    }

    /// Environment variables win over whatever the file says.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(endpoint) = lookup("S3_ENDPOINT_URL") {
            self.storage.endpoint = Some(endpoint);
        }
        if let Some(region) = lookup("S3_REGION") {
            self.storage.region = region;
        }
        if let Some(bucket) = lookup("S3_BUCKET") {
            self.storage.bucket = bucket;
        }
        if let Some(key_id) = lookup("AWS_ACCESS_KEY_ID") {
            self.storage.access_key_id = Some(key_id);
        }
        if let Some(secret) = lookup("AWS_SECRET_ACCESS_KEY") {
            self.storage.secret_access_key = Some(secret);
        }
        if let Some(cookies) = lookup("INSTAGRAM_COOKIES_FILE") {
            self.instagram.cookies_file = Some(PathBuf::from(cookies));
        }
    }

    pub fn validate_storage(&self) -> Result<()> {
        if self.storage.bucket.is_empty() {
            anyhow::bail!("Storage bucket is not configured");
        }
        if self.storage.access_key_id.is_none() || self.storage.secret_access_key.is_none() {
            anyhow::bail!("Storage credentials are not configured");
        }
        Ok(())
    }

    pub fn get_logging_format(&self) -> &str {
        &self.logging.format
    }
}
