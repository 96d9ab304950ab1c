//! Per-URL pipeline: route, fetch, publish, clean up. Batches fan the
//! pipeline out concurrently and return one record per input URL, in
//! input order.

mod publisher;
mod record;
mod scratch;

pub use publisher::{Publisher, DEFAULT_LINK_EXPIRY, VIDEO_CONTENT_TYPE};
pub use record::{BatchSummary, ResultRecord};
pub use scratch::ScratchDir;

#[cfg(test)]
pub(crate) use publisher::tests::MemoryStorage;

use crate::error::PipelineError;
use crate::media::{platform, Fetcher, FetcherRegistry, VideoMetadata};
use crate::retry::RetryPolicy;
use futures::stream::{self, StreamExt};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

pub struct Pipeline {
    fetchers: FetcherRegistry,
    publisher: Publisher,
    retry: RetryPolicy,
    max_concurrency: Option<usize>,
    scratch_root: PathBuf,
}

impl Pipeline {
    pub fn new(
        fetchers: FetcherRegistry,
        publisher: Publisher,
        retry: RetryPolicy,
        max_concurrency: Option<usize>,
        scratch_root: impl Into<PathBuf>,
    ) -> Self {
        if max_concurrency.is_none() {
            warn!("Batch concurrency is unbounded; large batches start every download at once");
        }
        Self {
            fetchers,
            publisher,
            retry,
            max_concurrency,
            scratch_root: scratch_root.into(),
        }
    }

    fn fetcher_for(&self, url: &str) -> Result<Arc<dyn Fetcher>, PipelineError> {
        let platform = platform::classify(url)?;
        self.fetchers
            .get(platform)
            .ok_or_else(|| PipelineError::UnsupportedPlatform(url.to_string()))
    }

    /// Run the fetcher under the retry policy. Every attempt writes into the
    /// same task directory.
    async fn fetch(
        &self,
        fetcher: &dyn Fetcher,
        url: &str,
        scratch_dir: &Path,
    ) -> Result<VideoMetadata, PipelineError> {
        let outcome = self
            .retry
            .run(fetcher.name(), |_| fetcher.fetch(url, scratch_dir))
            .await
            .map_err(|e| match e.downcast_ref::<PipelineError>() {
                Some(PipelineError::NotAVideo(_)) => PipelineError::NotAVideo(url.to_string()),
                _ => PipelineError::FetchFailed {
                    url: url.to_string(),
                    cause: format!("{e:#}"),
                },
            })?;

        info!(
            platform = %fetcher.platform(),
            attempts = outcome.attempts,
            "Fetched {}",
            url
        );
        Ok(outcome.result)
    }

    async fn run(&self, url: &str) -> Result<ResultRecord, PipelineError> {
        let fetcher = self.fetcher_for(url)?;
        let scratch = ScratchDir::create(&self.scratch_root)
            .await
            .map_err(|e| PipelineError::FetchFailed {
                url: url.to_string(),
                cause: format!("Failed to create scratch directory: {e}"),
            })?;

        let mut metadata = self.fetch(fetcher.as_ref(), url, scratch.path()).await?;
        let published = self.publisher.publish(&mut metadata).await;

        scratch.release();
        metadata.local_path = None;

        let published_url = published?;
        Ok(ResultRecord::success(metadata, published_url))
    }

    /// Never fails: any error becomes an error record for this URL.
    pub async fn process_one(&self, url: &str) -> ResultRecord {
        let record = match self.run(url).await {
            Ok(record) => record,
            Err(e) => {
                warn!(kind = e.code(), "Failed to process {}: {}", url, e);
                ResultRecord::failure(url, &e)
            }
        };
        if record.is_success() {
            info!("Processed {}", record.url());
        }
        record
    }

    pub async fn process_batch(&self, urls: &[String]) -> Vec<ResultRecord> {
        let limit = self.max_concurrency.unwrap_or(urls.len()).max(1);
        info!(urls = urls.len(), concurrency = limit, "Starting batch");

        let records: Vec<ResultRecord> = stream::iter(urls.iter().cloned())
            .map(|url| async move { self.process_one(&url).await })
            .buffered(limit)
            .collect()
            .await;

        let summary = BatchSummary::from_records(&records);
        info!(
            total = summary.total,
            succeeded = summary.succeeded,
            failed = summary.failed,
            "Batch finished"
        );
        records
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RetryConfig;
    use crate::media::{Fetcher, Platform};
    use crate::storage::ObjectStorage;
    use anyhow::Result;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    /// How the fake fetcher behaves for a given item id.
    #[derive(Clone, Copy)]
    enum Script {
        Ok { delay_ms: u64 },
        FailTimes(usize),
        NotAVideo,
    }

    struct FakeFetcher {
        platform: Platform,
        scripts: HashMap<String, Script>,
        calls: Mutex<HashMap<String, usize>>,
        total_calls: AtomicUsize,
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
    }

    impl FakeFetcher {
        fn new(platform: Platform, scripts: &[(&str, Script)]) -> Self {
            Self {
                platform,
                scripts: scripts.iter().map(|(id, s)| (id.to_string(), *s)).collect(),
                calls: Mutex::new(HashMap::new()),
                total_calls: AtomicUsize::new(0),
                in_flight: AtomicUsize::new(0),
                max_in_flight: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl Fetcher for FakeFetcher {
        fn name(&self) -> &'static str {
            "fake"
        }

        fn platform(&self) -> Platform {
            self.platform
        }

        async fn fetch(&self, url: &str, scratch_dir: &Path) -> Result<VideoMetadata> {
            self.total_calls.fetch_add(1, Ordering::SeqCst);
            let id = url.trim_end_matches('/').rsplit('/').next().unwrap().to_string();
            let attempt = {
                let mut calls = self.calls.lock().unwrap();
                let count = calls.entry(id.clone()).or_insert(0);
                *count += 1;
                *count
            };

            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);

            let script = self.scripts.get(&id).copied().unwrap_or(Script::Ok { delay_ms: 0 });
            let result = match script {
                Script::Ok { delay_ms } => {
                    tokio::time::sleep(Duration::from_millis(delay_ms)).await;
                    Ok(())
                }
                Script::FailTimes(n) if attempt <= n => {
                    Err(anyhow::anyhow!("extraction error on attempt {}", attempt))
                }
                Script::FailTimes(_) => Ok(()),
                Script::NotAVideo => Err(PipelineError::NotAVideo(url.to_string()).into()),
            };
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            result?;

            let path = scratch_dir.join(format!("{}.mp4", id));
            tokio::fs::write(&path, id.as_bytes()).await?;

            Ok(VideoMetadata {
                title: format!("title {}", id),
                description: format!("description {}", id),
                thumbnail: Some(format!("https://thumbs.test/{}.jpg", id)),
                source_platform: self.platform,
                original_url: url.to_string(),
                local_path: Some(path),
                published_url: None,
            })
        }

        async fn test_availability(&self) -> bool {
            true
        }
    }

    struct Harness {
        pipeline: Pipeline,
        youtube: Arc<FakeFetcher>,
        instagram: Arc<FakeFetcher>,
        storage: Arc<MemoryStorage>,
        dir: tempfile::TempDir,
    }

    fn harness(
        scripts: &[(&str, Script)],
        storage: MemoryStorage,
        limit: Option<usize>,
    ) -> Harness {
        let dir = tempfile::tempdir().unwrap();
        let youtube = Arc::new(FakeFetcher::new(Platform::Youtube, scripts));
        let instagram = Arc::new(FakeFetcher::new(Platform::Instagram, scripts));
        let storage = Arc::new(storage);
        let retry = RetryPolicy::new(&RetryConfig::default());

        let fetchers = FetcherRegistry::new(vec![
            youtube.clone() as Arc<dyn Fetcher>,
            instagram.clone() as Arc<dyn Fetcher>,
        ]);
        let shared: Arc<dyn ObjectStorage> = storage.clone();
        let publisher = Publisher::new(
            shared,
            retry.clone(),
            DEFAULT_LINK_EXPIRY,
        );

        Harness {
            pipeline: Pipeline::new(fetchers, publisher, retry, limit, dir.path()),
            youtube,
            instagram,
            storage,
            dir,
        }
    }

    fn scratch_is_empty(dir: &tempfile::TempDir) -> bool {
        std::fs::read_dir(dir.path()).unwrap().next().is_none()
    }

    fn urls(list: &[&str]) -> Vec<String> {
        list.iter().map(|u| u.to_string()).collect()
    }

    #[tokio::test(start_paused = true)]
    async fn test_mixed_batch_keeps_order() {
        let h = harness(&[("xyz", Script::NotAVideo)], MemoryStorage::default(), None);
        let input = urls(&[
            "https://youtu.be/abc",
            "https://instagram.com/p/xyz/",
            "https://vimeo.com/123",
        ]);

        let records = h.pipeline.process_batch(&input).await;

        assert_eq!(records.len(), 3);
        match &records[0] {
            ResultRecord::Success { metadata } => {
                assert_eq!(metadata.source_platform, Platform::Youtube);
                assert_eq!(metadata.original_url, "https://youtu.be/abc");
                assert!(metadata.published_url.contains("videos/youtube/abc.mp4"));
            }
            other => panic!("expected success, got {other:?}"),
        }
        assert!(matches!(&records[1], ResultRecord::Error { kind, .. } if kind == "not_a_video"));
        assert!(
            matches!(&records[2], ResultRecord::Error { kind, url, .. } if kind == "unsupported_platform" && url == "https://vimeo.com/123")
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_order_follows_input_not_completion() {
        let h = harness(
            &[
                ("slow", Script::Ok { delay_ms: 500 }),
                ("fast", Script::Ok { delay_ms: 1 }),
                ("mid", Script::Ok { delay_ms: 100 }),
            ],
            MemoryStorage::default(),
            None,
        );
        let input = urls(&[
            "https://youtu.be/slow",
            "https://youtu.be/fast",
            "https://www.instagram.com/reel/mid/",
        ]);

        let records = h.pipeline.process_batch(&input).await;

        let order: Vec<&str> = records.iter().map(|r| r.url()).collect();
        assert_eq!(order, input.iter().map(String::as_str).collect::<Vec<_>>());
        assert!(records.iter().all(ResultRecord::is_success));
        // all three were in flight together
        assert_eq!(h.youtube.max_in_flight.load(Ordering::SeqCst), 2);
        assert_eq!(h.instagram.max_in_flight.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrency_limit() {
        let scripts: Vec<(String, Script)> = (0..6)
            .map(|i| (format!("v{i}"), Script::Ok { delay_ms: 50 }))
            .collect();
        let scripts: Vec<(&str, Script)> = scripts.iter().map(|(id, s)| (id.as_str(), *s)).collect();
        let h = harness(&scripts, MemoryStorage::default(), Some(2));
        let input: Vec<String> = (0..6).map(|i| format!("https://youtu.be/v{i}")).collect();

        let records = h.pipeline.process_batch(&input).await;

        assert_eq!(records.len(), 6);
        assert!(h.youtube.max_in_flight.load(Ordering::SeqCst) <= 2);
    }

    #[tokio::test]
    async fn test_unsupported_url_makes_no_calls() {
        let h = harness(&[], MemoryStorage::default(), None);

        let record = h.pipeline.process_one("https://vimeo.com/123").await;

        assert!(matches!(record, ResultRecord::Error { ref kind, .. } if kind == "unsupported_platform"));
        assert_eq!(h.youtube.total_calls.load(Ordering::SeqCst), 0);
        assert_eq!(h.instagram.total_calls.load(Ordering::SeqCst), 0);
        assert_eq!(h.storage.puts.load(Ordering::SeqCst), 0);
        assert!(scratch_is_empty(&h.dir));
    }

    #[tokio::test]
    async fn test_success_leaves_no_scratch_file() {
        let h = harness(&[], MemoryStorage::default(), None);

        let record = h.pipeline.process_one("https://youtu.be/abc").await;

        assert!(record.is_success());
        assert!(scratch_is_empty(&h.dir));
        assert!(h
            .storage
            .objects
            .lock()
            .unwrap()
            .contains_key("videos/youtube/abc.mp4"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_publish_failure_still_cleans_up() {
        let h = harness(&[], MemoryStorage::failing(usize::MAX), None);

        let record = h.pipeline.process_one("https://youtu.be/abc").await;

        assert!(matches!(record, ResultRecord::Error { ref kind, .. } if kind == "publish_failed"));
        assert_eq!(h.storage.puts.load(Ordering::SeqCst), 3);
        assert!(scratch_is_empty(&h.dir));
    }

    #[tokio::test(start_paused = true)]
    async fn test_fetch_recovers_on_third_attempt() {
        let h = harness(&[("flaky", Script::FailTimes(2))], MemoryStorage::default(), None);
        let start = tokio::time::Instant::now();

        let record = h.pipeline.process_one("https://youtu.be/flaky").await;

        assert!(record.is_success());
        assert_eq!(h.youtube.total_calls.load(Ordering::SeqCst), 3);
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_secs(4));
        assert!(elapsed <= Duration::from_secs(4 + 10));
    }

    #[tokio::test(start_paused = true)]
    async fn test_fetch_exhausted_carries_last_cause() {
        let h = harness(&[("dead", Script::FailTimes(3))], MemoryStorage::default(), None);

        let record = h.pipeline.process_one("https://youtu.be/dead").await;

        match record {
            ResultRecord::Error { url, error, kind } => {
                assert_eq!(url, "https://youtu.be/dead");
                assert_eq!(kind, "fetch_failed");
                assert!(error.contains("extraction error on attempt 3"));
            }
            other => panic!("expected error, got {other:?}"),
        }
        assert_eq!(h.storage.puts.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_not_a_video_is_retried_then_reported() {
        let h = harness(&[("photo", Script::NotAVideo)], MemoryStorage::default(), None);

        let record = h.pipeline.process_one("https://instagram.com/p/photo/").await;

        assert!(matches!(record, ResultRecord::Error { ref kind, .. } if kind == "not_a_video"));
        assert_eq!(h.instagram.total_calls.load(Ordering::SeqCst), 3);
        assert!(scratch_is_empty(&h.dir));
    }

    #[tokio::test(start_paused = true)]
    async fn test_duplicate_urls_do_not_share_scratch_files() {
        let h = harness(&[("abc", Script::Ok { delay_ms: 10 })], MemoryStorage::default(), None);
        let input = urls(&[
            "https://youtu.be/abc",
            "https://youtu.be/abc",
            "https://youtu.be/abc",
        ]);

        let records = h.pipeline.process_batch(&input).await;

        assert_eq!(records.len(), 3);
        assert!(records.iter().all(ResultRecord::is_success), "{records:?}");
        assert_eq!(h.youtube.max_in_flight.load(Ordering::SeqCst), 3);
        assert_eq!(h.storage.puts.load(Ordering::SeqCst), 3);
        let objects = h.storage.objects.lock().unwrap();
        assert_eq!(objects.len(), 1);
        assert_eq!(objects["videos/youtube/abc.mp4"].0, b"abc");
        drop(objects);
        assert!(scratch_is_empty(&h.dir));
    }

    #[tokio::test(start_paused = true)]
    async fn test_fetch_failure_cleans_up_task_directory() {
        let h = harness(&[("gone", Script::FailTimes(usize::MAX))], MemoryStorage::default(), None);

        let record = h.pipeline.process_one("https://youtu.be/gone").await;

        assert!(!record.is_success());
        assert!(scratch_is_empty(&h.dir));
    }

    #[tokio::test]
    async fn test_empty_batch() {
        let h = harness(&[], MemoryStorage::default(), None);
        assert!(h.pipeline.process_batch(&[]).await.is_empty());
    }
}
