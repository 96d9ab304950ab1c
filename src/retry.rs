use crate::config::RetryConfig;
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tracing::warn;

/// Decides whether a failed attempt is worth another try.
pub type RetryClassifier = fn(&anyhow::Error) -> bool;

/// Retries every failure, permanent or not.
pub fn retry_all(_error: &anyhow::Error) -> bool {
    true
}

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    max_attempts: usize,
    initial_backoff: Duration,
    max_backoff: Duration,
    classifier: RetryClassifier,
}

#[derive(Debug, Clone)]
pub struct RetryOutcome<T> {
    pub result: T,
    pub attempts: usize,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(&RetryConfig::default())
    }
}

impl RetryPolicy {
    pub fn new(config: &RetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            initial_backoff: Duration::from_secs(config.initial_backoff_secs),
            max_backoff: Duration::from_secs(
                config.max_backoff_secs.max(config.initial_backoff_secs),
            ),
            classifier: retry_all,
        }
    }

    pub fn with_classifier(mut self, classifier: RetryClassifier) -> Self {
        self.classifier = classifier;
        self
    }

    pub fn max_attempts(&self) -> usize {
        self.max_attempts
    }

    /// Wait before the attempt following `failed_attempts` failures:
    /// `initial * 2^(n-1)`, capped at `max_backoff`.
    pub fn delay_for_attempt(&self, failed_attempts: usize) -> Duration {
        if failed_attempts == 0 {
            return Duration::ZERO;
        }
        let exponent = (failed_attempts - 1).min(31) as u32;
        self.initial_backoff
            .saturating_mul(2u32.saturating_pow(exponent))
            .min(self.max_backoff)
    }

    pub async fn run<F, Fut, T>(
        &self,
        label: &str,
        mut operation: F,
    ) -> anyhow::Result<RetryOutcome<T>>
    where
        F: FnMut(usize) -> Fut,
        Fut: Future<Output = anyhow::Result<T>>,
    {
        let mut attempt = 0usize;
        loop {
            match operation(attempt).await {
                Ok(result) => {
                    return Ok(RetryOutcome {
                        result,
                        attempts: attempt + 1,
                    });
                }
                Err(error) => {
                    attempt += 1;
                    let cause = format!("{error:#}");
                    if attempt >= self.max_attempts || !(self.classifier)(&error) {
                        warn!(
                            attempt,
                            max_attempts = self.max_attempts,
                            error = %cause,
                            "{} failed, giving up",
                            label
                        );
                        return Err(error);
                    }
                    let delay = self.delay_for_attempt(attempt);
                    warn!(
                        attempt,
                        max_attempts = self.max_attempts,
                        delay_secs = delay.as_secs(),
                        error = %cause,
                        "{} failed, retrying",
                        label
                    );
                    if !delay.is_zero() {
                        sleep(delay).await;
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use tokio::time::Instant;

    #[test]
    fn test_backoff_schedule() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_for_attempt(0), Duration::ZERO);
        assert_eq!(policy.delay_for_attempt(1), Duration::from_secs(4));
        assert_eq!(policy.delay_for_attempt(2), Duration::from_secs(8));
        assert_eq!(policy.delay_for_attempt(3), Duration::from_secs(10));
        assert_eq!(policy.delay_for_attempt(40), Duration::from_secs(10));
    }

    #[tokio::test(start_paused = true)]
    async fn test_succeeds_on_third_attempt() {
        let policy = RetryPolicy::default();
        let calls = Arc::new(AtomicUsize::new(0));
        let start = Instant::now();

        let counter = Arc::clone(&calls);
        let outcome = policy
            .run("flaky", move |_| {
                let counter = Arc::clone(&counter);
                async move {
                    if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                        anyhow::bail!("transient")
                    }
                    Ok("done")
                }
            })
            .await
            .unwrap();

        assert_eq!(outcome.result, "done");
        assert_eq!(outcome.attempts, 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);

        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_secs(4));
        assert!(elapsed <= Duration::from_secs(4 + 10));
    }

    #[tokio::test(start_paused = true)]
    async fn test_gives_up_with_last_error() {
        let policy = RetryPolicy::default();
        let calls = Arc::new(AtomicUsize::new(0));

        let counter = Arc::clone(&calls);
        let result: anyhow::Result<RetryOutcome<()>> = policy
            .run("broken", move |attempt| {
                counter.fetch_add(1, Ordering::SeqCst);
                async move { Err(anyhow::anyhow!("failure #{}", attempt + 1)) }
            })
            .await;

        let error = result.unwrap_err();
        assert_eq!(error.to_string(), "failure #3");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_classifier_stops_on_terminal_error() {
        fn never(_: &anyhow::Error) -> bool {
            false
        }
        let policy = RetryPolicy::default().with_classifier(never);
        let calls = Arc::new(AtomicUsize::new(0));
        let start = Instant::now();

        let counter = Arc::clone(&calls);
        let result: anyhow::Result<RetryOutcome<()>> = policy
            .run("terminal", move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
                async move { Err(anyhow::anyhow!("permanent")) }
            })
            .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[test]
    fn test_zero_attempts_is_clamped() {
        let policy = RetryPolicy::new(&RetryConfig {
            max_attempts: 0,
            initial_backoff_secs: 1,
            max_backoff_secs: 2,
        });
        assert_eq!(policy.max_attempts(), 1);
    }
}
