//! Retry, backoff and per-call timeouts around a [`RemoteApi`].

use crate::client::{ListQuery, RemoteApi};
use crate::error::{RemoteError, RemoteResult};
use async_trait::async_trait;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use storesync_core::Record;
use tracing::{debug, warn};

/// Configuration for retry behavior.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryConfig {
    /// Maximum number of attempts, including the first.
    pub max_attempts: u32,
    /// Initial delay between retries.
    pub initial_delay: Duration,
    /// Maximum delay between retries.
    pub max_delay: Duration,
    /// Multiplier for exponential backoff.
    pub backoff_multiplier: f64,
    /// Whether to add jitter to delays.
    pub add_jitter: bool,
}

impl RetryConfig {
    /// Creates a new retry configuration.
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
            backoff_multiplier: 2.0,
            add_jitter: true,
        }
    }

    /// Creates a configuration with no retries.
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            initial_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            backoff_multiplier: 1.0,
            add_jitter: false,
        }
    }

    /// Sets the initial delay.
    pub fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    /// Sets the maximum delay.
    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Sets the backoff multiplier.
    pub fn with_backoff_multiplier(mut self, multiplier: f64) -> Self {
        self.backoff_multiplier = multiplier;
        self
    }

    /// Enables or disables jitter.
    pub fn with_jitter(mut self, jitter: bool) -> Self {
        self.add_jitter = jitter;
        self
    }

    /// Calculates the backoff delay before a given attempt (0-indexed).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }

        let base_delay = self.initial_delay.as_secs_f64()
            * self.backoff_multiplier.powi(attempt.saturating_sub(1) as i32);

        let delay_secs = base_delay.min(self.max_delay.as_secs_f64());

        if self.add_jitter {
            // Add up to 25% jitter
            let jitter = delay_secs * 0.25 * pseudo_jitter();
            Duration::from_secs_f64(delay_secs + jitter)
        } else {
            Duration::from_secs_f64(delay_secs)
        }
    }

    /// Delay before retrying after `error` on the given attempt.
    ///
    /// A rate limit's `retry_after` replaces the computed backoff; both are
    /// capped at `max_delay`.
    pub fn delay_after(&self, error: &RemoteError, attempt: u32) -> Duration {
        match error {
            RemoteError::RateLimited { retry_after } => (*retry_after).min(self.max_delay),
            _ => self.delay_for_attempt(attempt),
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self::new(3)
    }
}

/// Cheap time-derived jitter in `[0, 1)`.
fn pseudo_jitter() -> f64 {
    use std::time::SystemTime;
    let nanos = SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .unwrap_or_default()
        .subsec_nanos();
    (nanos % 1000) as f64 / 1000.0
}

/// Wraps a [`RemoteApi`] with a per-call timeout and bounded retries of
/// transient failures.
///
/// Creates are retried only after a rate limit, since a timed-out or failed
/// create may still have been applied remotely.
pub struct RetryingRemote<R> {
    inner: R,
    retry: RetryConfig,
    timeout: Duration,
    retries: AtomicU64,
}

impl<R: RemoteApi> RetryingRemote<R> {
    /// Wraps `inner`.
    pub fn new(inner: R, retry: RetryConfig, timeout: Duration) -> Self {
        Self {
            inner,
            retry,
            timeout,
            retries: AtomicU64::new(0),
        }
    }

    /// Total retries performed so far.
    pub fn retries(&self) -> u64 {
        self.retries.load(Ordering::SeqCst)
    }

    /// The wrapped client.
    pub fn inner(&self) -> &R {
        &self.inner
    }

    async fn call<T, F, Fut>(
        &self,
        op: &'static str,
        resource: &str,
        idempotent: bool,
        f: F,
    ) -> RemoteResult<T>
    where
        F: Fn() -> Fut + Send,
        Fut: Future<Output = RemoteResult<T>> + Send,
        T: Send,
    {
        let max_attempts = self.retry.max_attempts.max(1);
        let mut attempt = 0;
        loop {
            let outcome = match tokio::time::timeout(self.timeout, f()).await {
                Ok(result) => result,
                Err(_) => Err(RemoteError::Timeout),
            };
            let error = match outcome {
                Ok(value) => return Ok(value),
                Err(e) => e,
            };

            attempt += 1;
            let retryable = if idempotent {
                error.is_retryable()
            } else {
                matches!(error, RemoteError::RateLimited { .. })
            };
            if !retryable || attempt >= max_attempts {
                debug!(op, resource, attempt, error = %error, "remote call failed");
                return Err(error);
            }

            let delay = self.retry.delay_after(&error, attempt);
            warn!(
                op,
                resource,
                attempt,
                delay_ms = delay.as_millis() as u64,
                error = %error,
                "remote call failed, retrying"
            );
            self.retries.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(delay).await;
        }
    }
}

#[async_trait]
impl<R: RemoteApi> RemoteApi for RetryingRemote<R> {
    async fn get(&self, resource: &str, id: &str) -> RemoteResult<Record> {
        self.call("get", resource, true, || self.inner.get(resource, id))
            .await
    }

    async fn list(&self, resource: &str, query: &ListQuery) -> RemoteResult<Vec<Record>> {
        self.call("list", resource, true, || self.inner.list(resource, query))
            .await
    }

    async fn create(&self, resource: &str, record: &Record) -> RemoteResult<String> {
        self.call("create", resource, false, || self.inner.create(resource, record))
            .await
    }

    async fn update(&self, resource: &str, id: &str, fields: &Record) -> RemoteResult<()> {
        self.call("update", resource, true, || self.inner.update(resource, id, fields))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{MockOp, MockRemote};

    fn fast_retry() -> RetryConfig {
        RetryConfig::new(3)
            .with_initial_delay(Duration::from_millis(100))
            .with_jitter(false)
    }

    #[test]
    fn retry_config_no_retry() {
        let config = RetryConfig::no_retry();
        assert_eq!(config.max_attempts, 1);
    }

    #[test]
    fn retry_delay_calculation() {
        let config = RetryConfig::new(5)
            .with_initial_delay(Duration::from_millis(100))
            .with_backoff_multiplier(2.0);

        assert_eq!(config.delay_for_attempt(0), Duration::ZERO);

        // Jitter makes exact values unpredictable, but bounds hold
        let delay1 = config.delay_for_attempt(1);
        assert!(delay1 >= Duration::from_millis(100));
        assert!(delay1 <= Duration::from_millis(150));

        let delay2 = config.delay_for_attempt(2);
        assert!(delay2 >= Duration::from_millis(200));
    }

    #[test]
    fn rate_limit_delay_is_capped() {
        let config = RetryConfig::new(3).with_max_delay(Duration::from_secs(10));
        let err = RemoteError::RateLimited {
            retry_after: Duration::from_secs(30),
        };
        assert_eq!(config.delay_after(&err, 1), Duration::from_secs(10));
    }

    #[tokio::test(start_paused = true)]
    async fn retries_transient_then_succeeds() {
        let mock = MockRemote::new();
        mock.insert("products", "7", Record::new().with("name", "Mug"));
        mock.fail_next(MockOp::Get, RemoteError::Unavailable("502".into()));

        let remote = RetryingRemote::new(mock, fast_retry(), Duration::from_secs(5));
        let record = remote.get("products", "7").await.unwrap();
        assert_eq!(record.get_str("name"), Some("Mug"));
        assert_eq!(remote.retries(), 1);
        assert_eq!(remote.inner().calls(MockOp::Get), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn honors_retry_after() {
        let mock = MockRemote::new();
        mock.insert("products", "7", Record::new());
        mock.fail_next(
            MockOp::Update,
            RemoteError::RateLimited {
                retry_after: Duration::from_secs(30),
            },
        );
        let remote = RetryingRemote::new(mock, fast_retry(), Duration::from_secs(5));

        let start = tokio::time::Instant::now();
        remote
            .update("products", "7", &Record::new().with("stock_quantity", 3))
            .await
            .unwrap();
        assert!(start.elapsed() >= Duration::from_secs(30));
        assert_eq!(remote.retries(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn permanent_errors_are_not_retried() {
        let mock = MockRemote::new();
        mock.fail_next(MockOp::Get, RemoteError::Auth("bad key".into()));
        let remote = RetryingRemote::new(mock, fast_retry(), Duration::from_secs(5));

        assert!(matches!(remote.get("products", "1").await, Err(RemoteError::Auth(_))));
        assert_eq!(remote.retries(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn retries_exhaust() {
        let mock = MockRemote::new();
        for _ in 0..3 {
            mock.fail_next(MockOp::Get, RemoteError::Unavailable("down".into()));
        }
        let remote = RetryingRemote::new(mock, fast_retry(), Duration::from_secs(5));
        assert!(matches!(remote.get("products", "1").await, Err(RemoteError::Unavailable(_))));
        assert_eq!(remote.retries(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn slow_calls_time_out() {
        let mock = MockRemote::new().with_latency(Duration::from_secs(60));
        mock.insert("products", "1", Record::new());
        let remote = RetryingRemote::new(mock, RetryConfig::no_retry(), Duration::from_secs(5));
        assert_eq!(remote.get("products", "1").await, Err(RemoteError::Timeout));
    }

    #[tokio::test(start_paused = true)]
    async fn create_not_retried_after_timeout() {
        let mock = MockRemote::new();
        mock.fail_next(MockOp::Create, RemoteError::Timeout);
        let remote = RetryingRemote::new(mock, fast_retry(), Duration::from_secs(5));
        assert_eq!(
            remote.create("products", &Record::new()).await,
            Err(RemoteError::Timeout)
        );
        assert_eq!(remote.retries(), 0);
    }
}
