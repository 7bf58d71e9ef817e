//! Retry logic with exponential backoff
//!
//! Registry queries go over the network and fail transiently; they are
//! retried here before the orchestrator sees an error.

use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;

/// Options for retry behavior
#[derive(Debug, Clone, PartialEq)]
pub struct RetryOptions {
    /// Maximum number of attempts (including the first)
    pub max_attempts: u32,
    /// Initial delay before first retry
    pub initial_delay: Duration,
    /// Maximum delay between retries
    pub max_delay: Duration,
    /// Backoff multiplier for exponential backoff
    pub backoff_multiplier: f64,
}

impl Default for RetryOptions {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            backoff_multiplier: 2.0,
        }
    }
}

/// Error message fragments that indicate a transient failure
const RETRYABLE_PATTERNS: &[&str] = &[
    "timed out",
    "timeout",
    "connection refused",
    "connection reset",
    "network",
    "spurious",
    "failed to get",
    "503",
    "502",
    "dns error",
];

/// Retry manager for executing operations with exponential backoff
///
/// # Examples
///
/// ```no_run
/// use workspace_publisher::core::{RetryManager, RetryOptions};
///
/// #[tokio::main]
/// async fn main() -> anyhow::Result<()> {
///     let manager = RetryManager::new(RetryOptions::default());
///
///     let version = manager.retry(|| async {
///         Ok::<_, anyhow::Error>(Some("1.0.0".to_string()))
///     }).await?;
///
///     assert_eq!(version.as_deref(), Some("1.0.0"));
///     Ok(())
/// }
/// ```
#[derive(Debug, Clone)]
pub struct RetryManager {
    options: RetryOptions,
}

impl RetryManager {
    pub fn new(options: RetryOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &RetryOptions {
        &self.options
    }

    /// Execute the given async operation with retry logic
    ///
    /// Non-retryable errors are returned immediately; retryable ones are
    /// retried until `max_attempts` is reached.
    pub async fn retry<F, Fut, T, E>(&self, mut operation: F) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: std::fmt::Display,
    {
        let mut delay = self.options.initial_delay;
        let mut attempt = 1;

        loop {
            match operation().await {
                Ok(result) => return Ok(result),
                Err(error) => {
                    if !Self::is_retryable_error(&error) || attempt >= self.options.max_attempts {
                        return Err(error);
                    }

                    tracing::debug!(
                        "attempt {}/{} failed, retrying in {:?}: {}",
                        attempt,
                        self.options.max_attempts,
                        delay,
                        error
                    );
                    sleep(delay).await;

                    delay = Duration::try_from_secs_f64(
                        delay.as_secs_f64() * self.options.backoff_multiplier,
                    )
                    .unwrap_or(self.options.max_delay)
                    .min(self.options.max_delay);
                    attempt += 1;
                }
            }
        }
    }

    /// Check if an error should be retried
    fn is_retryable_error<E: std::fmt::Display>(error: &E) -> bool {
        let error_msg = error.to_string().to_lowercase();

        RETRYABLE_PATTERNS
            .iter()
            .any(|pattern| error_msg.contains(pattern))
    }
}
