//! Retry logic with exponential backoff
//!
//! Task attempts that fail with a transient error are retried in a bounded loop.
//! The delay starts at `initial_delay`, is multiplied by `backoff_multiplier` after
//! every failure, and is capped at `max_delay`. Optional jitter spreads retries of
//! concurrent tasks so they do not hit the upstream in lockstep.
//!
//! # Example
//!
//! ```no_run
//! use media_dl::retry::{IsRetryable, download_with_retry};
//! use media_dl::config::RetryConfig;
//!
//! #[derive(Debug)]
//! enum MyError {
//!     Transient,
//!     Permanent,
//! }
//!
//! impl std::fmt::Display for MyError {
//!     fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
//!         write!(f, "{self:?}")
//!     }
//! }
//!
//! impl IsRetryable for MyError {
//!     fn is_retryable(&self) -> bool {
//!         matches!(self, MyError::Transient)
//!     }
//! }
//!
//! # async fn example() -> Result<(), MyError> {
//! let config = RetryConfig::default();
//! let result = download_with_retry(&config, || async {
//!     // Your operation here
//!     Ok::<_, MyError>(())
//! }).await?;
//! # Ok(())
//! # }
//! ```

use crate::config::RetryConfig;
use crate::error::Error;
use rand::Rng;
use std::future::Future;
use std::time::Duration;

/// Trait for errors that can be classified as retryable or not
///
/// Transient failures (timeouts, connection resets) should return `true`.
/// Fatal failures (private content, malformed input, oversized output) should return `false`.
pub trait IsRetryable {
    /// Returns true if the error is transient and the operation should be retried
    fn is_retryable(&self) -> bool;
}

impl IsRetryable for Error {
    fn is_retryable(&self) -> bool {
        match self {
            // A task that ran out of time gets another attempt
            Error::Timeout { .. } => true,
            // Connection-level hiccups reported by the extractor
            Error::TransientUpstream(_) => true,
            Error::Network(e) => e.is_timeout() || e.is_connect(),
            Error::Io(e) => matches!(
                e.kind(),
                std::io::ErrorKind::TimedOut
                    | std::io::ErrorKind::ConnectionRefused
                    | std::io::ErrorKind::ConnectionReset
                    | std::io::ErrorKind::ConnectionAborted
                    | std::io::ErrorKind::NotConnected
                    | std::io::ErrorKind::BrokenPipe
                    | std::io::ErrorKind::Interrupted
            ),
            // Exhausted strategy chains are retryable by the caller, not by the executor
            Error::RateLimited(_) | Error::BotChallenge(_) => false,
            Error::UpstreamUnavailable(_) => false,
            Error::InvalidInput(_) => false,
            Error::SizeExceeded { .. } => false,
            Error::Storage(_) => false,
            // Unclassified extractor output is fatal
            Error::Extractor(_) => false,
            Error::Config { .. } => false,
            Error::Serialization(_) => false,
            Error::NotFound(_) => false,
            Error::ShuttingDown => false,
            Error::ExternalTool(_) => false,
            Error::NotSupported(_) => false,
            Error::Thumbnail(_) => false,
            Error::ApiServerError(_) => false,
            Error::Other(_) => false,
        }
    }
}

/// Execute an async operation with exponential backoff retry logic
///
/// Returns the successful result or the last error after all retry attempts are exhausted.
/// At most `config.max_attempts + 1` calls to `operation` are made.
pub async fn download_with_retry<F, Fut, T, E>(config: &RetryConfig, operation: F) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: IsRetryable + std::fmt::Display,
{
    download_with_retry_observed(config, |_, _, _| {}, operation).await
}

/// Same as [`download_with_retry`], calling `on_retry(attempt, error, delay)` before each backoff sleep
///
/// `attempt` is 1 for the first retry.
pub async fn download_with_retry_observed<F, Fut, T, E, R>(
    config: &RetryConfig,
    mut on_retry: R,
    mut operation: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: IsRetryable + std::fmt::Display,
    R: FnMut(u32, &E, Duration),
{
    let mut attempt = 0;

    loop {
        match operation().await {
            Ok(result) => {
                if attempt > 0 {
                    tracing::info!(attempts = attempt + 1, "Operation succeeded after retry");
                }
                return Ok(result);
            }
            Err(e) if e.is_retryable() && attempt < config.max_attempts => {
                let delay = backoff_delay(config, attempt);
                attempt += 1;

                tracing::warn!(
                    error = %e,
                    attempt = attempt,
                    max_attempts = config.max_attempts,
                    delay_ms = delay.as_millis(),
                    "Operation failed, retrying"
                );

                let jittered_delay = if config.jitter {
                    add_jitter(delay)
                } else {
                    delay
                };

                on_retry(attempt, &e, jittered_delay);
                tokio::time::sleep(jittered_delay).await;
            }
            Err(e) => {
                if e.is_retryable() {
                    tracing::error!(
                        error = %e,
                        attempts = attempt + 1,
                        "Operation failed after all retry attempts exhausted"
                    );
                } else {
                    tracing::debug!(error = %e, "Operation failed with non-retryable error");
                }
                return Err(e);
            }
        }
    }
}

/// Un-jittered delay before retry number `retries_so_far + 1`
///
/// `initial_delay × multiplier^retries_so_far`, capped at `max_delay`.
pub fn backoff_delay(config: &RetryConfig, retries_so_far: u32) -> Duration {
    let factor = config
        .backoff_multiplier
        .powi(i32::try_from(retries_so_far).unwrap_or(i32::MAX));
    let secs = config.initial_delay.as_secs_f64() * factor;
    if !secs.is_finite() || secs >= config.max_delay.as_secs_f64() {
        return config.max_delay;
    }
    Duration::from_secs_f64(secs)
}

/// Add random jitter to a delay to prevent thundering herd
///
/// The result is uniformly distributed between `delay` and `2 * delay`.
fn add_jitter(delay: Duration) -> Duration {
    let mut rng = rand::thread_rng();
    let jitter_factor: f64 = rng.gen_range(0.0..=1.0);
    Duration::from_secs_f64(delay.as_secs_f64() * (1.0 + jitter_factor))
}
