//! Extraction fallback chain
//!
//! Walks the [`StrategyCatalog`] in order until one strategy succeeds. Every extractor
//! failure goes through [`classify_message`], a single keyword table:
//!
//! | class          | keywords (case-insensitive substrings)                                   | chain action |
//! |----------------|---------------------------------------------------------------------------|--------------|
//! | `RateLimited`  | `http error 429`, `too many requests`, `rate limit`, `rate-limit`          | next strategy |
//! | `Transient`    | `timed out`, `connection reset`, `temporarily`, `temporary failure`, `http error 5`, `service unavailable`, `remote end closed`, `incomplete read` | abort (retried by the executor) |
//! | `Unavailable`  | `private video`, `video unavailable`, `is unavailable`, `not available`, `available in your country`, `has been removed`, `been deleted`, `copyright`, `terminated` | abort, fatal |
//! | `Credential`   | `cookies database`, `could not copy`, `failed to decrypt`, `cookie file`   | next strategy, demote credential |
//! | `Challenge`    | `bot`, `captcha`, `sign in`, `verify`                                      | next strategy |
//! | `Unknown`      | anything else                                                              | abort, fatal |
//!
//! Rows are checked top to bottom, so "Private video. Sign in if you've been granted access"
//! is `Unavailable`, not `Challenge`. Unknown messages are fatal so real failures are never
//! retried as if they were transient.

use crate::config::ExtractorConfig;
use crate::error::{Error, Result};
use crate::extractor::{ExtractOptions, Extractor, MediaDescriptor};
use crate::strategy::{ExtractRequest, StrategyCatalog};
use rand::Rng;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

/// Classification of an extractor failure message
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FailureClass {
    /// Upstream throttling
    RateLimited,
    /// Connection-level hiccup
    Transient,
    /// Private, deleted, blocked
    Unavailable,
    /// The cookie source itself failed
    Credential,
    /// Bot detection or verification wall
    Challenge,
    /// No keyword matched
    Unknown,
}

impl FailureClass {
    /// True when the chain should try the next strategy
    pub fn falls_through(&self) -> bool {
        matches!(
            self,
            FailureClass::RateLimited | FailureClass::Credential | FailureClass::Challenge
        )
    }
}

const KEYWORDS: &[(FailureClass, &[&str])] = &[
    (
        FailureClass::RateLimited,
        &["http error 429", "too many requests", "rate limit", "rate-limit"],
    ),
    (
        FailureClass::Transient,
        &[
            "timed out",
            "connection reset",
            "temporarily",
            "temporary failure",
            "http error 5",
            "service unavailable",
            "remote end closed",
            "incomplete read",
        ],
    ),
    (
        FailureClass::Unavailable,
        &[
            "private video",
            "video unavailable",
            "is unavailable",
            "not available",
            "available in your country",
            "has been removed",
            "been deleted",
            "copyright",
            "terminated",
        ],
    ),
    (
        FailureClass::Credential,
        &[
            "cookies database",
            "could not copy",
            "failed to decrypt",
            "cookie file",
        ],
    ),
    (
        FailureClass::Challenge,
        &["bot", "captcha", "sign in", "verify"],
    ),
];

/// Classify a free-text extractor error message
pub fn classify_message(message: &str) -> FailureClass {
    let lower = message.to_lowercase();
    KEYWORDS
        .iter()
        .find(|(_, words)| words.iter().any(|w| lower.contains(w)))
        .map(|(class, _)| *class)
        .unwrap_or(FailureClass::Unknown)
}

/// Classify an error and convert raw extractor messages into typed variants
pub fn classify(error: Error) -> (FailureClass, Error) {
    match error {
        Error::Extractor(message) => {
            let class = classify_message(&message);
            let typed = match class {
                FailureClass::RateLimited => Error::RateLimited(message),
                FailureClass::Transient => Error::TransientUpstream(message),
                FailureClass::Unavailable => Error::UpstreamUnavailable(message),
                FailureClass::Challenge => Error::BotChallenge(message),
                FailureClass::Credential | FailureClass::Unknown => Error::Extractor(message),
            };
            (class, typed)
        }
        e @ Error::BotChallenge(_) => (FailureClass::Challenge, e),
        e @ Error::RateLimited(_) => (FailureClass::RateLimited, e),
        e @ Error::UpstreamUnavailable(_) => (FailureClass::Unavailable, e),
        e @ (Error::Timeout { .. } | Error::TransientUpstream(_)) => (FailureClass::Transient, e),
        e => (FailureClass::Unknown, e),
    }
}

/// Successful chain run
#[derive(Debug)]
pub struct ChainSuccess<T> {
    /// Extractor result
    pub value: T,
    /// Catalog position of the strategy that worked
    pub strategy_index: usize,
    /// Extractor invocations made, including the successful one
    pub invocations: usize,
}

/// Runs extractor calls through the strategy catalog
#[derive(Clone)]
pub struct FallbackChain {
    extractor: Arc<dyn Extractor>,
    catalog: Arc<StrategyCatalog>,
    jitter_min_ms: u64,
    jitter_max_ms: u64,
}

impl FallbackChain {
    /// Chain over a catalog snapshot
    pub fn new(
        extractor: Arc<dyn Extractor>,
        catalog: Arc<StrategyCatalog>,
        config: &ExtractorConfig,
    ) -> Self {
        Self {
            extractor,
            catalog,
            jitter_min_ms: config.strategy_jitter_min_ms,
            jitter_max_ms: config.strategy_jitter_max_ms.max(config.strategy_jitter_min_ms),
        }
    }

    /// Resolve metadata
    pub async fn resolve(
        &self,
        url: &str,
        request: &ExtractRequest,
        attempt_timeout: Duration,
    ) -> Result<ChainSuccess<MediaDescriptor>> {
        let extractor = &self.extractor;
        self.run(url, request, attempt_timeout, |options| async move {
            extractor.resolve(url, &options).await
        })
        .await
    }

    /// Download one item into `output_dir`
    pub async fn download(
        &self,
        url: &str,
        request: &ExtractRequest,
        output_dir: &Path,
        attempt_timeout: Duration,
    ) -> Result<ChainSuccess<PathBuf>> {
        let extractor = &self.extractor;
        self.run(url, request, attempt_timeout, |options| async move {
            extractor.download(url, &options, output_dir).await
        })
        .await
    }

    async fn run<T, F, Fut>(
        &self,
        url: &str,
        request: &ExtractRequest,
        attempt_timeout: Duration,
        mut attempt: F,
    ) -> Result<ChainSuccess<T>>
    where
        F: FnMut(ExtractOptions) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut invocations = 0;
        let mut last_error = None;

        for index in 0..self.catalog.len() {
            let Some(plan) = self.catalog.plan(index, request) else {
                continue;
            };

            if invocations > 0 {
                self.pause_between_strategies().await;
            }
            invocations += 1;

            tracing::debug!(url = %url, strategy = plan.label, index, "trying strategy");

            let result = match tokio::time::timeout(attempt_timeout, attempt(plan.options)).await {
                Ok(result) => result,
                Err(_) => Err(Error::Timeout {
                    after: attempt_timeout,
                }),
            };

            let error = match result {
                Ok(value) => {
                    if let Some(ci) = plan.credential_index {
                        self.catalog.credentials().record_success(ci);
                    }
                    if index > 0 {
                        tracing::info!(url = %url, strategy = plan.label, index, "fallback strategy succeeded");
                    }
                    return Ok(ChainSuccess {
                        value,
                        strategy_index: index,
                        invocations,
                    });
                }
                Err(e) => e,
            };

            let (class, error) = classify(error);

            if let Some(ci) = plan.credential_index
                && matches!(class, FailureClass::Credential | FailureClass::Challenge)
            {
                self.catalog.credentials().record_failure(ci);
            }

            if !class.falls_through() {
                tracing::debug!(url = %url, strategy = plan.label, error = %error, ?class, "fatal extractor failure");
                return Err(error);
            }

            tracing::warn!(url = %url, strategy = plan.label, error = %error, ?class, "strategy failed, falling back");
            last_error = Some(error);
        }

        Err(last_error
            .unwrap_or_else(|| Error::Extractor("no extraction strategy available".into())))
    }

    async fn pause_between_strategies(&self) {
        if self.jitter_max_ms == 0 {
            return;
        }
        let ms = rand::thread_rng().gen_range(self.jitter_min_ms..=self.jitter_max_ms);
        tokio::time::sleep(Duration::from_millis(ms)).await;
    }
}
