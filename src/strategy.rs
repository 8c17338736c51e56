//! Strategy catalog and credential ranking
//!
//! A [`StrategyCatalog`] is built once at startup (and again on an explicit re-probe) and is
//! read-only afterwards. The fixed preference order is:
//!
//! 1. credentialed, rotated user-agent, requested selector
//! 2. uncredentialed, rotated user-agent, requested selector
//! 3. credentialed, simplified selector
//! 4. uncredentialed, simplified selector
//!
//! Credentialed entries are left out when the startup probe found no usable cookie source.
//! The only mutable state is the index of the preferred credential source inside
//! [`CredentialRanking`], an atomic that moves on success and on failure of the preferred source.

use crate::config::ExtractorConfig;
use crate::extractor::{ExtractOptions, Extractor};
use crate::format::{PostProcess, SelectorPair};
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

/// Where the extractor takes cookies from
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum CredentialSource {
    /// No cookies
    None,
    /// A named browser's cookie store
    Browser(String),
    /// A Netscape-format cookie file
    CookieFile(PathBuf),
}

impl std::fmt::Display for CredentialSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CredentialSource::None => write!(f, "none"),
            CredentialSource::Browser(name) => write!(f, "browser:{name}"),
            CredentialSource::CookieFile(path) => write!(f, "cookie-file:{}", path.display()),
        }
    }
}

/// Which selector of a [`SelectorPair`] a strategy uses
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SelectorVariant {
    /// The selector honoring the requested quality
    Requested,
    /// The simplified fallback selector
    Simplified,
}

/// One catalog entry
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Strategy {
    /// Use the preferred credential source
    pub credentialed: bool,
    /// Selector variant
    pub selector: SelectorVariant,
}

impl Strategy {
    /// Short label for logs
    pub fn label(&self) -> &'static str {
        match (self.credentialed, self.selector) {
            (true, SelectorVariant::Requested) => "credentialed/requested",
            (false, SelectorVariant::Requested) => "anonymous/requested",
            (true, SelectorVariant::Simplified) => "credentialed/simplified",
            (false, SelectorVariant::Simplified) => "anonymous/simplified",
        }
    }
}

/// What to extract, independent of the strategy used
#[derive(Clone, Debug)]
pub struct ExtractRequest {
    /// Requested and simplified selectors
    pub selectors: SelectorPair,
    /// Transcoder hook
    pub postprocess: PostProcess,
    /// Flat playlist resolution limit
    pub playlist_limit: Option<usize>,
}

/// Extractor options for one strategy, plus the credential index used
#[derive(Clone, Debug)]
pub struct AttemptPlan {
    /// Catalog position (0-based)
    pub strategy_index: usize,
    /// Strategy label
    pub label: &'static str,
    /// Position of the credential source in the ranking, if one was used
    pub credential_index: Option<usize>,
    /// Options handed to the extractor
    pub options: ExtractOptions,
}

/// Usable credential sources, most preferred first
///
/// Produced once by [`CredentialRanking::probe`]; never re-probed per request.
#[derive(Debug, Default)]
pub struct CredentialRanking {
    sources: Vec<CredentialSource>,
    preferred: AtomicUsize,
}

impl CredentialRanking {
    /// Ranking over already-verified sources
    pub fn new(sources: Vec<CredentialSource>) -> Self {
        Self {
            sources,
            preferred: AtomicUsize::new(0),
        }
    }

    /// Probe the configured cookie file and browsers
    ///
    /// The cookie file is ranked first, then browsers in configured order.
    pub async fn probe(config: &ExtractorConfig, extractor: &dyn Extractor) -> Self {
        let mut candidates = Vec::new();
        if let Some(path) = &config.cookie_file {
            candidates.push(CredentialSource::CookieFile(path.clone()));
        }
        candidates.extend(
            config
                .cookie_browsers
                .iter()
                .map(|b| CredentialSource::Browser(b.clone())),
        );

        let mut usable = Vec::new();
        for candidate in candidates {
            if extractor.probe_credential(&candidate).await {
                tracing::info!(source = %candidate, "credential source usable");
                usable.push(candidate);
            } else {
                tracing::debug!(source = %candidate, "credential source unusable");
            }
        }

        if usable.is_empty() {
            tracing::warn!("no usable credential source; credentialed strategies disabled");
        }
        Self::new(usable)
    }

    /// True when no source is usable
    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    /// All usable sources in rank order
    pub fn sources(&self) -> &[CredentialSource] {
        &self.sources
    }

    /// The source to try first, with its index
    pub fn current(&self) -> Option<(usize, &CredentialSource)> {
        if self.sources.is_empty() {
            return None;
        }
        let index = self.preferred.load(Ordering::Acquire) % self.sources.len();
        Some((index, &self.sources[index]))
    }

    /// Remember a source that worked so later calls try it first
    pub fn record_success(&self, index: usize) {
        if index < self.sources.len() {
            self.preferred.store(index, Ordering::Release);
        }
    }

    /// Demote the preferred source after a failure so the next call re-verifies with another one
    pub fn record_failure(&self, index: usize) {
        if self.sources.len() < 2 {
            return;
        }
        let next = (index + 1) % self.sources.len();
        if self
            .preferred
            .compare_exchange(index, next, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
        {
            tracing::debug!(
                failed = %self.sources[index],
                next = %self.sources[next],
                "preferred credential source demoted"
            );
        }
    }
}

/// Ordered list of extraction strategies
#[derive(Debug)]
pub struct StrategyCatalog {
    strategies: Vec<Strategy>,
    credentials: CredentialRanking,
    user_agents: Vec<String>,
    headers: BTreeMap<String, String>,
    retries: u32,
    socket_timeout: Duration,
}

impl StrategyCatalog {
    /// Build the catalog for the given credential ranking
    pub fn new(config: &ExtractorConfig, credentials: CredentialRanking) -> Self {
        let has_credentials = !credentials.is_empty();
        let strategies = [
            (true, SelectorVariant::Requested),
            (false, SelectorVariant::Requested),
            (true, SelectorVariant::Simplified),
            (false, SelectorVariant::Simplified),
        ]
        .into_iter()
        .filter(|(credentialed, _)| has_credentials || !credentialed)
        .map(|(credentialed, selector)| Strategy {
            credentialed,
            selector,
        })
        .collect();

        Self {
            strategies,
            credentials,
            user_agents: config.user_agents.clone(),
            headers: config.headers.clone(),
            retries: config.retries,
            socket_timeout: config.socket_timeout,
        }
    }

    /// Strategies in preference order
    pub fn strategies(&self) -> &[Strategy] {
        &self.strategies
    }

    /// Number of strategies (upper bound on extractor invocations per chain run)
    pub fn len(&self) -> usize {
        self.strategies.len()
    }

    /// True when the catalog is empty
    pub fn is_empty(&self) -> bool {
        self.strategies.is_empty()
    }

    /// Credential ranking backing the credentialed strategies
    pub fn credentials(&self) -> &CredentialRanking {
        &self.credentials
    }

    /// Extractor options for one strategy
    ///
    /// Picks a random user-agent from the configured pool without touching shared state.
    pub fn plan(&self, strategy_index: usize, request: &ExtractRequest) -> Option<AttemptPlan> {
        let strategy = self.strategies.get(strategy_index)?;

        let (credential_index, credential) = if strategy.credentialed {
            let (index, source) = self.credentials.current()?;
            (Some(index), source.clone())
        } else {
            (None, CredentialSource::None)
        };

        let selector = match strategy.selector {
            SelectorVariant::Requested => request.selectors.requested.clone(),
            SelectorVariant::Simplified => request.selectors.simplified.clone(),
        };

        Some(AttemptPlan {
            strategy_index,
            label: strategy.label(),
            credential_index,
            options: ExtractOptions {
                selector,
                credential,
                user_agent: self.rotate_user_agent(),
                headers: self.headers.clone(),
                retries: self.retries,
                socket_timeout: self.socket_timeout,
                postprocess: request.postprocess.clone(),
                playlist_limit: request.playlist_limit,
            },
        })
    }

    fn rotate_user_agent(&self) -> Option<String> {
        self.user_agents.choose(&mut rand::thread_rng()).cloned()
    }
}
