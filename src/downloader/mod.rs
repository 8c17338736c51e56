//! Core downloader implementation split into focused submodules.
//!
//! The `MediaDownloader` struct and its methods are organized by domain:
//! - [`jobs`] - Job submission, expansion into tasks, aggregation and the job registry
//! - [`task`] - Per-task execution: worker pool admission, retry, workspace lifecycle
//! - [`lifecycle`] - Shutdown coordination
//! - [`services`] - Background service starters (retention sweep, API server)

mod jobs;
mod lifecycle;
mod services;
mod task;

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
pub(crate) mod test_helpers;
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests;

use crate::config::Config;
use crate::error::{Error, Result};
use crate::extractor::{Extractor, UnavailableExtractor, YtDlpExtractor};
use crate::fallback::FallbackChain;
use crate::packager::ArtifactPackager;
use crate::strategy::{CredentialRanking, StrategyCatalog};
use crate::thumbnails::ThumbnailCache;
use crate::types::{Capabilities, Event, JobId, JobRecord, OutputFormat};
use crate::workspace::WorkspaceManager;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize};
use tokio::sync::{RwLock, Semaphore, broadcast};
use tokio_util::sync::CancellationToken;

/// Worker pool and admission state
#[derive(Clone)]
pub(crate) struct ExecutionState {
    /// Shared worker pool; one permit per running task attempt, FIFO admission
    pub(crate) concurrent_limit: Arc<Semaphore>,
    /// Flag to indicate whether new jobs are accepted (set to false during shutdown)
    pub(crate) accepting_new: Arc<AtomicBool>,
    /// Task attempts waiting for a worker
    pub(crate) queued_tasks: Arc<AtomicUsize>,
    /// Task attempts holding a worker
    pub(crate) running_tasks: Arc<AtomicUsize>,
    /// Cancelled on shutdown to stop background services
    pub(crate) shutdown: CancellationToken,
    /// Cancelled once shutdown has finished waiting for jobs
    pub(crate) stopped: CancellationToken,
}

/// Workspace, store and thumbnail handling
#[derive(Clone)]
pub(crate) struct StorageLayer {
    pub(crate) workspaces: WorkspaceManager,
    pub(crate) packager: ArtifactPackager,
    pub(crate) thumbnails: ThumbnailCache,
}

/// Main downloader instance (cloneable - all fields are Arc-wrapped)
#[derive(Clone)]
pub struct MediaDownloader {
    /// Event broadcast channel sender (multiple subscribers supported)
    pub(crate) event_tx: broadcast::Sender<Event>,
    /// Configuration (wrapped in Arc for sharing across tasks)
    pub(crate) config: Arc<Config>,
    /// External extractor (yt-dlp, or a stand-in when it is missing)
    pub(crate) extractor: Arc<dyn Extractor>,
    /// Current strategy catalog snapshot; replaced wholesale on credential re-probe
    pub(crate) catalog: Arc<RwLock<Arc<StrategyCatalog>>>,
    /// In-memory job registry, kept for the retention window only
    pub(crate) jobs: Arc<RwLock<HashMap<JobId, JobRecord>>>,
    pub(crate) execution: ExecutionState,
    pub(crate) storage: StorageLayer,
}

impl MediaDownloader {
    /// Create a new MediaDownloader instance
    ///
    /// Looks up the `yt-dlp` binary (explicit path first, then `PATH` when enabled). When it
    /// cannot be found the downloader still starts, but every extraction fails with an
    /// external-tool error.
    pub async fn new(config: Config) -> Result<Self> {
        let extractor: Arc<dyn Extractor> = match YtDlpExtractor::discover(&config.extractor) {
            Some(ytdlp) => Arc::new(ytdlp),
            None => {
                tracing::warn!("yt-dlp not found; downloads will fail until it is installed");
                Arc::new(UnavailableExtractor)
            }
        };

        Self::with_extractor(config, extractor).await
    }

    /// Create a MediaDownloader backed by the given extractor
    ///
    /// This initializes all core components:
    /// - Validates the configuration
    /// - Creates the store, workspace and thumbnail directories
    /// - Removes workspaces left behind by a previous process
    /// - Probes credential sources once and builds the strategy catalog
    /// - Sets up the worker pool and the event broadcast channel
    pub async fn with_extractor(config: Config, extractor: Arc<dyn Extractor>) -> Result<Self> {
        config.validate()?;

        for (dir, what) in [
            (&config.download.store_dir, "store"),
            (&config.download.workspace_dir, "workspace"),
            (&config.thumbnails.dir, "thumbnail"),
        ] {
            tokio::fs::create_dir_all(dir).await.map_err(|e| {
                Error::Io(std::io::Error::new(
                    e.kind(),
                    format!(
                        "Failed to create {} directory '{}': {}",
                        what,
                        dir.display(),
                        e
                    ),
                ))
            })?;
        }

        let workspaces = WorkspaceManager::new(
            config.download.workspace_dir.clone(),
            config.download.store_dir.clone(),
            config.download.max_artifact_bytes,
        );
        workspaces.clean_leftovers().await?;

        let storage = StorageLayer {
            packager: ArtifactPackager::new(
                config.download.store_dir.clone(),
                config.download.max_artifact_bytes,
            ),
            thumbnails: ThumbnailCache::new(&config.thumbnails)?,
            workspaces,
        };

        let credentials = CredentialRanking::probe(&config.extractor, extractor.as_ref()).await;
        let catalog = Arc::new(StrategyCatalog::new(&config.extractor, credentials));

        tracing::info!(
            extractor = extractor.name(),
            strategies = catalog.len(),
            credential_sources = catalog.credentials().sources().len(),
            "Extractor initialized"
        );

        // Create broadcast channel with buffer size of 1000 events
        let (event_tx, _rx) = broadcast::channel(1000);

        let execution = ExecutionState {
            concurrent_limit: Arc::new(Semaphore::new(config.download.max_concurrent_tasks)),
            accepting_new: Arc::new(AtomicBool::new(true)),
            queued_tasks: Arc::new(AtomicUsize::new(0)),
            running_tasks: Arc::new(AtomicUsize::new(0)),
            shutdown: CancellationToken::new(),
            stopped: CancellationToken::new(),
        };

        Ok(Self {
            event_tx,
            config: Arc::new(config),
            extractor,
            catalog: Arc::new(RwLock::new(catalog)),
            jobs: Arc::new(RwLock::new(HashMap::new())),
            execution,
            storage,
        })
    }

    /// Subscribe to job and task events
    ///
    /// Multiple subscribers are supported. Each subscriber receives all events independently.
    /// A subscriber that falls behind by more than 1000 events receives
    /// `RecvError::Lagged`.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use media_dl::{Config, MediaDownloader};
    ///
    /// #[tokio::main]
    /// async fn main() -> Result<(), Box<dyn std::error::Error>> {
    ///     let downloader = MediaDownloader::new(Config::default()).await?;
    ///
    ///     let mut events = downloader.subscribe();
    ///     tokio::spawn(async move {
    ///         while let Ok(event) = events.recv().await {
    ///             tracing::info!(?event, "media event");
    ///         }
    ///     });
    ///
    ///     Ok(())
    /// }
    /// ```
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.event_tx.subscribe()
    }

    /// Get the current configuration
    pub fn get_config(&self) -> Arc<Config> {
        Arc::clone(&self.config)
    }

    /// Workspace manager (exposes workspace accounting)
    pub fn workspaces(&self) -> &WorkspaceManager {
        &self.storage.workspaces
    }

    /// Query which extractor, credential sources and formats are available
    pub async fn capabilities(&self) -> Capabilities {
        let catalog = self.catalog.read().await.clone();
        Capabilities {
            extractor: self.extractor.name().to_string(),
            credential_sources: catalog
                .credentials()
                .sources()
                .iter()
                .map(ToString::to_string)
                .collect(),
            strategies: catalog.len(),
            formats: OutputFormat::ALL.to_vec(),
        }
    }

    /// Re-run the credential capability probe and swap in a fresh strategy catalog
    ///
    /// Tasks already running keep the snapshot they started with.
    pub async fn reprobe_credentials(&self) -> Capabilities {
        let credentials =
            CredentialRanking::probe(&self.config.extractor, self.extractor.as_ref()).await;
        let catalog = Arc::new(StrategyCatalog::new(&self.config.extractor, credentials));
        tracing::info!(
            strategies = catalog.len(),
            credential_sources = catalog.credentials().sources().len(),
            "Credential sources re-probed"
        );
        *self.catalog.write().await = catalog;
        self.capabilities().await
    }

    /// Fallback chain over the current catalog snapshot
    pub(crate) async fn fallback_chain(&self) -> FallbackChain {
        let catalog = self.catalog.read().await.clone();
        FallbackChain::new(self.extractor.clone(), catalog, &self.config.extractor)
    }

    /// Emit an event to all subscribers
    ///
    /// If there are no active subscribers, the event is silently dropped.
    pub(crate) fn emit_event(&self, event: Event) {
        self.event_tx.send(event).ok();
    }
}
