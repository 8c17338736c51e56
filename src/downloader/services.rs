//! Background service starters.

use super::MediaDownloader;
use crate::error::Result;
use crate::sweeper::RetentionSweeper;
use crate::types::Event;
use chrono::Utc;

impl MediaDownloader {
    /// Start the periodic retention sweep over the store and thumbnail cache
    ///
    /// After each pass, an [`Event::ArtifactExpired`] is emitted per deleted file and job
    /// records whose artifact expired are dropped from the registry. The sweeper stops on
    /// [`MediaDownloader::shutdown`].
    pub fn start_retention_sweeper(&self) -> tokio::task::JoinHandle<()> {
        if !self.config.retention.enabled {
            tracing::info!("Retention disabled, skipping retention sweeper");
            return tokio::spawn(async {});
        }

        let sweeper = RetentionSweeper::from_config(&self.config);
        let cancel = self.execution.shutdown.child_token();
        let downloader = self.clone();

        let handle = tokio::spawn(sweeper.run(cancel, move |report| {
            let downloader = downloader.clone();
            async move {
                for path in &report.deleted_paths {
                    downloader.emit_event(Event::ArtifactExpired { path: path.clone() });
                }
                let pruned = downloader
                    .prune_jobs(&report.deleted_paths, Utc::now())
                    .await;
                if pruned > 0 {
                    tracing::debug!(pruned, "expired job records removed");
                }
            }
        }));

        tracing::info!("Retention sweeper background task started");

        handle
    }

    /// Spawn the REST API server in a background task
    ///
    /// The server listens on the configured bind address (default: 127.0.0.1:6790) and
    /// stops on [`MediaDownloader::shutdown`].
    pub fn spawn_api_server(&self) -> tokio::task::JoinHandle<Result<()>> {
        let downloader = std::sync::Arc::new(self.clone());
        let config = self.config.clone();

        tokio::spawn(async move { crate::api::start_api_server(downloader, config).await })
    }
}
