//! Shutdown coordination.

use crate::error::Result;
use crate::types::Event;
use std::sync::atomic::Ordering;
use std::time::Duration;

use super::MediaDownloader;

/// How long shutdown waits for in-flight jobs
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

impl MediaDownloader {
    /// Gracefully shut down the downloader
    ///
    /// This method performs a graceful shutdown sequence:
    /// 1. Stops accepting new jobs
    /// 2. Cancels background services (retention sweeper, API server)
    /// 3. Waits for in-flight jobs to finish with a timeout (30 seconds)
    /// 4. Emits [`Event::Shutdown`]
    ///
    /// Jobs still running after the timeout keep running on the runtime until it is
    /// dropped; their workspaces are removed when their tasks are.
    pub async fn shutdown(&self) -> Result<()> {
        tracing::info!("Initiating graceful shutdown");

        self.execution.accepting_new.store(false, Ordering::SeqCst);
        tracing::info!("Stopped accepting new jobs");

        self.execution.shutdown.cancel();

        match tokio::time::timeout(SHUTDOWN_TIMEOUT, self.wait_for_active_jobs()).await {
            Ok(()) => tracing::info!("All active jobs completed"),
            Err(_) => {
                tracing::warn!("Timeout waiting for jobs to complete, proceeding with shutdown")
            }
        }

        self.emit_event(Event::Shutdown);
        self.execution.stopped.cancel();
        tracing::info!("Graceful shutdown complete");
        Ok(())
    }

    /// Resolves once [`MediaDownloader::shutdown`] has been called and has finished
    pub async fn stopped(&self) {
        self.execution.stopped.cancelled().await
    }

    /// Resolves as soon as [`MediaDownloader::shutdown`] starts
    pub(crate) async fn shutdown_requested(&self) {
        self.execution.shutdown.cancelled().await
    }

    /// True until [`MediaDownloader::shutdown`] is called
    pub fn is_accepting(&self) -> bool {
        self.execution.accepting_new.load(Ordering::SeqCst)
    }

    async fn wait_for_active_jobs(&self) {
        loop {
            let active = self
                .jobs
                .read()
                .await
                .values()
                .filter(|r| !r.status.is_terminal())
                .count();

            if active == 0 {
                return;
            }

            tracing::debug!(active, "Waiting for active jobs to complete");
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
    }
}
