//! # media-dl
//!
//! Job-oriented remote media retrieval: submit URLs, get back one artifact.
//!
//! ## Design Philosophy
//!
//! media-dl is designed to be:
//! - **Failure-isolating** - One failed item never sinks the rest of a batch or playlist
//! - **Bounded** - A shared worker pool caps concurrent extractor processes across all jobs
//! - **Self-cleaning** - Workspaces never outlive their task; artifacts expire on a timer
//! - **Event-driven** - Consumers subscribe to events, no polling required
//!
//! ## Quick Start
//!
//! ```no_run
//! use media_dl::{Config, JobRequest, MediaDownloader};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let downloader = MediaDownloader::new(Config::default()).await?;
//!
//!     // Subscribe to events
//!     let mut events = downloader.subscribe();
//!     tokio::spawn(async move {
//!         while let Ok(event) = events.recv().await {
//!             println!("Event: {:?}", event);
//!         }
//!     });
//!
//!     let result = downloader
//!         .execute(JobRequest::single("https://www.youtube.com/watch?v=dQw4w9WgXcQ"))
//!         .await?;
//!     for outcome in &result.outcomes {
//!         println!("{}: {:?}", outcome.url, outcome.state);
//!     }
//!
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// REST API module
pub mod api;
/// Configuration types
pub mod config;
/// Core downloader implementation (decomposed into focused submodules)
pub mod downloader;
/// Error types
pub mod error;
/// External extractor abstraction and the yt-dlp implementation
pub mod extractor;
/// Strategy fallback chain and extractor failure classification
pub mod fallback;
/// Format selectors, quality labels and URL validation
pub mod format;
/// Single-file pass-through and zip packaging
pub mod packager;
/// Retry logic with exponential backoff
pub mod retry;
/// Strategy catalog and credential ranking
pub mod strategy;
/// Timed retention sweep over the store and thumbnail cache
pub mod sweeper;
/// Normalized preview image cache
pub mod thumbnails;
/// Core types and events
pub mod types;
/// Utility functions
pub mod utils;
/// Per-task scratch directories and promotion into the store
pub mod workspace;

// Re-export commonly used types
pub use config::Config;
pub use downloader::MediaDownloader;
pub use error::{ApiError, Error, ErrorDetail, Result, StorageError, ToHttpStatus};
pub use extractor::{Extractor, YtDlpExtractor};
pub use types::{
    Artifact, Capabilities, Event, Job, JobId, JobKind, JobRecord, JobRequest, JobResult,
    JobStatus, MediaInfo, OutputFormat, Quality, QueueStats, TaskError, TaskState, UrlOutcome,
};

/// Helper function to run the downloader with graceful signal handling.
///
/// Returns after a termination signal has been handled by the downloader's `shutdown()`
/// method, or after a shutdown started elsewhere (for example `POST /shutdown`) has
/// finished.
///
/// - **Unix:** listens for SIGTERM and SIGINT, with fallbacks if signal registration fails.
/// - **Windows/other:** listens for Ctrl+C via `tokio::signal::ctrl_c()`.
///
/// # Example
///
/// ```no_run
/// use media_dl::{MediaDownloader, Config, run_with_shutdown};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let downloader = MediaDownloader::new(Config::default()).await?;
///
///     // Run with automatic signal handling
///     run_with_shutdown(downloader).await?;
///
///     Ok(())
/// }
/// ```
pub async fn run_with_shutdown(downloader: MediaDownloader) -> Result<()> {
    tokio::select! {
        _ = wait_for_signal() => downloader.shutdown().await,
        _ = downloader.shutdown_requested() => {
            downloader.stopped().await;
            Ok(())
        }
    }
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    // Set up signal handlers - these may fail in restricted environments (containers, tests)
    let sigterm_result = signal(SignalKind::terminate());
    let sigint_result = signal(SignalKind::interrupt());

    match (sigterm_result, sigint_result) {
        (Ok(mut sigterm), Ok(mut sigint)) => {
            tokio::select! {
                _ = sigterm.recv() => {
                    tracing::info!("Received SIGTERM signal");
                }
                _ = sigint.recv() => {
                    tracing::info!("Received SIGINT signal (Ctrl+C)");
                }
            }
        }
        (Err(e), _) => {
            tracing::warn!(error = %e, "Could not register SIGTERM handler, waiting for SIGINT only");
            if let Ok(mut sigint) = signal(SignalKind::interrupt()) {
                sigint.recv().await;
                tracing::info!("Received SIGINT signal (Ctrl+C)");
            } else {
                tracing::error!("Could not register any signal handlers, using ctrl_c fallback");
                tokio::signal::ctrl_c().await.ok();
            }
        }
        (_, Err(e)) => {
            tracing::warn!(error = %e, "Could not register SIGINT handler, waiting for SIGTERM only");
            if let Ok(mut sigterm) = signal(SignalKind::terminate()) {
                sigterm.recv().await;
                tracing::info!("Received SIGTERM signal");
            } else {
                tracing::error!("Could not register any signal handlers, using ctrl_c fallback");
                tokio::signal::ctrl_c().await.ok();
            }
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => {
            tracing::info!("Received Ctrl+C signal");
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C signal");
        }
    }
}
