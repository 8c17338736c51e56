//! Retention sweeper
//!
//! A periodic pass over the public store and the thumbnail cache that deletes finalized items
//! once their age exceeds the directory's expiry window. Age is read from the file's
//! modification time, which promotion stamps when the item lands in the store.
//!
//! The sweeper only looks at plain files directly inside each target directory and skips
//! hidden and `.partial` names, so it never touches an archive being written or a live
//! workspace (workspaces live under a separate root).

use crate::config::Config;
use crate::utils::is_hidden_or_partial;
use std::path::PathBuf;
use std::time::{Duration, SystemTime};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

/// One directory swept with its own expiry window
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SweepTarget {
    /// Directory whose direct children are candidates for deletion
    pub dir: PathBuf,
    /// Items older than this are deleted
    pub ttl: Duration,
}

/// Summary of one sweep pass
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Candidate files examined
    pub scanned: usize,
    /// Files removed
    pub deleted: usize,
    /// Files that were expired but could not be removed
    pub failed: usize,
    /// Paths removed during this pass
    pub deleted_paths: Vec<PathBuf>,
}

/// Deletes expired artifacts and thumbnails on a fixed interval
#[derive(Clone, Debug)]
pub struct RetentionSweeper {
    targets: Vec<SweepTarget>,
    interval: Duration,
}

impl RetentionSweeper {
    /// Sweeper with no targets, running every `interval`
    pub fn new(interval: Duration) -> Self {
        Self {
            targets: Vec::new(),
            interval,
        }
    }

    /// Sweeper for the store and thumbnail directories of `config`
    pub fn from_config(config: &Config) -> Self {
        let retention = &config.retention;
        Self::new(retention.sweep_interval)
            .with_target(config.download.store_dir.clone(), retention.artifact_ttl)
            .with_target(config.thumbnails.dir.clone(), retention.thumbnail_ttl())
    }

    /// Add a directory to sweep
    pub fn with_target(mut self, dir: PathBuf, ttl: Duration) -> Self {
        self.targets.push(SweepTarget { dir, ttl });
        self
    }

    /// Directories this sweeper covers
    pub fn targets(&self) -> &[SweepTarget] {
        &self.targets
    }

    /// Interval between passes
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Run a single pass as of `now`
    ///
    /// Never fails as a whole: an unreadable directory or an item that cannot be removed is
    /// logged and the pass moves on.
    pub async fn sweep_once(&self, now: SystemTime) -> SweepReport {
        let mut report = SweepReport::default();
        for target in &self.targets {
            self.sweep_dir(target, now, &mut report).await;
        }
        report
    }

    async fn sweep_dir(&self, target: &SweepTarget, now: SystemTime, report: &mut SweepReport) {
        let mut entries = match tokio::fs::read_dir(&target.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return,
            Err(e) => {
                tracing::warn!(dir = %target.dir.display(), error = %e, "cannot read directory for retention sweep");
                return;
            }
        };

        loop {
            let entry = match entries.next_entry().await {
                Ok(Some(entry)) => entry,
                Ok(None) => break,
                Err(e) => {
                    tracing::warn!(dir = %target.dir.display(), error = %e, "retention sweep listing interrupted");
                    break;
                }
            };

            if is_hidden_or_partial(&entry.file_name().to_string_lossy()) {
                continue;
            }

            let path = entry.path();
            let modified = match entry.metadata().await {
                Ok(meta) if meta.is_file() => meta.modified(),
                Ok(_) => continue,
                Err(e) => Err(e),
            };
            let modified = match modified {
                Ok(t) => t,
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "cannot read item age");
                    continue;
                }
            };

            report.scanned += 1;

            // Clock skew can put mtime in the future; treat that as age zero
            let age = now.duration_since(modified).unwrap_or_default();
            if age <= target.ttl {
                continue;
            }

            match tokio::fs::remove_file(&path).await {
                Ok(()) => {
                    tracing::debug!(path = %path.display(), age_secs = age.as_secs(), "expired item deleted");
                    report.deleted += 1;
                    report.deleted_paths.push(path);
                }
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "failed to delete expired item");
                    report.failed += 1;
                }
            }
        }
    }

    /// Sweep every interval until `cancel` fires, handing each report to `on_pass`
    ///
    /// The first pass runs immediately.
    pub async fn run<F, Fut>(self, cancel: CancellationToken, mut on_pass: F)
    where
        F: FnMut(SweepReport) -> Fut,
        Fut: Future<Output = ()>,
    {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        tracing::info!(
            interval_secs = self.interval.as_secs(),
            targets = self.targets.len(),
            "retention sweeper started"
        );

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    let report = self.sweep_once(SystemTime::now()).await;
                    if report.deleted > 0 || report.failed > 0 {
                        tracing::info!(
                            scanned = report.scanned,
                            deleted = report.deleted,
                            failed = report.failed,
                            "retention sweep complete"
                        );
                    }
                    on_pass(report).await;
                }
            }
        }

        tracing::info!("retention sweeper stopped");
    }
}
