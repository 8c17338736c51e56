//! Per-task execution: worker pool admission, retry with backoff, workspace lifecycle.
//!
//! One attempt holds one worker permit and one workspace. The permit is released before any
//! backoff sleep, so a task waiting to retry never occupies a worker. Every attempt ends in
//! exactly one of promote or release; an attempt that is aborted mid-flight releases its
//! workspace when the handle is dropped.

use super::MediaDownloader;
use crate::error::{Error, Result, StorageError};
use crate::fallback::FallbackChain;
use crate::retry::download_with_retry_observed;
use crate::strategy::ExtractRequest;
use crate::types::{Event, JobId, TaskError, TaskState, UrlOutcome};
use crate::workspace::{SelectionRule, StoredFile};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use tokio::sync::SemaphorePermit;

/// One concrete download derived from a job
#[derive(Clone, Debug)]
pub(crate) struct TaskSpec {
    /// Position within the job's outcome list
    pub(crate) index: usize,
    pub(crate) url: String,
    /// Known when the task came from a playlist entry
    pub(crate) media_id: Option<String>,
}

/// Terminal result of a task
#[derive(Debug)]
pub(crate) struct TaskOutput {
    pub(crate) index: usize,
    pub(crate) outcome: UrlOutcome,
    pub(crate) stored: Option<StoredFile>,
}

/// Promote the reported file; if the transcoder moved it, take the largest file it produced
async fn selection_rule(reported: PathBuf, request: &ExtractRequest) -> SelectionRule {
    let exists = tokio::fs::metadata(&reported)
        .await
        .is_ok_and(|m| m.is_file());
    match request.postprocess.target_format() {
        Some(format) if !exists => {
            tracing::debug!(
                reported = %reported.display(),
                format = format.as_str(),
                "reported output missing, selecting by extension"
            );
            SelectionRule::LargestWithExtension(vec![format.as_str().to_string()])
        }
        _ => SelectionRule::Exact(reported),
    }
}

/// Increments a counter for as long as it lives
struct CounterGuard<'a>(&'a AtomicUsize);

impl<'a> CounterGuard<'a> {
    fn new(counter: &'a AtomicUsize) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(counter)
    }
}

impl Drop for CounterGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// A held worker permit
struct WorkerSlot<'a> {
    _permit: SemaphorePermit<'a>,
    _running: CounterGuard<'a>,
}

/// Failure outcome for a task that never produced a result of its own
pub(crate) fn failed_outcome(
    url: &str,
    media_id: Option<String>,
    error: &Error,
    attempts: u32,
) -> UrlOutcome {
    UrlOutcome {
        url: url.to_string(),
        media_id,
        state: TaskState::Failed {
            error: TaskError::from(error),
        },
        attempts,
        strategy: None,
    }
}

impl MediaDownloader {
    /// Run one task to a terminal state
    ///
    /// Never fails: the error of the final attempt is recorded in the outcome.
    pub(crate) async fn run_task(
        &self,
        job_id: JobId,
        chain: &FallbackChain,
        request: &ExtractRequest,
        spec: TaskSpec,
    ) -> TaskOutput {
        let attempts = AtomicU32::new(0);

        let result = download_with_retry_observed(
            &self.config.retry,
            |attempt, error: &Error, delay| {
                self.emit_event(Event::TaskRetrying {
                    job_id,
                    index: spec.index,
                    attempt,
                    error: error.to_string(),
                    delay_ms: delay.as_millis() as u64,
                });
            },
            || {
                attempts.fetch_add(1, Ordering::SeqCst);
                self.attempt(job_id, chain, request, &spec)
            },
        )
        .await;

        let attempts = attempts.into_inner();

        match result {
            Ok((file, strategy)) => {
                tracing::info!(
                    job_id = %job_id,
                    index = spec.index,
                    url = %spec.url,
                    attempts,
                    strategy,
                    path = %file.path.display(),
                    "task succeeded"
                );
                self.emit_event(Event::TaskSucceeded {
                    job_id,
                    index: spec.index,
                    url: spec.url.clone(),
                });
                TaskOutput {
                    index: spec.index,
                    outcome: UrlOutcome {
                        url: spec.url,
                        media_id: spec.media_id,
                        state: TaskState::Succeeded {
                            path: file.path.clone(),
                        },
                        attempts,
                        strategy: Some(strategy),
                    },
                    stored: Some(file),
                }
            }
            Err(e) => {
                tracing::error!(
                    job_id = %job_id,
                    index = spec.index,
                    url = %spec.url,
                    attempts,
                    error = %e,
                    "task failed"
                );
                let outcome = failed_outcome(&spec.url, spec.media_id, &e, attempts);
                self.emit_event(Event::TaskFailed {
                    job_id,
                    index: spec.index,
                    url: outcome.url.clone(),
                    error: TaskError::from(&e),
                });
                TaskOutput {
                    index: spec.index,
                    outcome,
                    stored: None,
                }
            }
        }
    }

    /// One attempt: worker permit, fresh workspace, fallback chain, promote or release
    async fn attempt(
        &self,
        job_id: JobId,
        chain: &FallbackChain,
        request: &ExtractRequest,
        spec: &TaskSpec,
    ) -> Result<(StoredFile, usize)> {
        let _worker = self.acquire_worker().await?;

        self.emit_event(Event::TaskStarted {
            job_id,
            index: spec.index,
            url: spec.url.clone(),
        });

        let workspace = self.storage.workspaces.acquire(job_id).await?;
        let budget = self.config.download.task_timeout;

        let downloaded = match tokio::time::timeout(
            budget,
            chain.download(
                &spec.url,
                request,
                workspace.path(),
                self.config.extractor.attempt_timeout,
            ),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(Error::Timeout { after: budget }),
        };

        match downloaded {
            Ok(success) => {
                let workspace_path = workspace.path().to_path_buf();
                let rule = selection_rule(success.value, request).await;
                let mut stored = workspace.promote(rule).await?;
                let file = stored.pop().ok_or(StorageError::NoOutput {
                    path: workspace_path,
                })?;
                Ok((file, success.strategy_index))
            }
            Err(e) => {
                if let Err(release_error) = workspace.release().await {
                    tracing::warn!(job_id = %job_id, error = %release_error, "workspace release failed");
                }
                Err(e)
            }
        }
    }

    /// Wait for a worker permit (FIFO), counting the wait as queued and the hold as running
    async fn acquire_worker(&self) -> Result<WorkerSlot<'_>> {
        let permit = {
            let _queued = CounterGuard::new(&self.execution.queued_tasks);
            self.execution.concurrent_limit.acquire().await
        };
        let permit = permit.map_err(|_| Error::ShuttingDown)?;

        Ok(WorkerSlot {
            _permit: permit,
            _running: CounterGuard::new(&self.execution.running_tasks),
        })
    }
}
