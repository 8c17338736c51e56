//! Job submission, expansion into tasks, aggregation and the in-memory job registry.

use super::MediaDownloader;
use super::task::{TaskOutput, TaskSpec, failed_outcome};
use crate::error::{Error, Result};
use crate::fallback::FallbackChain;
use crate::format::{
    INFO_SELECTOR, PostProcess, SelectorPair, classify_urls, format_selector, parse_quality,
    postprocess_for, resolve_output_format, validate_url,
};
use crate::packager::Packaged;
use crate::retry::download_with_retry;
use crate::strategy::ExtractRequest;
use crate::types::{
    Artifact, Event, Job, JobId, JobKind, JobRecord, JobRequest, JobResult, JobStatus,
    MediaInfo, QueueStats, TaskError, TaskState, UrlOutcome,
};
use crate::utils::{base_name, dir_usage};
use crate::workspace::StoredFile;
use chrono::{DateTime, Utc};
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;
use tokio::task::JoinSet;

impl MediaDownloader {
    /// Validate a request and turn it into a job
    ///
    /// Everything that can be rejected up front is rejected here, before any task exists:
    /// malformed URLs, unknown formats, unparseable quality labels and batches above the
    /// configured ceiling.
    pub fn prepare_job(&self, request: &JobRequest) -> Result<Job> {
        let urls: Vec<String> = request
            .urls
            .iter()
            .map(|u| u.trim().to_string())
            .filter(|u| !u.is_empty())
            .collect();

        let kind = classify_urls(&urls)?;
        let format = resolve_output_format(&request.format, request.audio_only)?;
        let quality = parse_quality(&request.quality)?;

        let download = &self.config.download;
        let requested = request.max_items.unwrap_or(download.max_items);
        if requested == 0 {
            return Err(Error::InvalidInput("maxItems must be at least 1".into()));
        }
        let max_items = requested
            .min(download.max_items)
            .min(download.max_batch_size);

        if kind == JobKind::Batch && urls.len() > max_items {
            return Err(Error::InvalidInput(format!(
                "batch of {} URLs exceeds the limit of {}",
                urls.len(),
                max_items
            )));
        }

        Ok(Job {
            id: JobId::new(),
            kind,
            input_urls: urls,
            format,
            quality,
            max_items,
            created_at: Utc::now(),
        })
    }

    /// Accept a job and run it in the background
    ///
    /// Returns as soon as the job is registered; poll [`MediaDownloader::get_job`] or
    /// subscribe to events for progress.
    pub async fn submit(&self, request: JobRequest) -> Result<JobId> {
        let job = self.accept(&request).await?;
        let id = job.id;

        let downloader = self.clone();
        tokio::spawn(async move {
            downloader.run_job(job).await;
        });

        Ok(id)
    }

    /// Accept a job and wait for its result
    pub async fn execute(&self, request: JobRequest) -> Result<JobResult> {
        let job = self.accept(&request).await?;
        Ok(self.run_job(job).await)
    }

    /// Look up a job in the registry
    pub async fn get_job(&self, id: JobId) -> Result<JobRecord> {
        self.jobs
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("job {id}")))
    }

    /// All jobs still in the registry, oldest first
    pub async fn list_jobs(&self) -> Vec<JobRecord> {
        let mut jobs: Vec<JobRecord> = self.jobs.read().await.values().cloned().collect();
        jobs.sort_by_key(|r| r.job.created_at);
        jobs
    }

    /// Queue depth, worker usage and store size
    pub async fn queue_stats(&self) -> QueueStats {
        let active_jobs = self
            .jobs
            .read()
            .await
            .values()
            .filter(|r| !r.status.is_terminal())
            .count();

        let (store_items, store_bytes) = match dir_usage(&self.config.download.store_dir).await {
            Ok(usage) => usage,
            Err(e) => {
                tracing::warn!(error = %e, "failed to measure store");
                (0, 0)
            }
        };

        QueueStats {
            queued_tasks: self.execution.queued_tasks.load(Ordering::SeqCst),
            running_tasks: self.execution.running_tasks.load(Ordering::SeqCst),
            max_concurrent_tasks: self.config.download.max_concurrent_tasks,
            active_jobs,
            store_items,
            store_bytes,
        }
    }

    /// Resolve metadata for one URL without downloading it
    ///
    /// The preview image is cached on the way; a preview that cannot be fetched leaves
    /// `thumbnail` empty instead of failing the lookup.
    pub async fn get_info(&self, url: &str) -> Result<MediaInfo> {
        validate_url(url)?;

        let chain = self.fallback_chain().await;
        let request = ExtractRequest {
            selectors: SelectorPair {
                requested: INFO_SELECTOR.to_string(),
                simplified: "best".to_string(),
            },
            postprocess: PostProcess::None,
            playlist_limit: None,
        };
        let attempt_timeout = self.config.extractor.attempt_timeout;

        let descriptor = download_with_retry(&self.config.retry, || {
            chain.resolve(url, &request, attempt_timeout)
        })
        .await?
        .value;

        let thumbnail = match &descriptor.thumbnail {
            Some(source) if !descriptor.id.is_empty() => self
                .storage
                .thumbnails
                .get_or_fetch(&descriptor.id, source)
                .await
                .map(|_| format!("/thumbnails/{}", descriptor.id)),
            _ => None,
        };

        Ok(MediaInfo {
            title: descriptor
                .title
                .clone()
                .unwrap_or_else(|| descriptor.id.clone()),
            id: descriptor.id,
            duration_secs: descriptor.duration_secs,
            view_count: descriptor.view_count,
            thumbnail,
        })
    }

    /// Cached preview for a media id; never touches the network
    pub async fn thumbnail_path(&self, media_id: &str) -> Option<PathBuf> {
        self.storage.thumbnails.cached(media_id).await
    }

    /// Drop records whose artifact was swept or that finished more than one expiry window ago
    pub(crate) async fn prune_jobs(&self, expired: &[PathBuf], now: DateTime<Utc>) -> usize {
        let window = self.config.retention.artifact_ttl;
        let mut jobs = self.jobs.write().await;
        let before = jobs.len();

        jobs.retain(|_, record| {
            let Some(result) = &record.result else {
                return true;
            };
            let swept = result
                .artifact
                .as_ref()
                .is_some_and(|a| expired.contains(&a.path));
            !swept && expiry(result.completed_at, window) > now
        });

        before - jobs.len()
    }

    async fn accept(&self, request: &JobRequest) -> Result<Job> {
        if !self.execution.accepting_new.load(Ordering::SeqCst) {
            return Err(Error::ShuttingDown);
        }

        let job = self.prepare_job(request)?;

        self.jobs.write().await.insert(
            job.id,
            JobRecord {
                job: job.clone(),
                status: JobStatus::Queued,
                result: None,
            },
        );

        tracing::info!(
            job_id = %job.id,
            kind = ?job.kind,
            urls = job.input_urls.len(),
            format = %job.format,
            "job accepted"
        );
        self.emit_event(Event::JobQueued {
            job_id: job.id,
            kind: job.kind,
            urls: job.input_urls.len(),
        });

        Ok(job)
    }

    async fn set_status(&self, id: JobId, status: JobStatus) {
        if let Some(record) = self.jobs.write().await.get_mut(&id) {
            record.status = status;
        }
    }

    /// Expand, execute every task, package the output and record the result
    pub(crate) async fn run_job(&self, job: Job) -> JobResult {
        self.set_status(job.id, JobStatus::Running).await;

        let chain = self.fallback_chain().await;
        let request = ExtractRequest {
            selectors: format_selector(job.format, job.quality),
            postprocess: postprocess_for(job.format, self.config.download.audio_bitrate_kbps),
            playlist_limit: None,
        };

        let (outcomes, stored) = match self.expand(&job, &chain, &request).await {
            Ok(specs) => self.run_tasks(&job, chain, request, specs).await,
            Err(outcome) => (vec![outcome], Vec::new()),
        };

        self.finish(job, outcomes, stored).await
    }

    /// Turn a job into tasks; a playlist that cannot be resolved becomes one failed outcome
    async fn expand(
        &self,
        job: &Job,
        chain: &FallbackChain,
        request: &ExtractRequest,
    ) -> std::result::Result<Vec<TaskSpec>, UrlOutcome> {
        let plain = |urls: &[String]| {
            urls.iter()
                .enumerate()
                .map(|(index, url)| TaskSpec {
                    index,
                    url: url.clone(),
                    media_id: None,
                })
                .collect::<Vec<_>>()
        };

        if job.kind != JobKind::Playlist {
            return Ok(plain(&job.input_urls));
        }

        let url = &job.input_urls[0];
        let resolve_request = ExtractRequest {
            playlist_limit: Some(job.max_items),
            ..request.clone()
        };
        let attempt_timeout = self.config.extractor.attempt_timeout;

        match download_with_retry(&self.config.retry, || {
            chain.resolve(url, &resolve_request, attempt_timeout)
        })
        .await
        {
            Ok(success) if success.value.is_playlist() => {
                let specs: Vec<TaskSpec> = success
                    .value
                    .entries
                    .into_iter()
                    .take(job.max_items)
                    .enumerate()
                    .map(|(index, entry)| TaskSpec {
                        index,
                        url: entry.url,
                        media_id: Some(entry.id),
                    })
                    .collect();
                tracing::info!(job_id = %job.id, entries = specs.len(), "playlist expanded");
                Ok(specs)
            }
            // Not actually a playlist; download the URL as a single item
            Ok(_) => Ok(plain(&job.input_urls)),
            Err(e) => {
                tracing::error!(job_id = %job.id, url = %url, error = %e, "playlist resolution failed");
                Err(failed_outcome(url, None, &e, 1))
            }
        }
    }

    /// Run every task on the shared pool; returns outcomes in task order and stored files
    async fn run_tasks(
        &self,
        job: &Job,
        chain: FallbackChain,
        request: ExtractRequest,
        specs: Vec<TaskSpec>,
    ) -> (Vec<UrlOutcome>, Vec<StoredFile>) {
        let chain = Arc::new(chain);
        let request = Arc::new(request);
        let mut slots: Vec<Option<TaskOutput>> = specs.iter().map(|_| None).collect();

        let mut set = JoinSet::new();
        for spec in specs.iter().cloned() {
            let downloader = self.clone();
            let chain = chain.clone();
            let request = request.clone();
            let job_id = job.id;
            set.spawn(async move { downloader.run_task(job_id, &chain, &request, spec).await });
        }

        let collect = async {
            while let Some(joined) = set.join_next().await {
                fill_slot(&mut slots, job.id, joined);
            }
        };

        let timed_out = match self.config.download.job_timeout {
            Some(limit) => tokio::time::timeout(limit, collect).await.is_err(),
            None => {
                collect.await;
                false
            }
        };

        if timed_out {
            tracing::warn!(job_id = %job.id, "job timeout reached, abandoning unfinished tasks");
            // Tasks that finished while the deadline fired still count
            drain_finished(&mut set, &mut slots, job.id);
            // Aborted tasks release their workspaces when dropped
            set.shutdown().await;
        }

        let mut outcomes = Vec::with_capacity(slots.len());
        let mut stored = Vec::new();
        for (slot, spec) in slots.into_iter().zip(&specs) {
            match slot {
                Some(output) => {
                    outcomes.push(output.outcome);
                    stored.extend(output.stored);
                }
                None => {
                    let error = match self.config.download.job_timeout {
                        Some(after) if timed_out => Error::Timeout { after },
                        _ => Error::Other("task ended without a result".into()),
                    };
                    self.emit_event(Event::TaskFailed {
                        job_id: job.id,
                        index: spec.index,
                        url: spec.url.clone(),
                        error: TaskError::from(&error),
                    });
                    outcomes.push(failed_outcome(&spec.url, spec.media_id.clone(), &error, 0));
                }
            }
        }

        (outcomes, stored)
    }

    /// Package stored files, build the job result and update the registry
    async fn finish(
        &self,
        job: Job,
        mut outcomes: Vec<UrlOutcome>,
        stored: Vec<StoredFile>,
    ) -> JobResult {
        let mut status = JobStatus::from_outcomes(&outcomes);
        let mut artifact = None;
        let mut error = None;

        if !stored.is_empty() {
            match self.package(&job, &stored).await {
                Ok((packaged, built)) => {
                    // Archived members no longer exist on their own
                    if let Packaged::Archive(archive) = &packaged {
                        for outcome in outcomes.iter_mut() {
                            if let TaskState::Succeeded { path } = &mut outcome.state {
                                *path = archive.clone();
                            }
                        }
                    }
                    artifact = Some(built);
                }
                Err(e) => {
                    tracing::error!(job_id = %job.id, error = %e, "packaging failed");
                    for file in &stored {
                        let _ = tokio::fs::remove_file(&file.path).await;
                    }
                    // Their files are gone with the bundle
                    let cause = TaskError::from(&e);
                    for (index, outcome) in outcomes.iter_mut().enumerate() {
                        if outcome.succeeded() {
                            outcome.state = TaskState::Failed {
                                error: cause.clone(),
                            };
                            self.emit_event(Event::TaskFailed {
                                job_id: job.id,
                                index,
                                url: outcome.url.clone(),
                                error: cause.clone(),
                            });
                        }
                    }
                    status = JobStatus::from_outcomes(&outcomes);
                    error = Some(cause);
                }
            }
        }

        let result = JobResult {
            job_id: job.id,
            status,
            outcomes,
            artifact,
            error,
            completed_at: Utc::now(),
        };

        if let Some(record) = self.jobs.write().await.get_mut(&job.id) {
            record.status = status;
            record.result = Some(result.clone());
        }

        tracing::info!(
            job_id = %job.id,
            status = ?status,
            succeeded = result.succeeded(),
            failed = result.failed(),
            "job completed"
        );
        self.emit_event(Event::JobCompleted {
            job_id: job.id,
            status,
            succeeded: result.succeeded(),
            failed: result.failed(),
        });

        result
    }

    async fn package(&self, job: &Job, stored: &[StoredFile]) -> Result<(Packaged, Artifact)> {
        let packaged = self.storage.packager.package(job.id, stored).await?;

        let name = match &packaged {
            Packaged::PassThrough(path) => stored
                .iter()
                .find(|f| &f.path == path)
                .map(|f| f.original_name.clone())
                .or_else(|| base_name(path))
                .unwrap_or_else(|| "download".to_string()),
            Packaged::Archive(_) => format!("media-{}.zip", job.id.short()),
        };

        let size_bytes = tokio::fs::metadata(packaged.path()).await?.len();
        let created_at = Utc::now();
        let artifact = Artifact {
            path: packaged.path().to_path_buf(),
            name,
            size_bytes,
            created_at,
            expires_at: expiry(created_at, self.config.retention.artifact_ttl),
        };

        Ok((packaged, artifact))
    }
}

/// Collect tasks that already finished without waiting on the rest
fn drain_finished(set: &mut JoinSet<TaskOutput>, slots: &mut [Option<TaskOutput>], job_id: JobId) {
    while let Some(joined) = set.try_join_next() {
        fill_slot(slots, job_id, joined);
    }
}

fn fill_slot(
    slots: &mut [Option<TaskOutput>],
    job_id: JobId,
    joined: std::result::Result<TaskOutput, tokio::task::JoinError>,
) {
    match joined {
        Ok(output) => {
            let index = output.index;
            if let Some(slot) = slots.get_mut(index) {
                *slot = Some(output);
            }
        }
        Err(e) => tracing::error!(job_id = %job_id, error = %e, "task aborted"),
    }
}

fn expiry(from: DateTime<Utc>, ttl: Duration) -> DateTime<Utc> {
    chrono::Duration::from_std(ttl)
        .ok()
        .and_then(|d| from.checked_add_signed(d))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}
