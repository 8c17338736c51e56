//! Job handlers: submission, lookup and artifact delivery.

use super::{DownloadSummary, JobAccepted, artifact_url};
use crate::api::AppState;
use crate::error::{ApiError, Error};
use crate::types::{Artifact, JobId, JobRequest, JobResult, JobStatus, UrlOutcome};
use axum::{
    Json,
    body::Body,
    extract::{Path, State},
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use serde_json::json;
use std::path::Path as FsPath;
use tokio_util::io::ReaderStream;

/// POST /jobs - Submit a job
#[utoipa::path(
    post,
    path = "/jobs",
    tag = "jobs",
    request_body = crate::types::JobRequest,
    responses(
        (status = 202, description = "Job accepted", body = JobAccepted),
        (status = 400, description = "Invalid URL, format, quality or batch size", body = crate::error::ApiError),
        (status = 503, description = "Shutting down", body = crate::error::ApiError)
    )
)]
pub async fn submit_job(
    State(state): State<AppState>,
    Json(request): Json<JobRequest>,
) -> Response {
    match state.downloader.submit(request).await {
        Ok(job_id) => (
            StatusCode::ACCEPTED,
            Json(JobAccepted {
                job_id,
                status: JobStatus::Queued,
            }),
        )
            .into_response(),
        Err(e) => e.into_response(),
    }
}

/// GET /jobs - List jobs
#[utoipa::path(
    get,
    path = "/jobs",
    tag = "jobs",
    responses(
        (status = 200, description = "Jobs inside the retention window, oldest first", body = Vec<crate::types::JobRecord>)
    )
)]
pub async fn list_jobs(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.downloader.list_jobs().await)
}

/// GET /jobs/:id - Get one job
#[utoipa::path(
    get,
    path = "/jobs/{id}",
    tag = "jobs",
    params(
        ("id" = String, Path, description = "Job ID")
    ),
    responses(
        (status = 200, description = "Job with its outcomes once finished", body = crate::types::JobRecord),
        (status = 400, description = "Malformed job ID", body = crate::error::ApiError),
        (status = 404, description = "Unknown or expired job", body = crate::error::ApiError)
    )
)]
pub async fn get_job(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    let result: Result<_, Error> = async {
        let id = parse_job_id(&id)?;
        state.downloader.get_job(id).await
    }
    .await;

    match result {
        Ok(record) => (StatusCode::OK, Json(record)).into_response(),
        Err(e) => e.into_response(),
    }
}

/// GET /jobs/:id/artifact - Stream a finished job's artifact
#[utoipa::path(
    get,
    path = "/jobs/{id}/artifact",
    tag = "jobs",
    params(
        ("id" = String, Path, description = "Job ID")
    ),
    responses(
        (status = 200, description = "Artifact bytes", content_type = "application/octet-stream"),
        (status = 404, description = "Unknown job, job not finished, or artifact expired", body = crate::error::ApiError)
    )
)]
pub async fn get_artifact(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    let result: Result<_, Error> = async {
        let id = parse_job_id(&id)?;
        let record = state.downloader.get_job(id).await?;
        record
            .result
            .and_then(|r| r.artifact)
            .ok_or_else(|| Error::NotFound(format!("artifact for job {id}")))
    }
    .await;

    match result {
        Ok(artifact) => stream_artifact(&artifact).await,
        Err(e) => e.into_response(),
    }
}

/// POST /download - Run a job to completion
///
/// Streams the artifact when every URL succeeded. On partial success the body is a
/// [`DownloadSummary`] pointing at the artifact route; on failure it is an error body
/// carrying every per-URL outcome.
#[utoipa::path(
    post,
    path = "/download",
    tag = "jobs",
    request_body = crate::types::JobRequest,
    responses(
        (status = 200, description = "Artifact bytes (all URLs succeeded) or a JSON summary (partial success)", body = DownloadSummary),
        (status = 400, description = "Invalid URL, format, quality or batch size", body = crate::error::ApiError),
        (status = 410, description = "Every item was unavailable", body = crate::error::ApiError),
        (status = 429, description = "Every item hit a rate limit or bot challenge", body = crate::error::ApiError),
        (status = 502, description = "Every item failed", body = crate::error::ApiError),
        (status = 504, description = "Every item timed out", body = crate::error::ApiError)
    )
)]
pub async fn download(State(state): State<AppState>, Json(request): Json<JobRequest>) -> Response {
    let result = match state.downloader.execute(request).await {
        Ok(result) => result,
        Err(e) => return e.into_response(),
    };

    if result.status == JobStatus::Success
        && let Some(artifact) = &result.artifact
    {
        return stream_artifact(artifact).await;
    }

    if result.status == JobStatus::PartialSuccess {
        let summary = DownloadSummary {
            job_id: result.job_id,
            status: result.status,
            artifact_url: result.artifact.as_ref().map(|_| artifact_url(result.job_id)),
            artifact: result.artifact,
            outcomes: result.outcomes,
        };
        return (StatusCode::OK, Json(summary)).into_response();
    }

    job_failure(&result)
}

fn parse_job_id(raw: &str) -> Result<JobId, Error> {
    raw.parse()
        .map_err(|_| Error::InvalidInput(format!("malformed job id: {raw}")))
}

/// Error body for a job that produced nothing
fn job_failure(result: &JobResult) -> Response {
    let details = json!({
        "job_id": result.job_id,
        "outcomes": result.outcomes,
    });

    if let Some(error) = &result.error {
        let body = ApiError::with_details(error.code.clone(), error.message.clone(), details);
        return (StatusCode::INTERNAL_SERVER_ERROR, Json(body)).into_response();
    }

    let body = ApiError::with_details(
        "job_failed",
        format!("all {} item(s) failed", result.outcomes.len()),
        details,
    );
    (failure_status(&result.outcomes), Json(body)).into_response()
}

/// Status that best summarizes a set of failed outcomes
fn failure_status(outcomes: &[UrlOutcome]) -> StatusCode {
    let codes: Vec<&str> = outcomes
        .iter()
        .filter_map(|o| o.error().map(|e| e.code.as_str()))
        .collect();

    if all_in(&codes, &["rate_limited", "bot_challenge"]) {
        StatusCode::TOO_MANY_REQUESTS
    } else if all_in(&codes, &["upstream_unavailable"]) {
        StatusCode::GONE
    } else if all_in(&codes, &["timeout"]) {
        StatusCode::GATEWAY_TIMEOUT
    } else {
        StatusCode::BAD_GATEWAY
    }
}

fn all_in(codes: &[&str], accepted: &[&str]) -> bool {
    !codes.is_empty() && codes.iter().all(|c| accepted.contains(c))
}

/// Stream an artifact from the public store
async fn stream_artifact(artifact: &Artifact) -> Response {
    let file = match tokio::fs::File::open(&artifact.path).await {
        Ok(file) => file,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Error::NotFound(format!("artifact {} (expired)", artifact.name))
                .into_response();
        }
        Err(e) => return Error::Io(e).into_response(),
    };

    let body = Body::from_stream(ReaderStream::new(file));
    let disposition = format!("attachment; filename=\"{}\"", ascii_file_name(&artifact.name));

    let mut response = (StatusCode::OK, body).into_response();
    let headers = response.headers_mut();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static(content_type_for(&artifact.path)),
    );
    headers.insert(header::CONTENT_LENGTH, HeaderValue::from(artifact.size_bytes));
    if let Ok(value) = HeaderValue::from_str(&disposition) {
        headers.insert(header::CONTENT_DISPOSITION, value);
    }
    response
}

fn content_type_for(path: &FsPath) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase());

    match ext.as_deref() {
        Some("mp4") => "video/mp4",
        Some("webm") => "video/webm",
        Some("mkv") => "video/x-matroska",
        Some("mp3") => "audio/mpeg",
        Some("wav") => "audio/wav",
        Some("m4a") => "audio/mp4",
        Some("opus") => "audio/ogg",
        Some("flac") => "audio/flac",
        Some("zip") => "application/zip",
        _ => "application/octet-stream",
    }
}

/// Header-safe file name: printable ASCII without quotes or backslashes
fn ascii_file_name(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| {
            if (c.is_ascii_graphic() && c != '"' && c != '\\') || c == ' ' {
                c
            } else {
                '_'
            }
        })
        .collect();

    if !cleaned.chars().any(|c| c.is_ascii_alphanumeric()) {
        "download".to_string()
    } else {
        cleaned
    }
}
