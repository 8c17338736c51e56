//! Route handlers for the REST API
//!
//! Handlers are organized by domain:
//! - [`jobs`]: Job submission, lookup and artifact delivery
//! - [`media`]: Metadata lookups and cached thumbnails
//! - [`system`]: Health, stats, events, OpenAPI, shutdown

use crate::types::{Artifact, JobId, JobStatus, UrlOutcome};
use serde::{Deserialize, Serialize};

mod jobs;
mod media;
mod system;

pub use jobs::*;
pub use media::*;
pub use system::*;

// ============================================================================
// Request/Response Types (shared across handlers)
// ============================================================================

/// Response for POST /jobs
#[derive(Debug, Deserialize, Serialize, utoipa::ToSchema)]
pub struct JobAccepted {
    /// Id to poll with GET /jobs/:id
    pub job_id: JobId,
    /// Always `queued` at submission time
    pub status: JobStatus,
}

/// Request body for POST /info
#[derive(Debug, Deserialize, Serialize, utoipa::ToSchema)]
pub struct InfoRequest {
    /// Media URL to resolve
    pub url: String,
}

/// Response for POST /download when some but not all URLs succeeded
#[derive(Debug, Deserialize, Serialize, utoipa::ToSchema)]
pub struct DownloadSummary {
    /// Job id
    pub job_id: JobId,
    /// Aggregate status
    pub status: JobStatus,
    /// Route that streams the artifact
    #[serde(skip_serializing_if = "Option::is_none")]
    pub artifact_url: Option<String>,
    /// The packaged deliverable
    #[serde(skip_serializing_if = "Option::is_none")]
    pub artifact: Option<Artifact>,
    /// One entry per URL, in input order
    pub outcomes: Vec<UrlOutcome>,
}

/// Route that streams a job's artifact
pub(crate) fn artifact_url(job_id: JobId) -> String {
    format!("/jobs/{job_id}/artifact")
}
