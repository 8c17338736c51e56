//! Core types for media-dl

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use utoipa::ToSchema;
use uuid::Uuid;

/// Unique identifier for a job
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, ToSchema)]
#[serde(transparent)]
pub struct JobId(#[schema(value_type = String, format = Uuid)] pub Uuid);

impl JobId {
    /// Generate a fresh random JobId
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// First eight hex digits, used in log lines and store file names
    pub fn short(&self) -> String {
        self.0.simple().to_string()[..8].to_string()
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for JobId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

/// Whether an item is fetched with its video track or as audio only
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum MediaKind {
    /// Video with audio, merged into a container
    Video,
    /// Audio stream only, converted to an audio codec
    AudioOnly,
}

/// A single resolvable remote item
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct MediaRef {
    /// Extractor-assigned id (known up front for playlist entries)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// URL handed to the extractor
    pub source_url: String,
    /// Video or audio-only
    pub kind: MediaKind,
}

/// How a job's input URLs expand into tasks
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum JobKind {
    /// One URL, one item
    Single,
    /// One playlist URL expanding to many items
    Playlist,
    /// Several URLs, one item each
    Batch,
}

/// Output container or audio codec
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// MPEG-4 container
    Mp4,
    /// WebM container
    Webm,
    /// Matroska container
    Mkv,
    /// MP3 audio
    Mp3,
    /// WAV audio
    Wav,
    /// AAC audio in an M4A container
    M4a,
    /// Opus audio
    Opus,
    /// FLAC audio
    Flac,
}

impl OutputFormat {
    /// Every supported format token
    pub const ALL: [OutputFormat; 8] = [
        OutputFormat::Mp4,
        OutputFormat::Webm,
        OutputFormat::Mkv,
        OutputFormat::Mp3,
        OutputFormat::Wav,
        OutputFormat::M4a,
        OutputFormat::Opus,
        OutputFormat::Flac,
    ];

    /// Format token as accepted on the wire and passed to the extractor
    pub fn as_str(&self) -> &'static str {
        match self {
            OutputFormat::Mp4 => "mp4",
            OutputFormat::Webm => "webm",
            OutputFormat::Mkv => "mkv",
            OutputFormat::Mp3 => "mp3",
            OutputFormat::Wav => "wav",
            OutputFormat::M4a => "m4a",
            OutputFormat::Opus => "opus",
            OutputFormat::Flac => "flac",
        }
    }

    /// True for audio codecs
    pub fn is_audio(&self) -> bool {
        matches!(
            self,
            OutputFormat::Mp3
                | OutputFormat::Wav
                | OutputFormat::M4a
                | OutputFormat::Opus
                | OutputFormat::Flac
        )
    }

    /// Media kind implied by this format
    pub fn media_kind(&self) -> MediaKind {
        if self.is_audio() {
            MediaKind::AudioOnly
        } else {
            MediaKind::Video
        }
    }
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Height (video) or bitrate (audio) ceiling
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum Quality {
    /// Highest available
    Best,
    /// Lowest available
    Worst,
    /// Numeric ceiling (pixels of height for video, kbps for audio)
    AtMost(u32),
}

/// Job submission payload
///
/// Accepts both `audio_only`/`max_items` and the `audioOnly`/`maxItems` spellings.
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct JobRequest {
    /// One or more media, playlist or batch URLs
    pub urls: Vec<String>,

    /// Output format token (mp4, webm, mkv, mp3, wav, m4a, opus, flac)
    #[serde(default = "default_format")]
    pub format: String,

    /// Quality label ("best", "worst", "1080p", "2160p 4K", "128")
    #[serde(default = "default_quality")]
    pub quality: String,

    /// Force audio-only output
    #[serde(default, alias = "audioOnly")]
    pub audio_only: bool,

    /// Cap on playlist/batch expansion (defaults to the configured maximum)
    #[serde(default, alias = "maxItems", skip_serializing_if = "Option::is_none")]
    pub max_items: Option<usize>,
}

fn default_format() -> String {
    "mp4".into()
}

fn default_quality() -> String {
    "best".into()
}

impl JobRequest {
    /// Request for a single URL with default format and quality
    pub fn single(url: impl Into<String>) -> Self {
        Self {
            urls: vec![url.into()],
            format: default_format(),
            quality: default_quality(),
            audio_only: false,
            max_items: None,
        }
    }
}

/// A validated unit of work
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct Job {
    /// Unique job id
    pub id: JobId,
    /// How the input expands into tasks
    pub kind: JobKind,
    /// Input URLs in submission order
    pub input_urls: Vec<String>,
    /// Requested output format
    pub format: OutputFormat,
    /// Quality ceiling
    pub quality: Quality,
    /// Effective expansion cap (already bounded by the batch ceiling)
    pub max_items: usize,
    /// Time the job was accepted
    pub created_at: DateTime<Utc>,
}

/// Task lifecycle state
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum TaskState {
    /// Waiting for a worker slot
    Pending,
    /// Holding a worker slot
    Running,
    /// Output promoted into the public store
    Succeeded {
        /// Promoted file
        path: PathBuf,
    },
    /// Terminal failure after retries
    Failed {
        /// Failure reason
        error: TaskError,
    },
}

impl TaskState {
    /// True for `Succeeded` and `Failed`
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskState::Succeeded { .. } | TaskState::Failed { .. })
    }
}

/// Machine-readable failure attached to a task outcome
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct TaskError {
    /// Error code (e.g. "bot_challenge", "upstream_unavailable", "timeout")
    pub code: String,
    /// Human-readable message
    pub message: String,
}

impl From<&crate::error::Error> for TaskError {
    fn from(error: &crate::error::Error) -> Self {
        use crate::error::ToHttpStatus;
        Self {
            code: error.error_code().to_string(),
            message: error.to_string(),
        }
    }
}

/// Result for one task of a job
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct UrlOutcome {
    /// URL the task was created for
    pub url: String,
    /// Extractor id, when known
    #[serde(skip_serializing_if = "Option::is_none")]
    pub media_id: Option<String>,
    /// Terminal state
    #[serde(flatten)]
    pub state: TaskState,
    /// Number of attempts made (including the first)
    pub attempts: u32,
    /// Catalog position of the strategy that succeeded
    #[serde(skip_serializing_if = "Option::is_none")]
    pub strategy: Option<usize>,
}

impl UrlOutcome {
    /// True when the task succeeded
    pub fn succeeded(&self) -> bool {
        matches!(self.state, TaskState::Succeeded { .. })
    }

    /// The failure, if the task failed
    pub fn error(&self) -> Option<&TaskError> {
        match &self.state {
            TaskState::Failed { error } => Some(error),
            _ => None,
        }
    }
}

/// Aggregate job status
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "kebab-case")]
pub enum JobStatus {
    /// Accepted, not started
    Queued,
    /// Tasks in flight
    Running,
    /// Every task succeeded
    Success,
    /// At least one task succeeded and at least one failed
    PartialSuccess,
    /// No task succeeded
    Failure,
}

impl JobStatus {
    /// Derive the terminal status from per-task outcomes
    pub fn from_outcomes(outcomes: &[UrlOutcome]) -> Self {
        let succeeded = outcomes.iter().filter(|o| o.succeeded()).count();
        if succeeded == 0 {
            JobStatus::Failure
        } else if succeeded == outcomes.len() {
            JobStatus::Success
        } else {
            JobStatus::PartialSuccess
        }
    }

    /// True once the job can no longer change
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Success | JobStatus::PartialSuccess | JobStatus::Failure
        )
    }
}

/// A finalized output in the public store
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Artifact {
    /// Location in the public store
    pub path: PathBuf,
    /// Suggested download file name
    pub name: String,
    /// Size on disk
    pub size_bytes: u64,
    /// Promotion time
    pub created_at: DateTime<Utc>,
    /// Time after which the retention sweep deletes it
    pub expires_at: DateTime<Utc>,
}

/// Aggregate result of a finished job
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct JobResult {
    /// Job id
    pub job_id: JobId,
    /// Terminal status
    pub status: JobStatus,
    /// One entry per task, in input order
    pub outcomes: Vec<UrlOutcome>,
    /// Deliverable (single file or archive), when anything succeeded
    #[serde(skip_serializing_if = "Option::is_none")]
    pub artifact: Option<Artifact>,
    /// Job-level failure that happened after the tasks (packaging)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<TaskError>,
    /// Completion time
    pub completed_at: DateTime<Utc>,
}

impl JobResult {
    /// Number of succeeded tasks
    pub fn succeeded(&self) -> usize {
        self.outcomes.iter().filter(|o| o.succeeded()).count()
    }

    /// Number of failed tasks
    pub fn failed(&self) -> usize {
        self.outcomes.len() - self.succeeded()
    }
}

/// Registry entry for a job inside the retention window
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct JobRecord {
    /// The submitted job
    pub job: Job,
    /// Current status
    pub status: JobStatus,
    /// Result once terminal
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<JobResult>,
}

/// Metadata returned by an info lookup
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct MediaInfo {
    /// Extractor id
    pub id: String,
    /// Title
    pub title: String,
    /// Duration in seconds
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_secs: Option<f64>,
    /// View count
    #[serde(skip_serializing_if = "Option::is_none")]
    pub view_count: Option<u64>,
    /// Cached thumbnail route, when a preview is available
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thumbnail: Option<String>,
}

/// Queue and store statistics
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct QueueStats {
    /// Tasks waiting for a worker slot
    pub queued_tasks: usize,
    /// Tasks holding a worker slot
    pub running_tasks: usize,
    /// Size of the worker pool
    pub max_concurrent_tasks: usize,
    /// Jobs not yet terminal
    pub active_jobs: usize,
    /// Files in the public store
    pub store_items: usize,
    /// Bytes in the public store
    pub store_bytes: u64,
}

/// What the running instance can do
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Capabilities {
    /// Extractor implementation name
    pub extractor: String,
    /// Usable credential sources, most preferred first
    pub credential_sources: Vec<String>,
    /// Number of strategies in the active catalog
    pub strategies: usize,
    /// Accepted output formats
    pub formats: Vec<OutputFormat>,
}

/// Event emitted during the job lifecycle
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// Job accepted
    JobQueued {
        /// Job id
        job_id: JobId,
        /// Job kind
        kind: JobKind,
        /// Number of input URLs
        urls: usize,
    },

    /// Task acquired a worker slot
    TaskStarted {
        /// Job id
        job_id: JobId,
        /// Task position within the job
        index: usize,
        /// Task URL
        url: String,
    },

    /// Task attempt failed and will be retried
    TaskRetrying {
        /// Job id
        job_id: JobId,
        /// Task position within the job
        index: usize,
        /// Retry number (1 for the first retry)
        attempt: u32,
        /// Error from the failed attempt
        error: String,
        /// Backoff before the next attempt
        delay_ms: u64,
    },

    /// Task output promoted
    TaskSucceeded {
        /// Job id
        job_id: JobId,
        /// Task position within the job
        index: usize,
        /// Task URL
        url: String,
    },

    /// Task failed terminally
    TaskFailed {
        /// Job id
        job_id: JobId,
        /// Task position within the job
        index: usize,
        /// Task URL
        url: String,
        /// Failure reason
        error: TaskError,
    },

    /// All tasks terminal and output packaged
    JobCompleted {
        /// Job id
        job_id: JobId,
        /// Aggregate status
        status: JobStatus,
        /// Succeeded task count
        succeeded: usize,
        /// Failed task count
        failed: usize,
    },

    /// Retention sweep deleted a stored file
    ArtifactExpired {
        /// Deleted path
        path: PathBuf,
    },

    /// Service shutting down
    Shutdown,
}
