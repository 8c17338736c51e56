//! Error types for media-dl
//!
//! This module provides error handling for the whole crate:
//! - The job-level failure taxonomy (invalid input, upstream unavailable, bot challenge, ...)
//! - Storage errors for workspace, store and archive I/O
//! - HTTP status code mapping for API integration
//! - Structured error responses with machine-readable error codes

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;
use utoipa::ToSchema;

/// Result type alias for media-dl operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for media-dl
///
/// Task-level failures are recorded per URL in the job result using these variants,
/// so the `Display` output doubles as the human-readable failure reason.
#[derive(Debug, Error)]
pub enum Error {
    /// Malformed or unsupported URL, format or quality (rejected before any task runs)
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// The item is private, deleted or region-blocked
    #[error("upstream unavailable: {0}")]
    UpstreamUnavailable(String),

    /// The upstream throttled every strategy
    #[error("rate limited: {0}")]
    RateLimited(String),

    /// The upstream demanded bot verification on every strategy
    #[error("bot challenge: {0}")]
    BotChallenge(String),

    /// A task or extractor attempt exceeded its deadline
    #[error("timed out after {}s", .after.as_secs())]
    Timeout {
        /// The budget that was exceeded
        after: Duration,
    },

    /// Output would exceed the configured maximum artifact size
    #[error("output of {size} bytes exceeds the {limit} byte limit")]
    SizeExceeded {
        /// Combined size of the rejected output
        size: u64,
        /// Configured maximum
        limit: u64,
    },

    /// Workspace, store or archive I/O failure
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// Extractor failure that matched no known signature (treated as fatal)
    #[error("extractor error: {0}")]
    Extractor(String),

    /// Connection-level failure reported by the extractor (eligible for retry)
    #[error("transient upstream error: {0}")]
    TransientUpstream(String),

    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g., "download.store_dir")
        key: Option<String>,
    },

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Network error
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Job or resource not found
    #[error("not found: {0}")]
    NotFound(String),

    /// Shutdown in progress - not accepting new jobs
    #[error("shutdown in progress: not accepting new jobs")]
    ShuttingDown,

    /// External tool could not be executed (yt-dlp missing, spawn failure, ...)
    #[error("external tool error: {0}")]
    ExternalTool(String),

    /// Operation not supported
    #[error("not supported: {0}")]
    NotSupported(String),

    /// Thumbnail could not be fetched or decoded
    #[error("thumbnail error: {0}")]
    Thumbnail(String),

    /// API server error
    #[error("API server error: {0}")]
    ApiServerError(String),

    /// Other error
    #[error("{0}")]
    Other(String),
}

/// Workspace, public store and archive errors
///
/// Any of these on a task path releases the task's workspace before surfacing.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Failed to create a workspace directory
    #[error("failed to create workspace {path}: {reason}")]
    WorkspaceCreateFailed {
        /// Workspace path that could not be created
        path: PathBuf,
        /// Underlying reason
        reason: String,
    },

    /// The workspace held no file matching the selection rule
    #[error("no output matching the selection rule in {path}")]
    NoOutput {
        /// Workspace path that was scanned
        path: PathBuf,
    },

    /// Moving an output into the public store failed
    #[error("failed to move {source_path} to {dest_path}: {reason}")]
    MoveFailed {
        /// File being moved
        source_path: PathBuf,
        /// Destination inside the public store
        dest_path: PathBuf,
        /// Underlying reason
        reason: String,
    },

    /// Archive creation failed (the partial archive has been removed)
    #[error("failed to write archive {path}: {reason}")]
    ArchiveFailed {
        /// Target archive path
        path: PathBuf,
        /// Underlying reason
        reason: String,
    },

    /// Removing a workspace failed
    #[error("failed to release workspace {path}: {reason}")]
    ReleaseFailed {
        /// Workspace path
        path: PathBuf,
        /// Underlying reason
        reason: String,
    },
}

/// API error response format
///
/// # Example JSON Response
///
/// ```json
/// {
///   "error": {
///     "code": "size_exceeded",
///     "message": "output of 3000 bytes exceeds the 1000 byte limit",
///     "details": { "size_bytes": 3000, "limit_bytes": 1000 }
///   }
/// }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ApiError {
    /// The error details
    pub error: ErrorDetail,
}

/// Detailed error information for API responses
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ErrorDetail {
    /// Machine-readable error code (e.g., "not_found", "invalid_input")
    pub code: String,

    /// Human-readable error message
    pub message: String,

    /// Optional additional context about the error
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl ApiError {
    /// Create a new API error with code and message
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: ErrorDetail {
                code: code.into(),
                message: message.into(),
                details: None,
            },
        }
    }

    /// Create an API error with additional details
    pub fn with_details(
        code: impl Into<String>,
        message: impl Into<String>,
        details: serde_json::Value,
    ) -> Self {
        Self {
            error: ErrorDetail {
                code: code.into(),
                message: message.into(),
                details: Some(details),
            },
        }
    }

    /// Create a "not found" error
    pub fn not_found(resource: impl Into<String>) -> Self {
        Self::new("not_found", format!("{} not found", resource.into()))
    }

    /// Create a "validation error" error
    pub fn validation(message: impl Into<String>) -> Self {
        Self::new("validation_error", message)
    }

    /// Create an "internal server error"
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new("internal_error", message)
    }

    /// Create a "service unavailable" error
    pub fn service_unavailable(message: impl Into<String>) -> Self {
        Self::new("service_unavailable", message)
    }
}

/// Convert errors to HTTP status codes for API responses
pub trait ToHttpStatus {
    /// Get the HTTP status code for this error
    fn status_code(&self) -> u16;

    /// Get the machine-readable error code
    fn error_code(&self) -> &str;
}

impl ToHttpStatus for Error {
    fn status_code(&self) -> u16 {
        match self {
            // 400 Bad Request - Client error (invalid input)
            Error::InvalidInput(_) => 400,
            Error::Config { .. } => 400,

            // 404 Not Found
            Error::NotFound(_) => 404,

            // 410 Gone - the item itself is private/deleted/blocked
            Error::UpstreamUnavailable(_) => 410,

            // 413 Payload Too Large
            Error::SizeExceeded { .. } => 413,

            // 429 Too Many Requests - caller may retry later
            Error::RateLimited(_) => 429,
            Error::BotChallenge(_) => 429,

            // 500 Internal Server Error - Server-side issues
            Error::Storage(_) => 500,
            Error::Io(_) => 500,
            Error::Serialization(_) => 500,
            Error::ApiServerError(_) => 500,
            Error::Other(_) => 500,

            // 501 Not Implemented
            Error::NotSupported(_) => 501,

            // 502 Bad Gateway - External service errors
            Error::Extractor(_) => 502,
            Error::TransientUpstream(_) => 502,
            Error::Network(_) => 502,
            Error::Thumbnail(_) => 502,

            // 503 Service Unavailable
            Error::ShuttingDown => 503,
            Error::ExternalTool(_) => 503,

            // 504 Gateway Timeout
            Error::Timeout { .. } => 504,
        }
    }

    fn error_code(&self) -> &str {
        match self {
            Error::InvalidInput(_) => "invalid_input",
            Error::UpstreamUnavailable(_) => "upstream_unavailable",
            Error::RateLimited(_) => "rate_limited",
            Error::BotChallenge(_) => "bot_challenge",
            Error::Timeout { .. } => "timeout",
            Error::SizeExceeded { .. } => "size_exceeded",
            Error::Storage(e) => match e {
                StorageError::WorkspaceCreateFailed { .. } => "workspace_create_failed",
                StorageError::NoOutput { .. } => "no_output",
                StorageError::MoveFailed { .. } => "move_failed",
                StorageError::ArchiveFailed { .. } => "archive_failed",
                StorageError::ReleaseFailed { .. } => "release_failed",
            },
            Error::Extractor(_) => "extractor_error",
            Error::TransientUpstream(_) => "transient_upstream",
            Error::Config { .. } => "config_error",
            Error::Io(_) => "io_error",
            Error::Network(_) => "network_error",
            Error::Serialization(_) => "serialization_error",
            Error::NotFound(_) => "not_found",
            Error::ShuttingDown => "shutting_down",
            Error::ExternalTool(_) => "external_tool_error",
            Error::NotSupported(_) => "not_supported",
            Error::Thumbnail(_) => "thumbnail_error",
            Error::ApiServerError(_) => "api_server_error",
            Error::Other(_) => "internal_error",
        }
    }
}

impl From<Error> for ApiError {
    fn from(error: Error) -> Self {
        let code = error.error_code().to_string();
        let message = error.to_string();

        let details = match &error {
            Error::SizeExceeded { size, limit } => Some(serde_json::json!({
                "size_bytes": size,
                "limit_bytes": limit,
            })),
            Error::Timeout { after } => Some(serde_json::json!({
                "timeout_secs": after.as_secs(),
            })),
            Error::Config { key: Some(key), .. } => Some(serde_json::json!({
                "key": key,
            })),
            Error::Storage(StorageError::MoveFailed {
                source_path,
                dest_path,
                ..
            }) => Some(serde_json::json!({
                "source_path": source_path,
                "dest_path": dest_path,
            })),
            Error::Storage(StorageError::ArchiveFailed { path, .. }) => Some(serde_json::json!({
                "path": path,
            })),
            _ => None,
        };

        ApiError {
            error: ErrorDetail {
                code,
                message,
                details,
            },
        }
    }
}
