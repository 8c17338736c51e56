//! OpenAPI documentation and schema generation
//!
//! Defines the OpenAPI specification for the media-dl REST API using utoipa for
//! compile-time spec generation.

use utoipa::OpenApi;

/// OpenAPI documentation for the media-dl REST API
///
/// The spec can be accessed via:
/// - `/openapi.json` - JSON format OpenAPI specification
/// - `/swagger-ui` - Interactive Swagger UI documentation
#[derive(OpenApi)]
#[openapi(
    info(
        title = "media-dl REST API",
        version = "0.1.0",
        description = "Submit media retrieval jobs, fetch their artifacts and look up media metadata",
        license(
            name = "MIT OR Apache-2.0"
        )
    ),
    servers(
        (url = "http://localhost:6790", description = "Local development server")
    ),
    paths(
        // Jobs
        crate::api::routes::submit_job,
        crate::api::routes::list_jobs,
        crate::api::routes::get_job,
        crate::api::routes::get_artifact,
        crate::api::routes::download,

        // Media
        crate::api::routes::get_info,
        crate::api::routes::get_thumbnail,

        // System
        crate::api::routes::queue_stats,
        crate::api::routes::get_capabilities,
        crate::api::routes::health_check,
        crate::api::routes::openapi_spec,
        crate::api::routes::event_stream,
        crate::api::routes::shutdown,
    ),
    components(schemas(
        // Core types from types.rs
        crate::types::JobId,
        crate::types::JobKind,
        crate::types::JobRequest,
        crate::types::Job,
        crate::types::JobStatus,
        crate::types::JobRecord,
        crate::types::JobResult,
        crate::types::UrlOutcome,
        crate::types::TaskState,
        crate::types::TaskError,
        crate::types::Artifact,
        crate::types::OutputFormat,
        crate::types::Quality,
        crate::types::MediaKind,
        crate::types::MediaRef,
        crate::types::MediaInfo,
        crate::types::QueueStats,
        crate::types::Capabilities,
        crate::types::Event,

        // Config types from config.rs
        crate::config::Config,
        crate::config::ExtractorConfig,
        crate::config::DownloadConfig,
        crate::config::RetryConfig,
        crate::config::RetentionConfig,
        crate::config::ThumbnailConfig,
        crate::config::ServerIntegrationConfig,
        crate::config::ApiConfig,

        // API request/response types from routes
        crate::api::routes::JobAccepted,
        crate::api::routes::InfoRequest,
        crate::api::routes::DownloadSummary,

        // Error types from error.rs
        crate::error::ApiError,
        crate::error::ErrorDetail,
    )),
    tags(
        (name = "jobs", description = "Jobs - Submit URLs, poll outcomes and fetch artifacts"),
        (name = "media", description = "Media - Metadata lookups and cached thumbnails"),
        (name = "system", description = "System endpoints - Health checks, stats, OpenAPI spec, events, shutdown"),
    )
)]
pub struct ApiDoc;
