//! Configuration types for media-dl

use serde::{Deserialize, Serialize};
use std::{
    collections::BTreeMap,
    net::SocketAddr,
    path::{Component, Path, PathBuf},
    time::Duration,
};
use utoipa::ToSchema;

/// Extractor settings (binary discovery, credential sources, user agents)
///
/// Used as a nested sub-config within [`Config`].
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct ExtractorConfig {
    /// Path to the yt-dlp executable (auto-detected if None)
    #[serde(default)]
    pub binary_path: Option<PathBuf>,

    /// Whether to search PATH for the extractor binary if no explicit path is set (default: true)
    #[serde(default = "default_true")]
    pub search_path: bool,

    /// Netscape-format cookie file offered as a credential source
    #[serde(default)]
    pub cookie_file: Option<PathBuf>,

    /// Browsers whose cookie stores are probed at startup, in preference order
    #[serde(default = "default_cookie_browsers")]
    pub cookie_browsers: Vec<String>,

    /// URL used by the one-time credential probe
    #[serde(default = "default_probe_url")]
    pub probe_url: String,

    /// Equivalent user-agent strings; one is picked at random per strategy
    #[serde(default = "default_user_agents")]
    pub user_agents: Vec<String>,

    /// Extra HTTP headers passed on every extractor call
    #[serde(default = "default_headers")]
    pub headers: BTreeMap<String, String>,

    /// Network retries performed inside the extractor itself (default: 3)
    #[serde(default = "default_extractor_retries")]
    pub retries: u32,

    /// Socket timeout handed to the extractor (default: 30 seconds)
    #[serde(default = "default_socket_timeout", with = "duration_serde")]
    pub socket_timeout: Duration,

    /// Budget for a single metadata-resolution attempt (default: 60 seconds)
    #[serde(default = "default_attempt_timeout", with = "duration_serde")]
    pub attempt_timeout: Duration,

    /// Lower bound of the pause inserted between strategies, in milliseconds (default: 1000)
    #[serde(default = "default_jitter_min_ms")]
    pub strategy_jitter_min_ms: u64,

    /// Upper bound of the pause inserted between strategies, in milliseconds (default: 3000)
    #[serde(default = "default_jitter_max_ms")]
    pub strategy_jitter_max_ms: u64,
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        Self {
            binary_path: None,
            search_path: true,
            cookie_file: None,
            cookie_browsers: default_cookie_browsers(),
            probe_url: default_probe_url(),
            user_agents: default_user_agents(),
            headers: default_headers(),
            retries: default_extractor_retries(),
            socket_timeout: default_socket_timeout(),
            attempt_timeout: default_attempt_timeout(),
            strategy_jitter_min_ms: default_jitter_min_ms(),
            strategy_jitter_max_ms: default_jitter_max_ms(),
        }
    }
}

/// Download behavior configuration (directories, concurrency, limits)
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct DownloadConfig {
    /// Public artifact store (default: "./downloads")
    #[serde(default = "default_store_dir")]
    pub store_dir: PathBuf,

    /// Root for per-task workspaces (default: "./workspaces")
    #[serde(default = "default_workspace_dir")]
    pub workspace_dir: PathBuf,

    /// Maximum concurrent tasks across all jobs (default: 3)
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent_tasks: usize,

    /// Wall-clock budget for one task attempt (default: 10 minutes)
    #[serde(default = "default_task_timeout", with = "duration_serde")]
    pub task_timeout: Duration,

    /// Stop waiting for a job's stragglers after this long (None = wait for all)
    #[serde(default, with = "optional_duration_serde")]
    pub job_timeout: Option<Duration>,

    /// Default cap on playlist/batch expansion (default: 50)
    #[serde(default = "default_max_items")]
    pub max_items: usize,

    /// Hard ceiling on tasks per job regardless of the requested cap (default: 25)
    #[serde(default = "default_max_batch_size")]
    pub max_batch_size: usize,

    /// Maximum size of any promoted artifact or archive in bytes (default: 2 GiB)
    #[serde(default = "default_max_artifact_bytes")]
    pub max_artifact_bytes: u64,

    /// Audio bitrate in kbps for audio extraction (default: 192)
    #[serde(default = "default_audio_bitrate")]
    pub audio_bitrate_kbps: u32,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            store_dir: default_store_dir(),
            workspace_dir: default_workspace_dir(),
            max_concurrent_tasks: default_max_concurrent(),
            task_timeout: default_task_timeout(),
            job_timeout: None,
            max_items: default_max_items(),
            max_batch_size: default_max_batch_size(),
            max_artifact_bytes: default_max_artifact_bytes(),
            audio_bitrate_kbps: default_audio_bitrate(),
        }
    }
}

/// Retry configuration for transient task failures
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct RetryConfig {
    /// Maximum number of retry attempts after the first try (default: 3)
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Initial delay before first retry (default: 1 second)
    #[serde(default = "default_initial_delay", with = "duration_serde")]
    pub initial_delay: Duration,

    /// Maximum delay between retries (default: 30 seconds)
    #[serde(default = "default_max_delay", with = "duration_serde")]
    pub max_delay: Duration,

    /// Multiplier for exponential backoff (default: 2.0)
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,

    /// Add random jitter to delays (default: true)
    #[serde(default = "default_true")]
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_delay: default_initial_delay(),
            max_delay: default_max_delay(),
            backoff_multiplier: default_backoff_multiplier(),
            jitter: true,
        }
    }
}

/// Retention sweep configuration
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct RetentionConfig {
    /// Enable the background sweep (default: true)
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Time between sweeps (default: 1 hour)
    #[serde(default = "default_sweep_interval", with = "duration_serde")]
    pub sweep_interval: Duration,

    /// Age after which store artifacts are deleted (default: 24 hours)
    #[serde(default = "default_artifact_ttl", with = "duration_serde")]
    pub artifact_ttl: Duration,

    /// Thumbnail expiry as a multiple of `artifact_ttl` (default: 7)
    #[serde(default = "default_thumbnail_ttl_factor")]
    pub thumbnail_ttl_factor: u32,
}

impl RetentionConfig {
    /// Age after which cached thumbnails are deleted
    pub fn thumbnail_ttl(&self) -> Duration {
        self.artifact_ttl
            .saturating_mul(self.thumbnail_ttl_factor.max(1))
    }
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            sweep_interval: default_sweep_interval(),
            artifact_ttl: default_artifact_ttl(),
            thumbnail_ttl_factor: default_thumbnail_ttl_factor(),
        }
    }
}

/// Thumbnail cache configuration
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct ThumbnailConfig {
    /// Cache directory (default: "./thumbnails")
    #[serde(default = "default_thumbnail_dir")]
    pub dir: PathBuf,

    /// Bounding box width (default: 640)
    #[serde(default = "default_thumbnail_width")]
    pub max_width: u32,

    /// Bounding box height (default: 360)
    #[serde(default = "default_thumbnail_height")]
    pub max_height: u32,

    /// Timeout for fetching a remote image (default: 15 seconds)
    #[serde(default = "default_thumbnail_timeout", with = "duration_serde")]
    pub fetch_timeout: Duration,

    /// Largest accepted remote image in bytes (default: 10 MiB)
    #[serde(default = "default_thumbnail_max_bytes")]
    pub max_fetch_bytes: u64,
}

impl Default for ThumbnailConfig {
    fn default() -> Self {
        Self {
            dir: default_thumbnail_dir(),
            max_width: default_thumbnail_width(),
            max_height: default_thumbnail_height(),
            fetch_timeout: default_thumbnail_timeout(),
            max_fetch_bytes: default_thumbnail_max_bytes(),
        }
    }
}

/// API and external server integration
#[derive(Clone, Debug, Default, Serialize, Deserialize, ToSchema)]
pub struct ServerIntegrationConfig {
    /// REST API configuration
    #[serde(default)]
    pub api: ApiConfig,
}

/// REST API configuration
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct ApiConfig {
    /// Address to bind to (default: 127.0.0.1:6790)
    #[serde(default = "default_bind_address")]
    pub bind_address: SocketAddr,

    /// Enable CORS for browser access (default: true)
    #[serde(default = "default_true")]
    pub cors_enabled: bool,

    /// Allowed CORS origins (default: ["*"])
    #[serde(default = "default_cors_origins")]
    pub cors_origins: Vec<String>,

    /// Enable Swagger UI at /swagger-ui (default: true)
    #[serde(default = "default_true")]
    pub swagger_ui: bool,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            cors_enabled: true,
            cors_origins: default_cors_origins(),
            swagger_ui: true,
        }
    }
}

/// Main configuration for MediaDownloader
///
/// Fields are organized into logical sub-configs:
/// - [`extractor`](ExtractorConfig): binary discovery, credentials, user agents
/// - [`download`](DownloadConfig): directories, concurrency, limits
/// - [`retry`](RetryConfig): per-task backoff
/// - [`retention`](RetentionConfig): expiry windows and sweep interval
/// - [`thumbnails`](ThumbnailConfig): preview cache
/// - [`server`](ServerIntegrationConfig): REST API
#[derive(Clone, Debug, Default, Serialize, Deserialize, ToSchema)]
pub struct Config {
    /// Extractor settings
    #[serde(default)]
    pub extractor: ExtractorConfig,

    /// Download behavior settings
    #[serde(default)]
    pub download: DownloadConfig,

    /// Retry policy for tasks
    #[serde(default)]
    pub retry: RetryConfig,

    /// Retention sweep settings
    #[serde(default)]
    pub retention: RetentionConfig,

    /// Thumbnail cache settings
    #[serde(default)]
    pub thumbnails: ThumbnailConfig,

    /// API server settings
    #[serde(default)]
    pub server: ServerIntegrationConfig,
}

impl Config {
    /// Public artifact store directory
    pub fn store_dir(&self) -> &PathBuf {
        &self.download.store_dir
    }

    /// Workspace root directory
    pub fn workspace_dir(&self) -> &PathBuf {
        &self.download.workspace_dir
    }

    /// Reject settings that would make the executor unusable
    pub fn validate(&self) -> crate::error::Result<()> {
        if self.download.max_concurrent_tasks == 0 {
            return Err(crate::error::Error::Config {
                message: "max_concurrent_tasks must be at least 1".into(),
                key: Some("download.max_concurrent_tasks".into()),
            });
        }
        if self.download.max_batch_size == 0 {
            return Err(crate::error::Error::Config {
                message: "max_batch_size must be at least 1".into(),
                key: Some("download.max_batch_size".into()),
            });
        }
        // Leftover workspaces are wiped at startup, so nothing else may live in that tree
        let workspace = lexical_absolute(&self.download.workspace_dir);
        for (other, name) in [
            (&self.download.store_dir, "store_dir"),
            (&self.thumbnails.dir, "thumbnails.dir"),
        ] {
            let other = lexical_absolute(other);
            if other.starts_with(&workspace) || workspace.starts_with(&other) {
                return Err(crate::error::Error::Config {
                    message: format!(
                        "workspace_dir must not equal, contain or sit inside {name}"
                    ),
                    key: Some("download.workspace_dir".into()),
                });
            }
        }
        if self.extractor.strategy_jitter_min_ms > self.extractor.strategy_jitter_max_ms {
            return Err(crate::error::Error::Config {
                message: "strategy jitter minimum exceeds maximum".into(),
                key: Some("extractor.strategy_jitter_min_ms".into()),
            });
        }
        Ok(())
    }
}

/// Absolute form of `path` with `.` and `..` folded away, without touching the filesystem
fn lexical_absolute(path: &Path) -> PathBuf {
    let joined = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .map(|cwd| cwd.join(path))
            .unwrap_or_else(|_| path.to_path_buf())
    };

    let mut out = PathBuf::new();
    for component in joined.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other),
        }
    }
    out
}

// Default value functions
fn default_true() -> bool {
    true
}

fn default_cookie_browsers() -> Vec<String> {
    vec!["chrome".into(), "firefox".into(), "edge".into(), "safari".into()]
}

fn default_probe_url() -> String {
    "https://www.youtube.com/watch?v=jNQXAC9IVRw".into()
}

fn default_user_agents() -> Vec<String> {
    vec![
        "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36".into(),
        "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36".into(),
        "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:125.0) Gecko/20100101 Firefox/125.0".into(),
        "Mozilla/5.0 (Macintosh; Intel Mac OS X 14_4) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.4 Safari/605.1.15".into(),
    ]
}

fn default_headers() -> BTreeMap<String, String> {
    BTreeMap::from([
        ("Accept-Language".into(), "en-US,en;q=0.9".into()),
        (
            "Accept".into(),
            "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8".into(),
        ),
    ])
}

fn default_extractor_retries() -> u32 {
    3
}

fn default_socket_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_attempt_timeout() -> Duration {
    Duration::from_secs(60)
}

fn default_jitter_min_ms() -> u64 {
    1000
}

fn default_jitter_max_ms() -> u64 {
    3000
}

fn default_store_dir() -> PathBuf {
    PathBuf::from("downloads")
}

fn default_workspace_dir() -> PathBuf {
    PathBuf::from("workspaces")
}

fn default_max_concurrent() -> usize {
    3
}

fn default_task_timeout() -> Duration {
    Duration::from_secs(600)
}

fn default_max_items() -> usize {
    50
}

fn default_max_batch_size() -> usize {
    25
}

fn default_max_artifact_bytes() -> u64 {
    2 * 1024 * 1024 * 1024 // 2 GiB
}

fn default_audio_bitrate() -> u32 {
    192
}

fn default_max_attempts() -> u32 {
    3
}

fn default_initial_delay() -> Duration {
    Duration::from_secs(1)
}

fn default_max_delay() -> Duration {
    Duration::from_secs(30)
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

fn default_sweep_interval() -> Duration {
    Duration::from_secs(60 * 60)
}

fn default_artifact_ttl() -> Duration {
    Duration::from_secs(24 * 60 * 60)
}

fn default_thumbnail_ttl_factor() -> u32 {
    7
}

fn default_thumbnail_dir() -> PathBuf {
    PathBuf::from("thumbnails")
}

fn default_thumbnail_width() -> u32 {
    640
}

fn default_thumbnail_height() -> u32 {
    360
}

fn default_thumbnail_timeout() -> Duration {
    Duration::from_secs(15)
}

fn default_thumbnail_max_bytes() -> u64 {
    10 * 1024 * 1024
}

fn default_bind_address() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 6790))
}

fn default_cors_origins() -> Vec<String> {
    vec!["*".into()]
}

// Duration serialization helper
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_secs())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}

// Optional Duration serialization helper
mod optional_duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match duration {
            Some(d) => serializer.serialize_some(&d.as_secs()),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = Option::<u64>::deserialize(deserializer)?;
        Ok(secs.map(Duration::from_secs))
    }
}
