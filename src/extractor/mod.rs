//! External media extractor boundary
//!
//! The [`Extractor`] trait is the only way the crate talks to the upstream. It resolves
//! metadata and downloads a single item into a directory. Format conversion is requested
//! through [`PostProcess`] and performed by the extractor's own transcoder hook.
//!
//! [`YtDlpExtractor`] drives the `yt-dlp` binary. [`UnavailableExtractor`] stands in when no
//! binary can be found so the rest of the service (API, sweeper, cached thumbnails) keeps
//! working and every job fails with a clear error.

mod noop;
mod ytdlp;

pub use noop::UnavailableExtractor;
pub use ytdlp::YtDlpExtractor;

use crate::format::PostProcess;
use crate::strategy::CredentialSource;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Options for one extractor invocation, assembled from a strategy
#[derive(Clone, Debug)]
pub struct ExtractOptions {
    /// Format selector expression
    pub selector: String,
    /// Cookie source for this attempt
    pub credential: CredentialSource,
    /// User-agent header
    pub user_agent: Option<String>,
    /// Extra HTTP headers
    pub headers: BTreeMap<String, String>,
    /// Network retries inside the extractor
    pub retries: u32,
    /// Socket timeout inside the extractor
    pub socket_timeout: Duration,
    /// Transcoder step after download
    pub postprocess: PostProcess,
    /// Resolve playlists flat, keeping at most this many entries
    pub playlist_limit: Option<usize>,
}

impl Default for ExtractOptions {
    fn default() -> Self {
        Self {
            selector: "best".into(),
            credential: CredentialSource::None,
            user_agent: None,
            headers: BTreeMap::new(),
            retries: 3,
            socket_timeout: Duration::from_secs(30),
            postprocess: PostProcess::None,
            playlist_limit: None,
        }
    }
}

/// Structured metadata returned by [`Extractor::resolve`]
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct MediaDescriptor {
    /// Extractor-assigned id
    pub id: String,
    /// Title
    pub title: Option<String>,
    /// Duration in seconds
    pub duration_secs: Option<f64>,
    /// View count
    pub view_count: Option<u64>,
    /// Remote thumbnail URL
    pub thumbnail: Option<String>,
    /// Canonical page URL
    pub webpage_url: Option<String>,
    /// Playlist entries (empty for single items)
    pub entries: Vec<PlaylistEntry>,
}

impl MediaDescriptor {
    /// True when the descriptor describes a playlist
    pub fn is_playlist(&self) -> bool {
        !self.entries.is_empty()
    }
}

/// One entry of a flat-resolved playlist
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaylistEntry {
    /// Extractor-assigned id
    pub id: String,
    /// URL to download the entry from
    pub url: String,
    /// Entry title
    pub title: Option<String>,
}

/// External extractor capability (analogous to yt-dlp)
///
/// Implementations return [`crate::Error::Extractor`] with the upstream's message for
/// failures they cannot classify; the fallback chain classifies them by keyword.
#[async_trait]
pub trait Extractor: Send + Sync {
    /// Resolve metadata for a URL without downloading media
    async fn resolve(&self, url: &str, options: &ExtractOptions) -> crate::Result<MediaDescriptor>;

    /// Download one item into `output_dir` and return the produced file
    async fn download(
        &self,
        url: &str,
        options: &ExtractOptions,
        output_dir: &Path,
    ) -> crate::Result<PathBuf>;

    /// Check once whether a credential source is usable
    ///
    /// The default accepts every source.
    async fn probe_credential(&self, _source: &CredentialSource) -> bool {
        true
    }

    /// Implementation name for logs and capabilities
    fn name(&self) -> &'static str;
}
