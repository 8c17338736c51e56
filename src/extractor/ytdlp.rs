//! yt-dlp CLI extractor

use super::{ExtractOptions, Extractor, MediaDescriptor, PlaylistEntry};
use crate::config::ExtractorConfig;
use crate::format::PostProcess;
use crate::strategy::CredentialSource;
use async_trait::async_trait;
use serde::Deserialize;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;

/// Output template: title truncated to 200 bytes plus the id, so names stay unique
const OUTPUT_TEMPLATE: &str = "%(title).200B [%(id)s].%(ext)s";

/// Extractor backed by the external `yt-dlp` binary
///
/// Each call spawns one process. The process is killed if the calling future is dropped,
/// so task timeouts and job timeouts never leave a download running.
///
/// # Examples
///
/// ```no_run
/// use media_dl::extractor::{ExtractOptions, Extractor, YtDlpExtractor};
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let extractor = YtDlpExtractor::from_path().expect("yt-dlp not found in PATH");
/// let info = extractor
///     .resolve("https://www.youtube.com/watch?v=jNQXAC9IVRw", &ExtractOptions::default())
///     .await?;
/// println!("{}", info.title.unwrap_or_default());
/// # Ok(())
/// # }
/// ```
pub struct YtDlpExtractor {
    binary_path: PathBuf,
    probe_url: String,
    probe_timeout: Duration,
}

impl YtDlpExtractor {
    /// Create an extractor with an explicit binary path
    pub fn new(binary_path: PathBuf) -> Self {
        Self {
            binary_path,
            probe_url: ExtractorConfig::default().probe_url,
            probe_timeout: Duration::from_secs(60),
        }
    }

    /// Attempt to find yt-dlp in PATH
    pub fn from_path() -> Option<Self> {
        which::which("yt-dlp").ok().map(Self::new)
    }

    /// Locate the binary as configured: explicit path first, then PATH if allowed
    pub fn discover(config: &ExtractorConfig) -> Option<Self> {
        let found = match &config.binary_path {
            Some(path) if path.exists() => Some(Self::new(path.clone())),
            Some(path) => {
                tracing::warn!(path = %path.display(), "configured yt-dlp binary does not exist");
                None
            }
            None => None,
        };

        found
            .or_else(|| {
                if config.search_path {
                    Self::from_path()
                } else {
                    None
                }
            })
            .map(|extractor| extractor.with_probe(config.probe_url.clone(), config.attempt_timeout))
    }

    /// Set the URL and timeout used by credential probes
    pub fn with_probe(mut self, url: String, timeout: Duration) -> Self {
        self.probe_url = url;
        self.probe_timeout = timeout;
        self
    }

    /// Path of the binary in use
    pub fn binary_path(&self) -> &Path {
        &self.binary_path
    }

    async fn run(&self, args: Vec<OsString>) -> crate::Result<std::process::Output> {
        tracing::debug!(binary = %self.binary_path.display(), args = ?args, "running yt-dlp");

        Command::new(&self.binary_path)
            .args(args)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| crate::Error::ExternalTool(format!("Failed to execute yt-dlp: {}", e)))
    }
}

#[async_trait]
impl Extractor for YtDlpExtractor {
    async fn resolve(&self, url: &str, options: &ExtractOptions) -> crate::Result<MediaDescriptor> {
        let output = self.run(resolve_args(url, options)).await?;
        if !output.status.success() {
            return Err(crate::Error::Extractor(last_error_line(
                &String::from_utf8_lossy(&output.stderr),
            )));
        }
        parse_descriptor(&output.stdout)
    }

    async fn download(
        &self,
        url: &str,
        options: &ExtractOptions,
        output_dir: &Path,
    ) -> crate::Result<PathBuf> {
        let output = self.run(download_args(url, options, output_dir)).await?;
        if !output.status.success() {
            return Err(crate::Error::Extractor(last_error_line(
                &String::from_utf8_lossy(&output.stderr),
            )));
        }

        if let Some(path) = printed_path(&String::from_utf8_lossy(&output.stdout))
            && tokio::fs::try_exists(&path).await.unwrap_or(false)
        {
            return Ok(path);
        }

        largest_finished_file(output_dir).await?.ok_or_else(|| {
            crate::error::StorageError::NoOutput {
                path: output_dir.to_path_buf(),
            }
            .into()
        })
    }

    async fn probe_credential(&self, source: &CredentialSource) -> bool {
        match source {
            CredentialSource::None => true,
            CredentialSource::CookieFile(path) => tokio::fs::try_exists(path).await.unwrap_or(false),
            CredentialSource::Browser(browser) => {
                let mut args: Vec<OsString> = vec![
                    "--cookies-from-browser".into(),
                    browser.into(),
                    "--simulate".into(),
                    "--no-warnings".into(),
                    "--quiet".into(),
                ];
                args.push(self.probe_url.clone().into());

                match tokio::time::timeout(self.probe_timeout, self.run(args)).await {
                    Ok(Ok(output)) => output.status.success(),
                    Ok(Err(e)) => {
                        tracing::debug!(browser = %browser, error = %e, "credential probe failed to run");
                        false
                    }
                    Err(_) => {
                        tracing::debug!(browser = %browser, "credential probe timed out");
                        false
                    }
                }
            }
        }
    }

    fn name(&self) -> &'static str {
        "yt-dlp"
    }
}

/// Arguments shared by resolve and download calls
fn common_args(options: &ExtractOptions) -> Vec<OsString> {
    let mut args: Vec<OsString> = vec![
        "--no-warnings".into(),
        "--retries".into(),
        options.retries.to_string().into(),
        "--socket-timeout".into(),
        options.socket_timeout.as_secs().max(1).to_string().into(),
    ];

    if let Some(ua) = &options.user_agent {
        args.push("--user-agent".into());
        args.push(ua.into());
    }
    for (name, value) in &options.headers {
        args.push("--add-header".into());
        args.push(format!("{name}:{value}").into());
    }

    match &options.credential {
        CredentialSource::None => {}
        CredentialSource::Browser(browser) => {
            args.push("--cookies-from-browser".into());
            args.push(browser.into());
        }
        CredentialSource::CookieFile(path) => {
            args.push("--cookies".into());
            args.push(path.into());
        }
    }

    args.push("-f".into());
    args.push((&options.selector).into());
    args
}

fn resolve_args(url: &str, options: &ExtractOptions) -> Vec<OsString> {
    let mut args = vec![OsString::from("--dump-single-json")];
    args.extend(common_args(options));

    match options.playlist_limit {
        Some(limit) => {
            args.push("--flat-playlist".into());
            args.push("--playlist-end".into());
            args.push(limit.to_string().into());
        }
        None => args.push("--no-playlist".into()),
    }

    args.push("--".into());
    args.push(url.into());
    args
}

fn download_args(url: &str, options: &ExtractOptions, output_dir: &Path) -> Vec<OsString> {
    let mut args: Vec<OsString> = vec![
        "-o".into(),
        output_dir.join(OUTPUT_TEMPLATE).into(),
        "--no-mtime".into(),
        "--no-playlist".into(),
        "--print".into(),
        "after_move:filepath".into(),
    ];
    args.extend(common_args(options));

    match &options.postprocess {
        PostProcess::None => {}
        PostProcess::Merge(container) => {
            args.push("--merge-output-format".into());
            args.push(container.as_str().into());
        }
        PostProcess::ExtractAudio {
            codec,
            bitrate_kbps,
        } => {
            args.push("-x".into());
            args.push("--audio-format".into());
            args.push(codec.as_str().into());
            args.push("--audio-quality".into());
            args.push(format!("{bitrate_kbps}K").into());
        }
    }

    args.push("--".into());
    args.push(url.into());
    args
}

/// The last `ERROR:` line of stderr, or the last non-empty line when none is tagged
fn last_error_line(stderr: &str) -> String {
    let lines = stderr.lines().map(str::trim).filter(|l| !l.is_empty());

    lines
        .clone()
        .filter_map(|l| l.strip_prefix("ERROR:"))
        .last()
        .map(|l| l.trim().to_string())
        .or_else(|| lines.last().map(str::to_string))
        .unwrap_or_else(|| "yt-dlp exited with an error and no output".into())
}

/// Final file path printed by `--print after_move:filepath`
fn printed_path(stdout: &str) -> Option<PathBuf> {
    stdout
        .lines()
        .map(str::trim)
        .rfind(|l| !l.is_empty())
        .map(PathBuf::from)
}

/// Largest regular file in `dir`, ignoring yt-dlp leftovers
async fn largest_finished_file(dir: &Path) -> crate::Result<Option<PathBuf>> {
    let mut entries = tokio::fs::read_dir(dir).await?;
    let mut best: Option<(u64, PathBuf)> = None;

    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        let name = entry.file_name().to_string_lossy().to_string();
        if name.ends_with(".part") || name.ends_with(".ytdl") || name.starts_with('.') {
            continue;
        }
        let metadata = entry.metadata().await?;
        if !metadata.is_file() {
            continue;
        }
        if best.as_ref().is_none_or(|(size, _)| metadata.len() > *size) {
            best = Some((metadata.len(), path));
        }
    }

    Ok(best.map(|(_, path)| path))
}

#[derive(Deserialize)]
struct RawInfo {
    id: String,
    title: Option<String>,
    duration: Option<f64>,
    view_count: Option<u64>,
    thumbnail: Option<String>,
    webpage_url: Option<String>,
    #[serde(default)]
    entries: Option<Vec<Option<RawEntry>>>,
}

#[derive(Deserialize)]
struct RawEntry {
    id: Option<String>,
    url: Option<String>,
    webpage_url: Option<String>,
    title: Option<String>,
}

fn parse_descriptor(stdout: &[u8]) -> crate::Result<MediaDescriptor> {
    let raw: RawInfo = serde_json::from_slice(stdout)?;

    let entries = raw
        .entries
        .unwrap_or_default()
        .into_iter()
        .flatten()
        .filter_map(|entry| {
            let url = entry.webpage_url.or(entry.url)?;
            Some(PlaylistEntry {
                id: entry.id.unwrap_or_default(),
                url,
                title: entry.title,
            })
        })
        .collect();

    Ok(MediaDescriptor {
        id: raw.id,
        title: raw.title,
        duration_secs: raw.duration,
        view_count: raw.view_count,
        thumbnail: raw.thumbnail,
        webpage_url: raw.webpage_url,
        entries,
    })
}
