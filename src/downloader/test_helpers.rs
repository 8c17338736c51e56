//! Shared test helpers for creating MediaDownloader instances in tests.

use crate::config::Config;
use crate::downloader::MediaDownloader;
use crate::error::{Error, Result};
use crate::extractor::{ExtractOptions, Extractor, MediaDescriptor, PlaylistEntry};
use crate::strategy::CredentialSource;
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::tempdir;

/// What the scripted extractor does for one URL
#[derive(Clone, Debug)]
pub(crate) enum Script {
    /// Write a file with this name and return its path
    Produce { name: String, bytes: Vec<u8> },
    /// Write `name` but report `reported`, as when a postprocessor renames the output
    Moved {
        reported: String,
        name: String,
        bytes: Vec<u8>,
    },
    /// Fail every call with this extractor message
    Fail(String),
    /// Fail the first `times` calls with `message`, then follow `then`
    FailTimes {
        times: usize,
        message: String,
        then: Box<Script>,
    },
    /// Never finish
    Hang,
    /// Resolve as a playlist of (id, url) entries
    Playlist(Vec<(String, String)>),
}

impl Script {
    pub(crate) fn produce(name: &str, bytes: &[u8]) -> Self {
        Script::Produce {
            name: name.to_string(),
            bytes: bytes.to_vec(),
        }
    }
}

/// In-process extractor that follows a per-URL script and counts calls
#[derive(Default)]
pub(crate) struct ScriptedExtractor {
    scripts: HashMap<String, Script>,
    calls: Mutex<HashMap<String, usize>>,
    credentials_seen: Mutex<Vec<CredentialSource>>,
}

impl ScriptedExtractor {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn on(mut self, url: &str, script: Script) -> Self {
        self.scripts.insert(url.to_string(), script);
        self
    }

    /// Extractor invocations (resolve + download) made for `url`
    pub(crate) fn calls(&self, url: &str) -> usize {
        self.calls.lock().unwrap().get(url).copied().unwrap_or(0)
    }

    pub(crate) fn credentials_seen(&self) -> Vec<CredentialSource> {
        self.credentials_seen.lock().unwrap().clone()
    }

    /// Count the call and pick the script step for it
    fn step(&self, url: &str, options: &ExtractOptions) -> Result<Script> {
        let call = {
            let mut calls = self.calls.lock().unwrap();
            let n = calls.entry(url.to_string()).or_insert(0);
            *n += 1;
            *n
        };
        self.credentials_seen
            .lock()
            .unwrap()
            .push(options.credential.clone());

        let mut script = self
            .scripts
            .get(url)
            .cloned()
            .ok_or_else(|| Error::Extractor(format!("no script for {url}")))?;
        let mut consumed = 0;
        while let Script::FailTimes {
            times,
            message,
            then,
        } = script
        {
            if call <= consumed + times {
                return Err(Error::Extractor(message));
            }
            consumed += times;
            script = *then;
        }
        match script {
            Script::Fail(message) => Err(Error::Extractor(message)),
            other => Ok(other),
        }
    }
}

#[async_trait]
impl Extractor for ScriptedExtractor {
    async fn resolve(&self, url: &str, options: &ExtractOptions) -> Result<MediaDescriptor> {
        match self.step(url, options)? {
            Script::Hang => std::future::pending().await,
            Script::Playlist(entries) => Ok(MediaDescriptor {
                id: "playlist".into(),
                title: Some("Playlist".into()),
                entries: entries
                    .into_iter()
                    .map(|(id, url)| PlaylistEntry {
                        id,
                        url,
                        title: None,
                    })
                    .collect(),
                ..Default::default()
            }),
            _ => Ok(MediaDescriptor {
                id: url.rsplit('/').next().unwrap_or("item").to_string(),
                title: Some(format!("Title of {url}")),
                duration_secs: Some(12.5),
                view_count: Some(42),
                ..Default::default()
            }),
        }
    }

    async fn download(
        &self,
        url: &str,
        options: &ExtractOptions,
        output_dir: &Path,
    ) -> Result<PathBuf> {
        match self.step(url, options)? {
            Script::Produce { name, bytes } => {
                let path = output_dir.join(name);
                tokio::fs::write(&path, bytes).await?;
                Ok(path)
            }
            Script::Moved {
                reported,
                name,
                bytes,
            } => {
                tokio::fs::write(output_dir.join(name), bytes).await?;
                Ok(output_dir.join(reported))
            }
            Script::Hang => std::future::pending().await,
            _ => Err(Error::Extractor("script cannot download".into())),
        }
    }

    fn name(&self) -> &'static str {
        "scripted"
    }
}

/// Config rooted in `root` with short delays and one browser credential source
pub(crate) fn test_config(root: &Path) -> Config {
    let mut config = Config::default();
    config.download.store_dir = root.join("store");
    config.download.workspace_dir = root.join("workspaces");
    config.thumbnails.dir = root.join("thumbnails");
    config.download.task_timeout = Duration::from_secs(5);
    config.extractor.attempt_timeout = Duration::from_secs(5);
    config.extractor.strategy_jitter_min_ms = 0;
    config.extractor.strategy_jitter_max_ms = 0;
    config.extractor.search_path = false;
    config.extractor.cookie_browsers = vec!["chrome".into()];
    config.retry.initial_delay = Duration::from_millis(10);
    config.retry.max_delay = Duration::from_millis(50);
    config.retry.jitter = false;
    config
}

/// Helper to create a test MediaDownloader over the given extractor.
/// Returns the downloader and the tempdir (which must be kept alive).
pub(crate) async fn create_test_downloader(
    extractor: Arc<dyn Extractor>,
) -> (MediaDownloader, tempfile::TempDir) {
    let temp_dir = tempdir().unwrap();
    let config = test_config(temp_dir.path());
    let downloader = MediaDownloader::with_extractor(config, extractor)
        .await
        .unwrap();
    (downloader, temp_dir)
}

/// Same as [`create_test_downloader`] with a config tweak applied first
pub(crate) async fn create_test_downloader_with(
    extractor: Arc<dyn Extractor>,
    tweak: impl FnOnce(&mut Config),
) -> (MediaDownloader, tempfile::TempDir) {
    let temp_dir = tempdir().unwrap();
    let mut config = test_config(temp_dir.path());
    tweak(&mut config);
    let downloader = MediaDownloader::with_extractor(config, extractor)
        .await
        .unwrap();
    (downloader, temp_dir)
}
