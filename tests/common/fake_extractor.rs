//! In-process extractor driven by per-URL behaviors

use async_trait::async_trait;
use media_dl::Error;
use media_dl::extractor::{ExtractOptions, Extractor, MediaDescriptor, PlaylistEntry};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

/// What the fake does for one URL
#[derive(Clone, Debug)]
pub enum Behavior {
    /// Write `bytes` to `name` after `delay`
    Produce {
        name: String,
        bytes: Vec<u8>,
        delay: Duration,
    },
    /// Fail with this upstream message
    Fail(String),
    /// Sleep far past any task timeout
    Stall,
    /// Resolve as a playlist of (id, url)
    Playlist(Vec<(String, String)>),
}

impl Behavior {
    pub fn produce(name: &str, bytes: &[u8]) -> Self {
        Behavior::Produce {
            name: name.to_string(),
            bytes: bytes.to_vec(),
            delay: Duration::ZERO,
        }
    }

    pub fn produce_slowly(name: &str, bytes: &[u8], delay: Duration) -> Self {
        Behavior::Produce {
            name: name.to_string(),
            bytes: bytes.to_vec(),
            delay,
        }
    }
}

/// Fake extractor that also tracks how many downloads run at once
#[derive(Default)]
pub struct FakeExtractor {
    behaviors: HashMap<String, Behavior>,
    thumbnails: HashMap<String, String>,
    downloads: Mutex<HashMap<String, usize>>,
    in_flight: AtomicUsize,
    peak: AtomicUsize,
}

impl FakeExtractor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on(mut self, url: &str, behavior: Behavior) -> Self {
        self.behaviors.insert(url.to_string(), behavior);
        self
    }

    /// Advertise a remote preview image for `url`
    pub fn with_thumbnail(mut self, url: &str, thumbnail_url: &str) -> Self {
        self.thumbnails
            .insert(url.to_string(), thumbnail_url.to_string());
        self
    }

    /// Highest number of downloads observed running at the same time
    pub fn peak_concurrency(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    pub fn download_calls(&self, url: &str) -> usize {
        self.downloads
            .lock()
            .unwrap()
            .get(url)
            .copied()
            .unwrap_or(0)
    }

    fn behavior(&self, url: &str) -> media_dl::Result<Behavior> {
        self.behaviors
            .get(url)
            .cloned()
            .ok_or_else(|| Error::Extractor(format!("Unsupported URL: {url}")))
    }
}

/// Decrements the in-flight counter when a download ends, however it ends
struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl Extractor for FakeExtractor {
    async fn resolve(
        &self,
        url: &str,
        _options: &ExtractOptions,
    ) -> media_dl::Result<MediaDescriptor> {
        match self.behavior(url)? {
            Behavior::Fail(message) => Err(Error::Extractor(message)),
            Behavior::Playlist(entries) => Ok(MediaDescriptor {
                id: "list".into(),
                title: Some("A playlist".into()),
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
            _ => {
                let id = url.rsplit('/').next().unwrap_or("item").to_string();
                Ok(MediaDescriptor {
                    title: Some(format!("Video {id}")),
                    duration_secs: Some(61.0),
                    view_count: Some(1000),
                    thumbnail: self.thumbnails.get(url).cloned(),
                    id,
                    ..Default::default()
                })
            }
        }
    }

    async fn download(
        &self,
        url: &str,
        _options: &ExtractOptions,
        output_dir: &Path,
    ) -> media_dl::Result<PathBuf> {
        *self
            .downloads
            .lock()
            .unwrap()
            .entry(url.to_string())
            .or_insert(0) += 1;

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        let _guard = InFlight(&self.in_flight);

        match self.behavior(url)? {
            Behavior::Produce { name, bytes, delay } => {
                tokio::time::sleep(delay).await;
                // leave a stray fragment behind, like a real extractor might
                tokio::fs::write(output_dir.join(format!("{name}.part")), b"frag").await?;
                let path = output_dir.join(name);
                tokio::fs::write(&path, bytes).await?;
                Ok(path)
            }
            Behavior::Fail(message) => Err(Error::Extractor(message)),
            Behavior::Stall => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Err(Error::Extractor("stalled".into()))
            }
            Behavior::Playlist(_) => Err(Error::Extractor("playlist is not downloadable".into())),
        }
    }

    fn name(&self) -> &'static str {
        "fake"
    }
}
