//! Thumbnail cache
//!
//! One normalized JPEG preview per media id, stored as `<dir>/<key>.jpg` where the key is an
//! escaped form of the id. An id that is already cached is served from disk without touching
//! the network; concurrent requests for the same id share a single fetch.
//!
//! Images are decoded to validate them, scaled down to fit the configured box (aspect ratio
//! preserved, never upscaled), converted to 8-bit RGB and re-encoded as JPEG. The encoded file
//! is written under a hidden `.partial` name and renamed into place.

use crate::config::ThumbnailConfig;
use crate::error::{Error, Result};
use image::{DynamicImage, ImageFormat};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::Mutex;

/// Content-addressed (by media id) store of preview images
#[derive(Clone)]
pub struct ThumbnailCache {
    dir: PathBuf,
    client: reqwest::Client,
    max_width: u32,
    max_height: u32,
    max_fetch_bytes: u64,
    locks: Arc<Mutex<HashMap<String, Arc<Mutex<()>>>>>,
    fetches: Arc<AtomicU64>,
}

impl std::fmt::Debug for ThumbnailCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ThumbnailCache")
            .field("dir", &self.dir)
            .field("max_width", &self.max_width)
            .field("max_height", &self.max_height)
            .finish_non_exhaustive()
    }
}

impl ThumbnailCache {
    /// Build a cache from configuration
    pub fn new(config: &ThumbnailConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.fetch_timeout)
            .build()?;

        Ok(Self {
            dir: config.dir.clone(),
            client,
            max_width: config.max_width.max(1),
            max_height: config.max_height.max(1),
            max_fetch_bytes: config.max_fetch_bytes,
            locks: Arc::new(Mutex::new(HashMap::new())),
            fetches: Arc::new(AtomicU64::new(0)),
        })
    }

    /// Directory holding cached previews
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Where the preview for `media_id` lives (whether or not it exists yet)
    pub fn path_for(&self, media_id: &str) -> PathBuf {
        self.dir.join(format!("{}.jpg", cache_key(media_id)))
    }

    /// Cached preview for `media_id`, if any. Never touches the network.
    pub async fn cached(&self, media_id: &str) -> Option<PathBuf> {
        let path = self.path_for(media_id);
        match tokio::fs::metadata(&path).await {
            Ok(meta) if meta.is_file() => Some(path),
            _ => None,
        }
    }

    /// Number of network fetches performed so far
    pub fn fetch_count(&self) -> u64 {
        self.fetches.load(Ordering::Relaxed)
    }

    /// Return the cached preview for `media_id`, fetching it from `source_url` on a miss
    ///
    /// Failures are logged and reported as `None`; they never propagate to the caller.
    pub async fn get_or_fetch(&self, media_id: &str, source_url: &str) -> Option<PathBuf> {
        if let Some(path) = self.cached(media_id).await {
            return Some(path);
        }

        let key = cache_key(media_id);
        let lock = {
            let mut locks = self.locks.lock().await;
            locks.entry(key.clone()).or_default().clone()
        };

        let result = {
            let _guard = lock.lock().await;
            // Another caller may have filled the slot while we waited
            match self.cached(media_id).await {
                Some(path) => Ok(path),
                None => self.fetch(&key, source_url).await,
            }
        };

        {
            let mut locks = self.locks.lock().await;
            if Arc::strong_count(&lock) <= 2 {
                locks.remove(&key);
            }
        }

        match result {
            Ok(path) => Some(path),
            Err(e) => {
                tracing::warn!(media_id, url = source_url, error = %e, "thumbnail unavailable");
                None
            }
        }
    }

    async fn fetch(&self, key: &str, source_url: &str) -> Result<PathBuf> {
        self.fetches.fetch_add(1, Ordering::Relaxed);

        let mut response = self.client.get(source_url).send().await?.error_for_status()?;
        if let Some(len) = response.content_length()
            && len > self.max_fetch_bytes
        {
            return Err(Error::Thumbnail(format!(
                "image of {len} bytes exceeds the {} byte limit",
                self.max_fetch_bytes
            )));
        }

        let mut body = Vec::new();
        while let Some(chunk) = response.chunk().await? {
            body.extend_from_slice(&chunk);
            if body.len() as u64 > self.max_fetch_bytes {
                return Err(Error::Thumbnail(format!(
                    "image exceeds the {} byte limit",
                    self.max_fetch_bytes
                )));
            }
        }

        tokio::fs::create_dir_all(&self.dir).await?;

        let target = self.dir.join(format!("{key}.jpg"));
        let partial = self.dir.join(format!(".{key}.jpg.partial"));
        let (max_w, max_h) = (self.max_width, self.max_height);

        let encoded = {
            let partial = partial.clone();
            tokio::task::spawn_blocking(move || normalize(&body, max_w, max_h, &partial))
                .await
                .map_err(|e| Error::Thumbnail(format!("image task panicked: {e}")))?
        };

        let finished = match encoded {
            Ok(()) => tokio::fs::rename(&partial, &target).await.map_err(Error::from),
            Err(e) => Err(e),
        };
        if let Err(e) = finished {
            let _ = tokio::fs::remove_file(&partial).await;
            return Err(e);
        }

        tracing::debug!(path = %target.display(), "thumbnail cached");
        Ok(target)
    }
}

/// Decode, fit into the box, convert to RGB and write a JPEG to `out`
fn normalize(bytes: &[u8], max_w: u32, max_h: u32, out: &Path) -> Result<()> {
    let decoded = image::load_from_memory(bytes)
        .map_err(|e| Error::Thumbnail(format!("not a decodable image: {e}")))?;

    let fitted = if decoded.width() > max_w || decoded.height() > max_h {
        decoded.thumbnail(max_w, max_h)
    } else {
        decoded
    };

    DynamicImage::ImageRgb8(fitted.to_rgb8())
        .save_with_format(out, ImageFormat::Jpeg)
        .map_err(|e| Error::Thumbnail(format!("failed to encode thumbnail: {e}")))
}

/// File-name-safe form of a media id
///
/// ASCII letters, digits and `-` are kept; every other byte becomes `_` plus two hex digits.
/// `_` itself is escaped, so distinct ids always get distinct keys.
fn cache_key(media_id: &str) -> String {
    if media_id.is_empty() {
        return "_".to_string();
    }
    let mut key = String::with_capacity(media_id.len());
    for byte in media_id.bytes() {
        if byte.is_ascii_alphanumeric() || byte == b'-' {
            key.push(char::from(byte));
        } else {
            key.push_str(&format!("_{byte:02x}"));
        }
    }
    key
}
