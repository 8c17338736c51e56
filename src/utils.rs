//! Utility functions for file naming and directory accounting

use crate::error::{Error, Result};
use std::path::Path;
use std::time::SystemTime;

/// Maximum number of rename attempts when resolving name collisions
const MAX_RENAME_ATTEMPTS: u32 = 9999;

/// Pick a name that `taken` does not already claim, adding " (1)", " (2)", ... before the extension
///
/// # Examples
///
/// ```
/// use media_dl::utils::unique_name;
///
/// let existing = ["clip.mp3", "clip (1).mp3"];
/// let name = unique_name("clip.mp3", |n| existing.contains(&n)).unwrap();
/// assert_eq!(name, "clip (2).mp3");
/// ```
pub fn unique_name(name: &str, taken: impl Fn(&str) -> bool) -> Result<String> {
    if !taken(name) {
        return Ok(name.to_string());
    }

    let path = Path::new(name);
    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .ok_or_else(|| Error::InvalidInput(format!("cannot extract file stem from '{name}'")))?;
    let extension = path.extension().and_then(|e| e.to_str());

    for i in 1..=MAX_RENAME_ATTEMPTS {
        let candidate = match extension {
            Some(ext) => format!("{} ({}).{}", stem, i, ext),
            None => format!("{} ({})", stem, i),
        };
        if !taken(&candidate) {
            return Ok(candidate);
        }
    }

    Err(Error::Other(format!(
        "could not find a unique name for '{name}' after {MAX_RENAME_ATTEMPTS} attempts"
    )))
}

/// Strip path separators and control characters so a name can never escape its directory
///
/// Returns "download" when nothing usable is left.
pub fn sanitize_file_name(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();
    let trimmed = cleaned.trim().trim_start_matches('.').trim();

    if trimmed.is_empty() {
        "download".to_string()
    } else {
        trimmed.to_string()
    }
}

/// Base name of a path as a `String`
pub fn base_name(path: &Path) -> Option<String> {
    path.file_name().map(|n| n.to_string_lossy().into_owned())
}

/// True for names the store and sweeper treat as in-progress or internal
pub fn is_hidden_or_partial(name: &str) -> bool {
    name.starts_with('.') || name.ends_with(".partial")
}

/// Count regular, finalized files directly under `dir` and sum their sizes
pub async fn dir_usage(dir: &Path) -> Result<(usize, u64)> {
    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok((0, 0)),
        Err(e) => return Err(e.into()),
    };

    let mut items = 0;
    let mut bytes = 0;
    while let Some(entry) = entries.next_entry().await? {
        if is_hidden_or_partial(&entry.file_name().to_string_lossy()) {
            continue;
        }
        let Ok(metadata) = entry.metadata().await else {
            continue;
        };
        if metadata.is_file() {
            items += 1;
            bytes += metadata.len();
        }
    }
    Ok((items, bytes))
}

/// Stamp a file's modification time, which the retention sweep reads as its creation time
pub fn touch(path: &Path, when: SystemTime) -> std::io::Result<()> {
    std::fs::File::options()
        .write(true)
        .open(path)?
        .set_modified(when)
}
