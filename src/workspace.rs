//! Per-task workspaces and atomic promotion into the public store
//!
//! A [`Workspace`] is an exclusively-owned directory under the workspace root, named from the
//! job id plus a fresh UUID so no two attempts ever share a path. It ends in exactly one of
//! two ways, both of which consume it:
//!
//! - [`Workspace::promote`] moves the selected output into the store and removes the directory
//! - [`Workspace::release`] removes the directory and everything under it
//!
//! If neither runs (timeout, panic, cancelled future) the `Drop` impl removes the directory
//! synchronously. The store is never written to directly: files land under a `.partial`
//! name first and are renamed into place.

use crate::error::{Error, Result, StorageError};
use crate::types::JobId;
use crate::utils::{base_name, is_hidden_or_partial, sanitize_file_name, touch};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::SystemTime;
use uuid::Uuid;

/// Which workspace files to promote
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SelectionRule {
    /// Exactly this file (must be inside the workspace)
    Exact(PathBuf),
    /// The largest finalized file with one of these extensions (case-insensitive, no dot)
    LargestWithExtension(Vec<String>),
}

/// A file moved into the public store
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StoredFile {
    /// Location in the store
    pub path: PathBuf,
    /// Original base name (without the unique prefix)
    pub original_name: String,
    /// Size on disk
    pub size_bytes: u64,
}

#[derive(Debug, Default)]
struct Counters {
    acquired: AtomicUsize,
    finished: AtomicUsize,
}

/// Creates workspaces and owns the store/workspace directory pair
#[derive(Clone, Debug)]
pub struct WorkspaceManager {
    root: PathBuf,
    store: PathBuf,
    max_bytes: u64,
    counters: Arc<Counters>,
}

impl WorkspaceManager {
    /// Manager for the given workspace root and public store
    pub fn new(root: PathBuf, store: PathBuf, max_bytes: u64) -> Self {
        Self {
            root,
            store,
            max_bytes,
            counters: Arc::new(Counters::default()),
        }
    }

    /// Workspace root directory
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Public store directory
    pub fn store(&self) -> &Path {
        &self.store
    }

    /// Maximum size of a promotion in bytes
    pub fn max_bytes(&self) -> u64 {
        self.max_bytes
    }

    /// Create an empty workspace for one attempt of a job's task
    pub async fn acquire(&self, job_id: JobId) -> Result<Workspace> {
        let path = self
            .root
            .join(format!("{}-{}", job_id, Uuid::new_v4().simple()));

        let create_failed = |e: std::io::Error| StorageError::WorkspaceCreateFailed {
            path: path.clone(),
            reason: e.to_string(),
        };
        tokio::fs::create_dir_all(&self.root)
            .await
            .map_err(create_failed)?;
        // create_dir fails on an existing path, so a workspace is never shared
        tokio::fs::create_dir(&path).await.map_err(create_failed)?;

        self.counters.acquired.fetch_add(1, Ordering::SeqCst);
        tracing::debug!(job_id = %job_id, path = %path.display(), "workspace acquired");

        Ok(Workspace {
            path,
            store: self.store.clone(),
            max_bytes: self.max_bytes,
            counters: self.counters.clone(),
            finished: false,
        })
    }

    /// Workspaces acquired so far
    pub fn acquired(&self) -> usize {
        self.counters.acquired.load(Ordering::SeqCst)
    }

    /// Workspaces acquired but not yet promoted, released or dropped
    pub fn outstanding(&self) -> usize {
        self.acquired() - self.counters.finished.load(Ordering::SeqCst)
    }

    /// Remove workspace directories left behind by a previous process
    ///
    /// Only call this before any workspace of the current process exists.
    pub async fn clean_leftovers(&self) -> Result<usize> {
        let mut entries = match tokio::fs::read_dir(&self.root).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(e.into()),
        };

        let mut removed = 0;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            let result = if entry.file_type().await?.is_dir() {
                tokio::fs::remove_dir_all(&path).await
            } else {
                tokio::fs::remove_file(&path).await
            };
            match result {
                Ok(()) => removed += 1,
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "failed to remove leftover workspace")
                }
            }
        }

        if removed > 0 {
            tracing::info!(removed, "removed leftover workspaces");
        }
        Ok(removed)
    }
}

/// An exclusively-owned staging directory
#[derive(Debug)]
pub struct Workspace {
    path: PathBuf,
    store: PathBuf,
    max_bytes: u64,
    counters: Arc<Counters>,
    finished: bool,
}

impl Workspace {
    /// Directory the extractor writes into
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Move the selected output into the public store and remove the workspace
    ///
    /// The combined size is checked before anything moves. On any failure the workspace is
    /// released and no file is left in the store.
    pub async fn promote(mut self, rule: SelectionRule) -> Result<Vec<StoredFile>> {
        let result = self.promote_inner(&rule).await;
        let released = self.remove().await;

        match (result, released) {
            (Ok(stored), Ok(())) => Ok(stored),
            (Ok(stored), Err(e)) => {
                // output is already safe in the store; a stale workspace is only logged
                tracing::warn!(path = %self.path.display(), error = %e, "workspace removal after promotion failed");
                Ok(stored)
            }
            (Err(e), _) => Err(e),
        }
    }

    /// Remove the workspace and everything under it
    pub async fn release(mut self) -> Result<()> {
        self.remove().await
    }

    async fn remove(&mut self) -> Result<()> {
        self.finished = true;
        self.counters.finished.fetch_add(1, Ordering::SeqCst);

        match tokio::fs::remove_dir_all(&self.path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StorageError::ReleaseFailed {
                path: self.path.clone(),
                reason: e.to_string(),
            }
            .into()),
        }
    }

    async fn select(&self, rule: &SelectionRule) -> Result<Vec<PathBuf>> {
        let selected = match rule {
            SelectionRule::Exact(path) => {
                if !path.starts_with(&self.path) {
                    return Err(Error::InvalidInput(format!(
                        "{} is outside the workspace",
                        path.display()
                    )));
                }
                match tokio::fs::metadata(path).await {
                    Ok(m) if m.is_file() => vec![path.clone()],
                    _ => Vec::new(),
                }
            }
            SelectionRule::LargestWithExtension(exts) => {
                let mut entries = tokio::fs::read_dir(&self.path).await?;
                let mut best: Option<(u64, PathBuf)> = None;
                while let Some(entry) = entries.next_entry().await? {
                    let path = entry.path();
                    let name = entry.file_name().to_string_lossy().into_owned();
                    if is_hidden_or_partial(&name) || name.ends_with(".part") {
                        continue;
                    }
                    let meta = entry.metadata().await?;
                    if !meta.is_file() {
                        continue;
                    }
                    let ext = path
                        .extension()
                        .map(|e| e.to_string_lossy().to_ascii_lowercase());
                    if !ext.is_some_and(|e| exts.iter().any(|x| x.eq_ignore_ascii_case(&e))) {
                        continue;
                    }
                    if best.as_ref().is_none_or(|(size, _)| meta.len() > *size) {
                        best = Some((meta.len(), path));
                    }
                }
                best.map(|(_, path)| vec![path]).unwrap_or_default()
            }
        };

        if selected.is_empty() {
            return Err(StorageError::NoOutput {
                path: self.path.clone(),
            }
            .into());
        }
        Ok(selected)
    }

    async fn promote_inner(&self, rule: &SelectionRule) -> Result<Vec<StoredFile>> {
        let selected = self.select(rule).await?;

        let mut sizes = Vec::with_capacity(selected.len());
        for path in &selected {
            sizes.push(tokio::fs::metadata(path).await?.len());
        }
        let total: u64 = sizes.iter().sum();
        if total > self.max_bytes {
            tracing::warn!(
                workspace = %self.path.display(),
                size = total,
                limit = self.max_bytes,
                "output exceeds maximum artifact size"
            );
            return Err(Error::SizeExceeded {
                size: total,
                limit: self.max_bytes,
            });
        }

        tokio::fs::create_dir_all(&self.store).await?;

        let mut stored: Vec<StoredFile> = Vec::with_capacity(selected.len());
        for (source, size) in selected.iter().zip(sizes) {
            match move_into_store(source, &self.store).await {
                Ok((path, original_name)) => stored.push(StoredFile {
                    path,
                    original_name,
                    size_bytes: size,
                }),
                Err(e) => {
                    for done in &stored {
                        if let Err(undo) = tokio::fs::remove_file(&done.path).await {
                            tracing::warn!(path = %done.path.display(), error = %undo, "rollback of promoted file failed");
                        }
                    }
                    return Err(e);
                }
            }
        }

        tracing::debug!(
            workspace = %self.path.display(),
            files = stored.len(),
            bytes = total,
            "workspace promoted"
        );
        Ok(stored)
    }
}

impl Drop for Workspace {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        self.counters.finished.fetch_add(1, Ordering::SeqCst);
        match std::fs::remove_dir_all(&self.path) {
            Ok(()) => {
                tracing::debug!(path = %self.path.display(), "workspace removed on drop")
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                tracing::warn!(path = %self.path.display(), error = %e, "failed to remove dropped workspace")
            }
        }
    }
}

/// Move one file into the store under a collision-free name
///
/// Tries a rename first. Across filesystems it copies to a hidden `.partial` file and renames
/// that into place, so the store never shows a half-written file.
async fn move_into_store(source: &Path, store: &Path) -> Result<(PathBuf, String)> {
    let original_name = base_name(source).unwrap_or_else(|| "download".into());
    let stored_name = format!(
        "{}_{}",
        &Uuid::new_v4().simple().to_string()[..8],
        sanitize_file_name(&original_name)
    );
    let dest = store.join(&stored_name);

    let move_failed = |reason: String| -> Error {
        StorageError::MoveFailed {
            source_path: source.to_path_buf(),
            dest_path: dest.clone(),
            reason,
        }
        .into()
    };

    if tokio::fs::rename(source, &dest).await.is_err() {
        let partial = store.join(format!(".{stored_name}.partial"));
        if let Err(e) = tokio::fs::copy(source, &partial).await {
            let _ = tokio::fs::remove_file(&partial).await;
            return Err(move_failed(e.to_string()));
        }
        if let Err(e) = tokio::fs::rename(&partial, &dest).await {
            let _ = tokio::fs::remove_file(&partial).await;
            return Err(move_failed(e.to_string()));
        }
    }

    if let Err(e) = touch(&dest, SystemTime::now()) {
        tracing::debug!(path = %dest.display(), error = %e, "could not stamp promotion time");
    }

    Ok((dest, original_name))
}
