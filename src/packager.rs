//! Artifact packager
//!
//! Turns the files a job promoted into one deliverable. A single file passes through
//! untouched. Several files become one zip archive with base-name entries only, written to a
//! hidden `.partial` file and renamed into place, so the store either holds the complete
//! archive or nothing.

use crate::error::{Error, Result, StorageError};
use crate::types::JobId;
use crate::utils::{sanitize_file_name, unique_name};
use crate::workspace::StoredFile;
use std::collections::HashSet;
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};
use tokio::task::spawn_blocking;

/// Outcome of packaging
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Packaged {
    /// Exactly one file; returned unchanged
    PassThrough(PathBuf),
    /// Several files bundled into this archive
    Archive(PathBuf),
}

impl Packaged {
    /// Path of the deliverable
    pub fn path(&self) -> &Path {
        match self {
            Packaged::PassThrough(p) | Packaged::Archive(p) => p,
        }
    }
}

/// Bundles a job's promoted files into a single deliverable
#[derive(Clone, Debug)]
pub struct ArtifactPackager {
    store: PathBuf,
    max_bytes: u64,
}

impl ArtifactPackager {
    /// Packager writing archives into `store`, rejecting anything above `max_bytes`
    pub fn new(store: PathBuf, max_bytes: u64) -> Self {
        Self { store, max_bytes }
    }

    /// Package the given files
    ///
    /// Archive members are deleted once the archive is complete. On failure no archive
    /// (partial or otherwise) is left and the members are untouched.
    pub async fn package(&self, job_id: JobId, files: &[StoredFile]) -> Result<Packaged> {
        match files {
            [] => Err(StorageError::NoOutput {
                path: self.store.clone(),
            }
            .into()),
            [single] => Ok(Packaged::PassThrough(single.path.clone())),
            many => self.archive(job_id, many).await.map(Packaged::Archive),
        }
    }

    async fn archive(&self, job_id: JobId, files: &[StoredFile]) -> Result<PathBuf> {
        let total: u64 = files.iter().map(|f| f.size_bytes).sum();
        if total > self.max_bytes {
            return Err(Error::SizeExceeded {
                size: total,
                limit: self.max_bytes,
            });
        }

        let mut used = HashSet::new();
        let mut entries = Vec::with_capacity(files.len());
        for file in files {
            let wanted = sanitize_file_name(&file.original_name);
            let name = unique_name(&wanted, |n| used.contains(n))?;
            used.insert(name.clone());
            entries.push((file.path.clone(), name));
        }

        let target = self.store.join(format!("{job_id}.zip"));
        let partial = self.store.join(format!(".{job_id}.zip.partial"));

        let written = {
            let partial = partial.clone();
            spawn_blocking(move || write_zip(&partial, &entries))
                .await
                .map_err(|e| StorageError::ArchiveFailed {
                    path: target.clone(),
                    reason: format!("archive task panicked: {e}"),
                })?
        };

        let result: Result<()> = match written {
            Ok(size) if size > self.max_bytes => Err(Error::SizeExceeded {
                size,
                limit: self.max_bytes,
            }),
            Ok(_) => tokio::fs::rename(&partial, &target).await.map_err(|e| {
                StorageError::ArchiveFailed {
                    path: target.clone(),
                    reason: e.to_string(),
                }
                .into()
            }),
            Err(e) => Err(StorageError::ArchiveFailed {
                path: target.clone(),
                reason: e.to_string(),
            }
            .into()),
        };

        if let Err(e) = result {
            let _ = tokio::fs::remove_file(&partial).await;
            tracing::warn!(job_id = %job_id, error = %e, "archive creation failed");
            return Err(e);
        }

        for file in files {
            if let Err(e) = tokio::fs::remove_file(&file.path).await {
                tracing::warn!(path = %file.path.display(), error = %e, "failed to remove archived member");
            }
        }

        tracing::info!(job_id = %job_id, files = files.len(), path = %target.display(), "archive created");
        Ok(target)
    }
}

/// Write a deflated zip with the given (source, entry name) pairs; returns the archive size
fn write_zip(path: &Path, entries: &[(PathBuf, String)]) -> std::io::Result<u64> {
    let file = File::create(path)?;
    let mut writer = zip::ZipWriter::new(BufWriter::new(file));
    let options = zip::write::FileOptions::default()
        .compression_method(zip::CompressionMethod::Deflated)
        .large_file(true);

    for (source, name) in entries {
        writer
            .start_file(name.as_str(), options)
            .map_err(std::io::Error::other)?;
        let mut reader = BufReader::new(File::open(source)?);
        std::io::copy(&mut reader, &mut writer)?;
    }

    let inner = writer.finish().map_err(std::io::Error::other)?;
    let file = inner.into_inner().map_err(|e| e.into_error())?;
    file.sync_all()?;
    Ok(file.metadata()?.len())
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;

    async fn stored(dir: &Path, stored_name: &str, original: &str, body: &[u8]) -> StoredFile {
        let path = dir.join(stored_name);
        tokio::fs::write(&path, body).await.unwrap();
        StoredFile {
            path,
            original_name: original.into(),
            size_bytes: body.len() as u64,
        }
    }

    fn entry_names(archive: &Path) -> Vec<String> {
        let mut zip = zip::ZipArchive::new(File::open(archive).unwrap()).unwrap();
        (0..zip.len())
            .map(|i| zip.by_index(i).unwrap().name().to_string())
            .collect()
    }

    fn store_listing(dir: &Path) -> Vec<String> {
        let mut names: Vec<_> = std::fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }

    #[tokio::test]
    async fn single_file_passes_through_unchanged() {
        let dir = tempfile::tempdir().unwrap();
        let file = stored(dir.path(), "ab12cd34_one.mp4", "one.mp4", b"video").await;
        let packager = ArtifactPackager::new(dir.path().to_path_buf(), 1024);

        let out = packager
            .package(JobId::new(), std::slice::from_ref(&file))
            .await
            .unwrap();

        assert_eq!(out, Packaged::PassThrough(file.path.clone()));
        assert_eq!(store_listing(dir.path()), vec!["ab12cd34_one.mp4"]);
    }

    #[tokio::test]
    async fn two_files_become_one_flat_archive() {
        let dir = tempfile::tempdir().unwrap();
        let a = stored(dir.path(), "11111111_A [a].mp3", "A [a].mp3", b"aaa").await;
        let b = stored(dir.path(), "22222222_B [b].mp3", "B [b].mp3", b"bbbb").await;
        let packager = ArtifactPackager::new(dir.path().to_path_buf(), 1024);
        let job = JobId::new();

        let out = packager.package(job, &[a, b]).await.unwrap();

        let Packaged::Archive(path) = out else {
            panic!("expected archive")
        };
        assert_eq!(path, dir.path().join(format!("{job}.zip")));
        let mut names = entry_names(&path);
        names.sort();
        assert_eq!(names, vec!["A [a].mp3", "B [b].mp3"]);
        assert!(names.iter().all(|n| !n.contains('/')));
        assert_eq!(store_listing(dir.path()), vec![format!("{job}.zip")]);
    }

    #[tokio::test]
    async fn duplicate_base_names_are_suffixed() {
        let dir = tempfile::tempdir().unwrap();
        let a = stored(dir.path(), "11111111_same.mp3", "same.mp3", b"1").await;
        let b = stored(dir.path(), "22222222_same.mp3", "same.mp3", b"2").await;
        let packager = ArtifactPackager::new(dir.path().to_path_buf(), 1024);

        let out = packager.package(JobId::new(), &[a, b]).await.unwrap();
        let mut names = entry_names(out.path());
        names.sort();
        assert_eq!(names, vec!["same (1).mp3", "same.mp3"]);

        let mut zip = zip::ZipArchive::new(File::open(out.path()).unwrap()).unwrap();
        let mut body = String::new();
        zip.by_name("same (1).mp3")
            .unwrap()
            .read_to_string(&mut body)
            .unwrap();
        assert_eq!(body, "2");
    }

    #[tokio::test]
    async fn oversized_input_is_rejected_without_writing() {
        let dir = tempfile::tempdir().unwrap();
        let a = stored(dir.path(), "1_a", "a", b"123456").await;
        let b = stored(dir.path(), "2_b", "b", b"123456").await;
        let packager = ArtifactPackager::new(dir.path().to_path_buf(), 10);

        let err = packager.package(JobId::new(), &[a, b]).await.unwrap_err();
        assert!(matches!(err, Error::SizeExceeded { size: 12, limit: 10 }));
        assert_eq!(store_listing(dir.path()), vec!["1_a", "2_b"]);
    }

    #[tokio::test]
    async fn failed_write_leaves_no_partial_archive() {
        let dir = tempfile::tempdir().unwrap();
        let a = stored(dir.path(), "1_a", "a", b"1").await;
        let missing = StoredFile {
            path: dir.path().join("gone"),
            original_name: "gone".into(),
            size_bytes: 1,
        };
        let packager = ArtifactPackager::new(dir.path().to_path_buf(), 1024);

        let err = packager
            .package(JobId::new(), &[a, missing])
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            Error::Storage(StorageError::ArchiveFailed { .. })
        ));
        assert_eq!(store_listing(dir.path()), vec!["1_a"]);
    }

    #[tokio::test]
    async fn no_files_is_no_output() {
        let dir = tempfile::tempdir().unwrap();
        let packager = ArtifactPackager::new(dir.path().to_path_buf(), 1024);
        assert!(matches!(
            packager.package(JobId::new(), &[]).await,
            Err(Error::Storage(StorageError::NoOutput { .. }))
        ));
    }
}
