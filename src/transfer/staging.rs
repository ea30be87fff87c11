//! Staged upload files
//!
//! A multipart upload is written to a temp file before it is sent to the
//! backend. The file is removed exactly once: by [`StagedFile::discard`] on
//! the normal path, or by `Drop` on any path that never reaches it.

use std::path::{Path, PathBuf};

use crate::error::Result;

/// A temporary on-disk copy of an uploaded payload.
#[derive(Debug)]
pub struct StagedFile {
    path: PathBuf,
    file_name: String,
    removed: bool,
}

impl StagedFile {
    /// Create an empty staged file in `dir` for an upload named `file_name`
    pub async fn create(dir: &Path, file_name: &str) -> Result<(Self, tokio::fs::File)> {
        tokio::fs::create_dir_all(dir).await?;
        let path = dir.join(format!("upload-{}.part", uuid::Uuid::new_v4().simple()));
        let handle = tokio::fs::File::create(&path).await?;
        tracing::debug!("Staging upload {} at {}", file_name, path.display());

        Ok((
            Self {
                path,
                file_name: file_name.to_string(),
                removed: false,
            },
            handle,
        ))
    }

    /// Take ownership of an existing file as a staged upload
    pub fn adopt(path: PathBuf, file_name: &str) -> Self {
        Self {
            path,
            file_name: file_name.to_string(),
            removed: false,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Name the client gave the upload
    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    /// Remove the staged file from disk
    pub async fn discard(mut self) {
        self.removed = true;
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => tracing::debug!("Removed staged upload {}", self.path.display()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => tracing::error!(
                "Error deleting temporary file {}: {}",
                self.path.display(),
                e
            ),
        }
    }
}

impl Drop for StagedFile {
    fn drop(&mut self) {
        if self.removed {
            return;
        }
        self.removed = true;
        match std::fs::remove_file(&self.path) {
            Ok(()) => tracing::debug!("Removed abandoned staged upload {}", self.path.display()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => tracing::error!(
                "Error deleting temporary file {}: {}",
                self.path.display(),
                e
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use tokio::io::AsyncWriteExt;

    #[tokio::test]
    async fn test_discard_removes_file() {
        let dir = TempDir::new().unwrap();
        let (staged, mut handle) = StagedFile::create(dir.path(), "a.txt").await.unwrap();
        handle.write_all(b"payload").await.unwrap();
        drop(handle);

        let path = staged.path().to_path_buf();
        assert!(path.exists());
        assert_eq!(staged.file_name(), "a.txt");

        staged.discard().await;
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_drop_removes_file() {
        let dir = TempDir::new().unwrap();
        let (staged, handle) = StagedFile::create(dir.path(), "b.txt").await.unwrap();
        drop(handle);
        let path = staged.path().to_path_buf();

        drop(staged);
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_discard_tolerates_missing_file() {
        let dir = TempDir::new().unwrap();
        let staged = StagedFile::adopt(dir.path().join("gone.part"), "gone");
        staged.discard().await;
    }
}
