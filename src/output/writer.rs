//! Output file writer implementation

use std::io::Write;
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;
use tracing::{debug, warn};

use crate::error::{IndexerError, IndexerResult};

/// Writes workspace files through a temporary sibling and an atomic rename
#[derive(Debug, Clone, Copy, Default)]
pub struct OutputWriter;

impl OutputWriter {
    pub fn new() -> Self {
        Self
    }

    /// Replace `path` with `contents` atomically, creating parent directories
    pub async fn write_atomic(&self, path: &Path, contents: Vec<u8>) -> IndexerResult<()> {
        let path = path.to_path_buf();
        run_blocking(move || Self::write_atomic_sync(&path, &contents)).await
    }

    fn write_atomic_sync(path: &Path, contents: &[u8]) -> IndexerResult<()> {
        let dir = path.parent().unwrap_or_else(|| Path::new("."));
        std::fs::create_dir_all(dir).map_err(|e| IndexerError::workspace(dir, e))?;

        // Temp file in the target directory so the rename never crosses filesystems
        let mut temp = NamedTempFile::new_in(dir).map_err(|e| IndexerError::workspace(dir, e))?;
        temp.write_all(contents)
            .and_then(|_| temp.flush())
            .and_then(|_| temp.as_file().sync_all())
            .map_err(|e| IndexerError::workspace(temp.path(), e))?;

        temp.persist(path)
            .map_err(|e| IndexerError::workspace(path, e.error))?;

        debug!(file = %path.display(), bytes = contents.len(), "Atomic write completed");
        Ok(())
    }

    /// Read a file; `Ok(None)` when it does not exist
    pub async fn read_optional(&self, path: &Path) -> IndexerResult<Option<Vec<u8>>> {
        match tokio::fs::read(path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(IndexerError::workspace(path, e)),
        }
    }

    /// Move a file that could not be read out of the way, keeping its data.
    /// Returns the new location.
    pub async fn move_aside(&self, path: &Path) -> IndexerResult<PathBuf> {
        let stamp = chrono::Utc::now().format("%Y%m%dT%H%M%S%.3fZ");
        let mut name = path.file_name().unwrap_or_default().to_os_string();
        name.push(format!(".unreadable-{}", stamp));
        let target = path.with_file_name(name);

        tokio::fs::rename(path, &target)
            .await
            .map_err(|e| IndexerError::workspace(path, e))?;
        warn!(
            file = %path.display(),
            moved_to = %target.display(),
            "Unreadable file moved aside"
        );
        Ok(target)
    }

    /// Size in bytes, `None` when the file is missing
    pub async fn file_size(&self, path: &Path) -> Option<u64> {
        tokio::fs::metadata(path).await.ok().map(|m| m.len())
    }

    /// Delete a file, ignoring one that is already gone
    pub async fn remove_if_exists(&self, path: &Path) -> IndexerResult<()> {
        match tokio::fs::remove_file(path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(IndexerError::workspace(path, e)),
        }
    }
}

async fn run_blocking<T, F>(task: F) -> IndexerResult<T>
where
    F: FnOnce() -> IndexerResult<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(task).await.map_err(|e| {
        IndexerError::workspace(
            PathBuf::new(),
            std::io::Error::new(std::io::ErrorKind::Other, e.to_string()),
        )
    })?
}
