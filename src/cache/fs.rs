//! Filesystem primitives used by the cache

use crate::error::{CacheError, CacheResult};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::debug;

/// Filesystem collaborator
///
/// Existence checks and deletes never fail: errors read as "missing" and
/// deletes are best-effort.
#[async_trait]
pub trait Filesystem: Send + Sync {
    /// Whether a file exists at `path`
    async fn exists(&self, path: &Path) -> bool;

    /// Delete `path`, ignoring errors
    async fn remove(&self, path: &Path);

    /// Size of the file at `path`, if it can be read
    async fn file_size(&self, path: &Path) -> Option<u64>;

    /// Regular files directly inside `dir`
    async fn list_files(&self, dir: &Path) -> CacheResult<Vec<PathBuf>>;

    /// Create `dir` and its parents
    async fn create_dir_all(&self, dir: &Path) -> CacheResult<()>;
}

/// The local disk, through `tokio::fs`
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalFs;

#[async_trait]
impl Filesystem for LocalFs {
    async fn exists(&self, path: &Path) -> bool {
        fs::metadata(path).await.map(|m| m.is_file()).unwrap_or(false)
    }

    async fn remove(&self, path: &Path) {
        if let Err(e) = fs::remove_file(path).await {
            debug!(path = %path.display(), error = %e, "Ignoring failed delete");
        }
    }

    async fn file_size(&self, path: &Path) -> Option<u64> {
        fs::metadata(path).await.ok().map(|m| m.len())
    }

    async fn list_files(&self, dir: &Path) -> CacheResult<Vec<PathBuf>> {
        let mut files = Vec::new();
        let mut entries = fs::read_dir(dir)
            .await
            .map_err(|e| CacheError::io(format!("reading cache directory {}", dir.display()), e))?;

        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| CacheError::io("reading cache directory entry", e))?
        {
            let is_file = entry.file_type().await.map(|t| t.is_file()).unwrap_or(false);
            if is_file {
                files.push(entry.path());
            }
        }

        files.sort();
        Ok(files)
    }

    async fn create_dir_all(&self, dir: &Path) -> CacheResult<()> {
        fs::create_dir_all(dir)
            .await
            .map_err(|e| CacheError::io(format!("creating cache directory {}", dir.display()), e))
    }
}
