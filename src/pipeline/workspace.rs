//! Per-request scratch storage.
//!
//! Every request gets its own [`WorkingArea`]: a fresh temp directory that
//! holds the staged upload, the split pages and the engine's output. It is
//! removed when the area is dropped, whichever way the request ends. Removal
//! errors are logged and swallowed; cleanup never fails a request.
//!
//! A [`PageDir`] shares ownership of its area. An engine call that outlives
//! its request (the request was cancelled mid-call) keeps the directory
//! alive until the engine returns, and the last owner removes it.

use crate::error::OcrError;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;
use tracing::debug;

/// An isolated, self-deleting directory owned by one request.
#[derive(Debug)]
pub struct WorkingArea {
    dir: Option<Arc<TempDir>>,
    path: PathBuf,
}

/// A per-page subdirectory that keeps its [`WorkingArea`] alive.
#[derive(Debug, Clone)]
pub struct PageDir {
    path: PathBuf,
    _area: Option<Arc<TempDir>>,
}

impl PageDir {
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl WorkingArea {
    /// Create a new area under `root`, or under the system temp dir.
    pub fn create(root: Option<&Path>) -> Result<Self, OcrError> {
        let mut builder = tempfile::Builder::new();
        builder.prefix("ocr-");
        let result = match root {
            Some(root) => builder.tempdir_in(root),
            None => builder.tempdir(),
        };
        let dir = result.map_err(|source| OcrError::Staging {
            path: root.map(Path::to_path_buf).unwrap_or_else(std::env::temp_dir),
            source,
        })?;
        let path = dir.path().to_path_buf();
        debug!("Created working area {}", path.display());
        Ok(Self {
            dir: Some(Arc::new(dir)),
            path,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Create (if needed) and return a subdirectory.
    pub fn subdir(&self, name: &str) -> Result<PathBuf, OcrError> {
        let dir = self.path.join(name);
        std::fs::create_dir_all(&dir).map_err(|source| OcrError::Staging {
            path: dir.clone(),
            source,
        })?;
        Ok(dir)
    }

    /// Directory for one page of a batch: `page_0001`, `page_0002`, …
    pub fn page_dir(&self, page_num: usize) -> Result<PageDir, OcrError> {
        let path = self.subdir(&format!("page_{page_num:04}"))?;
        Ok(PageDir {
            path,
            _area: self.dir.clone(),
        })
    }

    /// Write `bytes` to `name` inside the area.
    pub async fn stage(&self, name: &str, bytes: &[u8]) -> Result<PathBuf, OcrError> {
        let path = self.path.join(name);
        tokio::fs::write(&path, bytes)
            .await
            .map_err(|source| OcrError::Staging {
                path: path.clone(),
                source,
            })?;
        debug!("Staged {} bytes at {}", bytes.len(), path.display());
        Ok(path)
    }

    /// Remove the area now. Same as dropping it.
    pub fn release(mut self) {
        self.remove();
    }

    fn remove(&mut self) {
        let Some(dir) = self.dir.take() else {
            return;
        };
        match Arc::try_unwrap(dir) {
            Ok(dir) => {
                if let Err(e) = dir.close() {
                    debug!("Failed to remove working area {}: {}", self.path.display(), e);
                }
            }
            // TempDir's own drop removes it once the last PageDir goes.
            Err(_) => debug!(
                "Working area {} still in use by the engine; removal deferred",
                self.path.display()
            ),
        }
    }
}

impl Drop for WorkingArea {
    fn drop(&mut self) {
        self.remove();
    }
}
