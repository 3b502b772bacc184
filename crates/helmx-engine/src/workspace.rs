//! Temporary directory owning one chartify invocation's files

use std::path::{Path, PathBuf};
use tempfile::TempDir;

use crate::error::Result;

/// Scratch space for a single operation
///
/// The directory is removed on drop. With `retain` set it is left on disk
/// and its location logged, so the generated chart can be inspected.
#[derive(Debug)]
pub struct Workspace {
    dir: Option<TempDir>,
    path: PathBuf,
    retain: bool,
}

impl Workspace {
    pub fn new(retain: bool) -> Result<Self> {
        let dir = tempfile::Builder::new().prefix("helm-x-").tempdir()?;
        let path = dir.path().to_path_buf();
        tracing::debug!(path = %path.display(), "created workspace");
        Ok(Self {
            dir: Some(dir),
            path,
            retain,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Where the generated chart is materialized
    pub fn chart_dir(&self) -> PathBuf {
        self.path.join("chart")
    }

    /// A fresh subdirectory for intermediate files
    pub fn scratch_dir(&self, name: &str) -> Result<PathBuf> {
        let dir = self.path.join("scratch").join(name);
        if dir.exists() {
            std::fs::remove_dir_all(&dir)?;
        }
        std::fs::create_dir_all(&dir)?;
        Ok(dir)
    }

    pub fn is_retained(&self) -> bool {
        self.retain
    }
}

impl Drop for Workspace {
    fn drop(&mut self) {
        let Some(dir) = self.dir.take() else {
            return;
        };

        if self.retain {
            let path = dir.keep();
            tracing::info!(
                "helm chart has been written to {} for you to see, please remove it afterwards",
                path.display()
            );
        } else if let Err(e) = dir.close() {
            tracing::warn!(path = %self.path.display(), error = %e, "failed to remove workspace");
        }
    }
}
