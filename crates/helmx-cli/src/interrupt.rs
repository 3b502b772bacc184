//! Ctrl-C handling
//!
//! The active workspace is registered here so an interrupt can remove it
//! before the process exits with status 130.

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::exit_codes;

static ACTIVE_WORKSPACE: Mutex<Option<PathBuf>> = Mutex::new(None);

/// Clears the registration when dropped
#[must_use = "the workspace is unregistered when the guard is dropped"]
pub struct Registration;

impl Drop for Registration {
    fn drop(&mut self) {
        if let Ok(mut slot) = ACTIVE_WORKSPACE.lock() {
            *slot = None;
        }
    }
}

/// Remember `path` for removal on interrupt
pub fn register(path: &Path) -> Registration {
    if let Ok(mut slot) = ACTIVE_WORKSPACE.lock() {
        *slot = Some(path.to_path_buf());
    }
    Registration
}

/// Watch for Ctrl-C on a background thread
pub fn install() {
    let spawned = std::thread::Builder::new()
        .name("ctrl-c".to_string())
        .spawn(|| {
            let runtime = match tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
            {
                Ok(rt) => rt,
                Err(err) => {
                    tracing::warn!(error = %err, "cannot watch for interrupts");
                    return;
                }
            };
            if runtime.block_on(tokio::signal::ctrl_c()).is_ok() {
                cleanup();
                std::process::exit(exit_codes::INTERRUPTED);
            }
        });
    if let Err(err) = spawned {
        tracing::warn!(error = %err, "cannot watch for interrupts");
    }
}

fn cleanup() {
    let path = ACTIVE_WORKSPACE.lock().ok().and_then(|mut slot| slot.take());
    if let Some(path) = path {
        tracing::debug!(path = %path.display(), "removing workspace after interrupt");
        if let Err(err) = std::fs::remove_dir_all(&path) {
            tracing::warn!(path = %path.display(), error = %err, "failed to remove workspace");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_cleanup_removes_registered_workspace() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().join("ws");
        std::fs::create_dir(&dir).unwrap();

        let guard = register(&dir);
        cleanup();
        assert!(!dir.exists());
        drop(guard);
        assert!(ACTIVE_WORKSPACE.lock().unwrap().is_none());
    }
}
