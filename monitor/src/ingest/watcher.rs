//! Polling directory watcher.
//!
//! The watcher answers one question: which regular file below a root
//! directory was modified most recently? It is polled by the tailer instead
//! of being driven by change notifications, so it behaves the same on every
//! filesystem. Anything implementing [`Watcher`] can stand in for it.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use glob::{Pattern, glob};
use tracing::{debug, warn};

use super::error::WatchError;

/// Source of "the current file" for a log family.
pub trait Watcher: Send {
    /// Returns the most recently modified file, or `None` when there is
    /// nothing to follow yet.
    fn latest_file(&self) -> Result<Option<PathBuf>, WatchError>;
}

/// Recursively scans a root directory for its newest regular file.
#[derive(Debug, Clone)]
pub struct DirectoryWatcher {
    root: PathBuf,
}

impl DirectoryWatcher {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn check_root(&self) -> Result<bool, WatchError> {
        match fs::metadata(&self.root) {
            Ok(meta) if meta.is_dir() => Ok(true),
            Ok(_) => Err(WatchError::NotADirectory(self.root.clone())),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(source) => Err(WatchError::RootAccess {
                path: self.root.clone(),
                source,
            }),
        }
    }
}

impl Watcher for DirectoryWatcher {
    fn latest_file(&self) -> Result<Option<PathBuf>, WatchError> {
        if !self.check_root()? {
            debug!(root = %self.root.display(), "log directory does not exist yet");
            return Ok(None);
        }

        let pattern = format!(
            "{}/**/*",
            Pattern::escape(&self.root.to_string_lossy())
        );
        let entries = glob(&pattern).map_err(|e| WatchError::Pattern(e.to_string()))?;

        let mut newest: Option<(SystemTime, PathBuf)> = None;
        for entry in entries {
            let path = match entry {
                Ok(path) => path,
                Err(e) => {
                    warn!(path = %e.path().display(), "skipping unreadable entry: {}", e.error());
                    continue;
                }
            };

            let modified = match fs::metadata(&path) {
                Ok(meta) if meta.is_file() => match meta.modified() {
                    Ok(modified) => modified,
                    Err(e) => {
                        warn!(path = %path.display(), "no modification time: {e}");
                        continue;
                    }
                },
                Ok(_) => continue,
                Err(e) => {
                    warn!(path = %path.display(), "skipping file: {e}");
                    continue;
                }
            };

            // Equal mtimes resolve to the greater path, so sequentially
            // named rotations pick the later name.
            let is_newer = match &newest {
                None => true,
                Some((time, best)) => modified > *time || (modified == *time && path > *best),
            };
            if is_newer {
                newest = Some((modified, path));
            }
        }

        if newest.is_none() {
            debug!(root = %self.root.display(), "no files found");
        }
        Ok(newest.map(|(_, path)| path))
    }
}
