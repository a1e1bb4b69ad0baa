//! Rotating-log ingestion.
//!
//! - [`watcher`]: finds the newest file below a directory,
//! - [`tailer`]: follows that file across rotations,
//! - [`family`]: binds a directory to its line extractor.

pub mod error;
pub mod family;
pub mod file_id;
pub mod tailer;
pub mod watcher;

pub use error::{TailError, WatchError};
pub use family::{DEFAULT_IDLE_POLL, DEFAULT_ROTATION_POLL, LogFamily};
pub use file_id::FileId;
pub use tailer::{RotatingTailer, Step, TailCursor};
pub use watcher::{DirectoryWatcher, Watcher};
