use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Failure to inspect a family's root directory.
///
/// Per-file problems below the root never surface as a `WatchError`; they
/// are logged and the file is skipped.
#[derive(Error, Debug)]
pub enum WatchError {
    #[error("cannot access log directory {path}: {source}")]
    RootAccess {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("log root {0} is not a directory")]
    NotADirectory(PathBuf),

    #[error("invalid directory pattern: {0}")]
    Pattern(String),
}

/// I/O failure while following a file.
#[derive(Error, Debug)]
pub enum TailError {
    #[error("failed to open {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to position {path} at offset {offset}: {source}")]
    Seek {
        path: PathBuf,
        offset: u64,
        #[source]
        source: io::Error,
    },

    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}
