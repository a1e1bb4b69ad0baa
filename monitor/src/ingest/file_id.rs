//! Platform-independent file identity.
//!
//! On Unix this is the device ID + inode number, which stays stable when a
//! file is renamed and changes when a path is re-created. Elsewhere the
//! creation time stands in for the inode.

use std::fs::Metadata;

/// Identity of the file behind a path at the moment it was inspected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FileId {
    dev: u64,
    ino: u64,
}

impl FileId {
    #[cfg(unix)]
    pub fn from_metadata(metadata: &Metadata) -> Self {
        use std::os::unix::fs::MetadataExt;

        Self {
            dev: metadata.dev(),
            ino: metadata.ino(),
        }
    }

    #[cfg(not(unix))]
    pub fn from_metadata(metadata: &Metadata) -> Self {
        use std::time::UNIX_EPOCH;

        let created = metadata
            .created()
            .ok()
            .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
            .map(|d| d.as_nanos() as u64)
            .unwrap_or_default();
        Self { dev: 0, ino: created }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn same_file_same_id() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("a.log");
        fs::write(&path, "x").unwrap();

        let first = FileId::from_metadata(&fs::metadata(&path).unwrap());
        let second = FileId::from_metadata(&fs::metadata(&path).unwrap());
        assert_eq!(first, second);
    }

    #[cfg(unix)]
    #[test]
    fn rename_keeps_id() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("a.log");
        fs::write(&path, "x").unwrap();
        let before = FileId::from_metadata(&fs::metadata(&path).unwrap());

        let renamed = dir.path().join("b.log");
        fs::rename(&path, &renamed).unwrap();
        let after = FileId::from_metadata(&fs::metadata(&renamed).unwrap());

        assert_eq!(before, after);
    }

    #[cfg(unix)]
    #[test]
    fn distinct_files_differ() {
        let dir = TempDir::new().unwrap();
        let a = dir.path().join("a.log");
        let b = dir.path().join("b.log");
        fs::write(&a, "x").unwrap();
        fs::write(&b, "y").unwrap();

        assert_ne!(
            FileId::from_metadata(&fs::metadata(&a).unwrap()),
            FileId::from_metadata(&fs::metadata(&b).unwrap())
        );
    }
}
