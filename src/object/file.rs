//! Object store backed by a local directory
//!
//! Each key maps to the file at `<root>/<key>`.

use super::{ObjectInfo, ObjectStorage};
use crate::error::{StorageError, StorageResult};
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone)]
pub struct FileStorage {
    root: PathBuf,
}

impl FileStorage {
    /// Open the store rooted at `bucket`, which must be an existing directory
    pub fn open(bucket: &str) -> StorageResult<Self> {
        let init_failed = |reason: String| StorageError::InitFailed {
            storage: "file".into(),
            bucket: bucket.to_string(),
            reason,
        };

        let root = bucket.strip_prefix("file://").unwrap_or(bucket);
        if root.is_empty() {
            return Err(init_failed("empty bucket path".into()));
        }

        let root = PathBuf::from(root);
        let meta = std::fs::metadata(&root).map_err(|e| init_failed(e.to_string()))?;
        if !meta.is_dir() {
            return Err(init_failed("not a directory".into()));
        }
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_of(&self, key: &str) -> PathBuf {
        self.root.join(key.trim_start_matches('/'))
    }
}

impl ObjectStorage for FileStorage {
    fn head(&self, key: &str) -> StorageResult<ObjectInfo> {
        let path = self.path_of(key);
        match std::fs::metadata(&path) {
            // Directories are prefixes, not objects
            Ok(meta) if meta.is_dir() => Err(StorageError::NotFound {
                key: key.to_string(),
            }),
            Ok(meta) => Ok(ObjectInfo {
                key: key.to_string(),
                size: meta.len(),
                mtime: meta.modified().ok(),
            }),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Err(StorageError::NotFound {
                key: key.to_string(),
            }),
            Err(e) => Err(StorageError::Io {
                key: key.to_string(),
                reason: e.to_string(),
            }),
        }
    }
}

impl fmt::Display for FileStorage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "file://{}/", self.root.display())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_head_existing_and_missing() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join("x")).unwrap();
        std::fs::write(dir.path().join("x/obj"), vec![0u8; 128]).unwrap();

        let store = FileStorage::open(&dir.path().display().to_string()).unwrap();
        let info = store.head("x/obj").unwrap();
        assert_eq!(info.size, 128);
        assert!(info.mtime.is_some());

        assert!(store.head("x/missing").unwrap_err().is_not_found());
        assert!(store.head("x").unwrap_err().is_not_found());
    }

    #[test]
    fn test_open_requires_directory() {
        assert!(FileStorage::open("").is_err());
        assert!(FileStorage::open("/nonexistent/pfsck/bucket").is_err());

        let dir = TempDir::new().unwrap();
        let file = dir.path().join("plain");
        std::fs::write(&file, b"x").unwrap();
        assert!(matches!(
            FileStorage::open(&file.display().to_string()),
            Err(StorageError::InitFailed { .. })
        ));
    }

    #[test]
    fn test_open_accepts_file_scheme() {
        let dir = TempDir::new().unwrap();
        let store = FileStorage::open(&format!("file://{}", dir.path().display())).unwrap();
        assert_eq!(store.root(), dir.path());
    }
}
