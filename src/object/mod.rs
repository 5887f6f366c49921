//! Object storage access
//!
//! Data blocks live in an object store addressed by string keys. The checker
//! only needs an existence check (`head`), so that is all [`ObjectStorage`]
//! asks for.
//!
//! Stores are composed: a backend ([`FileStorage`], [`MemStorage`]) is scoped
//! under the volume name with [`WithPrefix`], and the checker scopes it again
//! under `chunks/`.
//!
//! A fresh [`MemStorage`] is empty, so it is only used by callers that fill
//! one and hand it to [`FsckCoordinator::new`](crate::walker::FsckCoordinator::new).

mod file;
mod memory;
mod prefix;

pub use file::FileStorage;
pub use memory::MemStorage;
pub use prefix::WithPrefix;

use crate::error::{StorageError, StorageResult};
use crate::meta::Format;
use std::fmt;
use std::sync::Arc;
use std::time::SystemTime;
use tracing::info;

/// Metadata returned by an existence check
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectInfo {
    /// Key relative to the store it was looked up on
    pub key: String,

    /// Object size in bytes
    pub size: u64,

    /// Last modification time, if the backend tracks one
    pub mtime: Option<SystemTime>,
}

/// A store of immutable objects
///
/// `Display` names the store (and its prefix) for log lines.
pub trait ObjectStorage: Send + Sync + fmt::Display {
    /// Look up an object without reading its content
    fn head(&self, key: &str) -> StorageResult<ObjectInfo>;
}

impl<T: ObjectStorage + ?Sized> ObjectStorage for Arc<T> {
    fn head(&self, key: &str) -> StorageResult<ObjectInfo> {
        (**self).head(key)
    }
}

/// Build the object store described by the volume format
///
/// The returned store is already scoped under `<volume name>/`. A volume
/// naming `mem` storage is rejected: a fresh in-memory store is empty and
/// would report every block missing.
pub fn create_storage(format: &Format) -> StorageResult<Arc<dyn ObjectStorage>> {
    let backend: Arc<dyn ObjectStorage> = match format.storage.as_str() {
        "file" => Arc::new(FileStorage::open(&format.bucket)?),
        other => {
            return Err(StorageError::Unsupported {
                storage: other.to_string(),
            })
        }
    };

    let store = WithPrefix::new(backend, format!("{}/", format.name));
    info!(storage = %store, "Created object storage");
    Ok(Arc::new(store))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_mem_storage_not_openable() {
        let format = Format {
            name: "vol".into(),
            storage: "mem".into(),
            ..Default::default()
        };
        assert!(matches!(
            create_storage(&format).err().unwrap(),
            StorageError::Unsupported { storage } if storage == "mem"
        ));
    }

    #[test]
    fn test_create_file_storage() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join("vol/chunks/0/0")).unwrap();
        std::fs::write(dir.path().join("vol/chunks/0/0/1_0_5"), b"hello").unwrap();

        let format = Format {
            name: "vol".into(),
            storage: "file".into(),
            bucket: dir.path().display().to_string(),
            ..Default::default()
        };
        let store = create_storage(&format).unwrap();
        assert!(store.to_string().ends_with("vol/"));
        assert_eq!(store.head("chunks/0/0/1_0_5").unwrap().size, 5);
        assert!(store.head("chunks/0/0/2_0_5").unwrap_err().is_not_found());
    }

    #[test]
    fn test_create_unsupported_storage() {
        let format = Format {
            storage: "s3".into(),
            ..Default::default()
        };
        assert!(matches!(
            create_storage(&format).err().unwrap(),
            StorageError::Unsupported { .. }
        ));
    }
}
