//! In-memory object store

use super::{ObjectInfo, ObjectStorage};
use crate::error::{StorageError, StorageResult};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::fmt;
use std::time::SystemTime;

/// Object store holding object sizes in a map
///
/// Content is never read by the checker, so only the size is kept.
#[derive(Debug, Default)]
pub struct MemStorage {
    objects: RwLock<HashMap<String, (u64, SystemTime)>>,
}

impl MemStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store an object of `size` bytes under `key`
    pub fn put(&self, key: impl Into<String>, size: u64) {
        self.objects
            .write()
            .insert(key.into(), (size, SystemTime::now()));
    }

    /// Remove an object, returning whether it existed
    pub fn remove(&self, key: &str) -> bool {
        self.objects.write().remove(key).is_some()
    }

    /// Number of stored objects
    pub fn len(&self) -> usize {
        self.objects.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.read().is_empty()
    }
}

impl ObjectStorage for MemStorage {
    fn head(&self, key: &str) -> StorageResult<ObjectInfo> {
        self.objects
            .read()
            .get(key)
            .map(|(size, mtime)| ObjectInfo {
                key: key.to_string(),
                size: *size,
                mtime: Some(*mtime),
            })
            .ok_or_else(|| StorageError::NotFound {
                key: key.to_string(),
            })
    }
}

impl fmt::Display for MemStorage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "mem://")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_put_head_remove() {
        let store = MemStorage::new();
        assert!(store.is_empty());
        store.put("a/b", 42);
        assert_eq!(store.head("a/b").unwrap().size, 42);
        assert!(store.remove("a/b"));
        assert!(store.head("a/b").unwrap_err().is_not_found());
        assert!(!store.remove("a/b"));
    }
}
