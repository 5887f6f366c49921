//! Key namespacing

use super::{ObjectInfo, ObjectStorage};
use crate::error::StorageResult;
use std::fmt;

/// Scopes every key of an inner store under a fixed prefix
pub struct WithPrefix<S> {
    inner: S,
    prefix: String,
}

impl<S: ObjectStorage> WithPrefix<S> {
    pub fn new(inner: S, prefix: impl Into<String>) -> Self {
        Self {
            inner,
            prefix: prefix.into(),
        }
    }
}

impl<S: ObjectStorage> ObjectStorage for WithPrefix<S> {
    fn head(&self, key: &str) -> StorageResult<ObjectInfo> {
        let full = format!("{}{}", self.prefix, key);
        let mut info = self.inner.head(&full)?;
        info.key = key.to_string();
        Ok(info)
    }
}

impl<S: ObjectStorage> fmt::Display for WithPrefix<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.inner, self.prefix)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::MemStorage;
    use std::sync::Arc;

    #[test]
    fn test_nested_prefixes() {
        let backend = Arc::new(MemStorage::new());
        backend.put("vol/chunks/0/0/1_0_4", 4);

        let volume = WithPrefix::new(Arc::clone(&backend), "vol/");
        let chunks = WithPrefix::new(volume, "chunks/");

        let info = chunks.head("0/0/1_0_4").unwrap();
        assert_eq!(info.key, "0/0/1_0_4");
        assert_eq!(chunks.to_string(), "mem://vol/chunks/");
        assert!(chunks.head("0/0/1_0_5").unwrap_err().is_not_found());
    }
}
