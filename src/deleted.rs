//! Inodes pending deletion
//!
//! Files that were unlinked but whose data has not been reclaimed yet still
//! own slices, and their blocks may already be gone. They are collected once
//! per run and excluded from verification.

use crate::meta::{Context, Ino, Meta};
use std::collections::HashSet;
use tracing::{debug, warn};

/// Set of inodes excluded from verification
#[derive(Debug, Clone, Default)]
pub struct DeletedSet {
    inodes: HashSet<Ino>,
}

impl DeletedSet {
    /// Set with nothing excluded
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn contains(&self, ino: Ino) -> bool {
        self.inodes.contains(&ino)
    }

    pub fn len(&self) -> usize {
        self.inodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inodes.is_empty()
    }
}

impl FromIterator<Ino> for DeletedSet {
    fn from_iter<I: IntoIterator<Item = Ino>>(iter: I) -> Self {
        Self {
            inodes: iter.into_iter().collect(),
        }
    }
}

/// Collect every inode the engine reports as pending deletion
///
/// Best effort: a failed scan is logged and yields an empty set.
pub fn scan_deleted(meta: &dyn Meta, ctx: &Context) -> DeletedSet {
    let mut inodes = HashSet::new();
    let result = meta.scan_deleted_objects(ctx, &mut |ino, length, ts| {
        debug!(inode = %ino, length = length, ts = ts, "Pending deletion");
        inodes.insert(ino);
    });

    match result {
        Ok(()) => DeletedSet { inodes },
        Err(e) => {
            warn!(error = %e, "scan deleted objects failed, checking every file");
            DeletedSet::empty()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::MetaError;
    use crate::meta::{Format, MemMeta, Slice};

    #[test]
    fn test_scan_collects_unlinked_files() {
        let meta = MemMeta::new(Format::default());
        let keep = meta
            .create(Ino::ROOT, "keep", 0o644, vec![Slice::new(1, 10)], 0)
            .unwrap();
        let gone = meta
            .create(Ino::ROOT, "gone", 0o644, vec![Slice::new(2, 10)], 0)
            .unwrap();
        meta.unlink(Ino::ROOT, "gone").unwrap();
        meta.mark_deleted(Ino(500), 0, 0);

        let set = scan_deleted(&meta, &Context::root());
        assert_eq!(set.len(), 2);
        assert!(set.contains(gone));
        assert!(set.contains(Ino(500)));
        assert!(!set.contains(keep));
    }

    #[test]
    fn test_scan_failure_degrades_to_empty() {
        let meta = MemMeta::new(Format::default());
        meta.mark_deleted(Ino(7), 0, 0);
        meta.inject_scan_error(MetaError::Io("timeout".into()));

        let set = scan_deleted(&meta, &Context::root());
        assert!(set.is_empty());
    }

    #[test]
    fn test_from_iterator() {
        let set: DeletedSet = [Ino(1), Ino(2), Ino(2)].into_iter().collect();
        assert_eq!(set.len(), 2);
    }
}
