//! Metadata engine access
//!
//! The checker only talks to the metadata engine through the [`Meta`] trait.
//! This build ships an in-memory engine ([`MemMeta`]) which can be populated
//! from a JSON metadata dump.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │                    dyn Meta                          │
//! │  - Shared by the resolver, walker and all workers    │
//! │  - Send + Sync, internally synchronized              │
//! └─────────────────────────────────────────────────────┘
//!                          │
//!                          ▼
//! ┌─────────────────────────────────────────────────────┐
//! │   MemMeta  (built directly, or loaded from a dump)   │
//! └─────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```
//! use pfsck::meta::{Context, Format, Ino, MemMeta, Meta, Slice};
//!
//! let meta = MemMeta::new(Format::default());
//! let dir = meta.mkdir(Ino::ROOT, "data", 0o755).unwrap();
//! meta.create(dir, "file", 0o644, vec![Slice::new(1, 1024)], 0).unwrap();
//!
//! let ctx = Context::root();
//! let entries = meta.readdir(&ctx, dir).unwrap();
//! assert!(entries.iter().any(|e| e.name == "file"));
//! ```

pub mod dump;
pub mod internal;
mod memory;
pub mod types;

pub use memory::{MemMeta, NodeData};
pub use types::{Attr, Entry, FileType, Format, Ino, Slice};

use crate::config::MetaUrl;
use crate::error::{MetaError, MetaResult};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::info;

/// Read permission bit for [`Meta::access`]
pub const MODE_MASK_R: u8 = 4;

/// Execute/search permission bit for [`Meta::access`]
pub const MODE_MASK_X: u8 = 1;

/// Caller identity and cancellation for metadata operations
#[derive(Debug, Clone)]
pub struct Context {
    uid: u32,
    gid: u32,
    gids: Vec<u32>,
    canceled: Arc<AtomicBool>,
}

impl Context {
    /// Create a context for the given identity
    pub fn new(uid: u32, gid: u32, gids: Vec<u32>) -> Self {
        Self {
            uid,
            gid,
            gids,
            canceled: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Context with root identity
    pub fn root() -> Self {
        Self::new(0, 0, vec![0])
    }

    /// Share an existing cancellation flag (e.g. one set by a signal handler)
    pub fn with_cancel_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.canceled = flag;
        self
    }

    pub fn uid(&self) -> u32 {
        self.uid
    }

    pub fn gid(&self) -> u32 {
        self.gid
    }

    pub fn gids(&self) -> &[u32] {
        &self.gids
    }

    /// Check whether cancellation has been requested
    pub fn canceled(&self) -> bool {
        self.canceled.load(Ordering::Relaxed)
    }

    /// Request cancellation
    pub fn cancel(&self) {
        self.canceled.store(true, Ordering::SeqCst);
    }

    /// Get the cancellation flag (for signal handlers)
    pub fn cancel_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.canceled)
    }
}

/// Operations the checker needs from a metadata engine
pub trait Meta: Send + Sync {
    /// Engine name for logging
    fn name(&self) -> &str;

    /// Load the volume format
    fn load(&self) -> MetaResult<Format>;

    /// Fetch attributes of an inode
    fn getattr(&self, ctx: &Context, ino: Ino) -> MetaResult<Attr>;

    /// Look up a single child by name
    fn lookup(&self, ctx: &Context, parent: Ino, name: &str) -> MetaResult<(Ino, Attr)>;

    /// Resolve a whole path below `parent` in one call
    ///
    /// Optional capability; engines without it return `NotSupported`.
    fn resolve(&self, _ctx: &Context, _parent: Ino, _path: &str) -> MetaResult<(Ino, Attr)> {
        Err(MetaError::NotSupported("resolve".into()))
    }

    /// Check `mask` (combination of `MODE_MASK_*`) against the caller
    fn access(&self, ctx: &Context, ino: Ino, mask: u8) -> MetaResult<()>;

    /// List a directory, including `.` and `..`
    fn readdir(&self, ctx: &Context, ino: Ino) -> MetaResult<Vec<Entry>>;

    /// Read a symlink target
    fn readlink(&self, ctx: &Context, ino: Ino) -> MetaResult<Vec<u8>>;

    /// List the slices that make up a file
    fn list_slices(&self, ctx: &Context, ino: Ino) -> MetaResult<Vec<Slice>>;

    /// Visit every inode pending deletion as `(inode, length, timestamp)`
    fn scan_deleted_objects(
        &self,
        ctx: &Context,
        visit: &mut dyn FnMut(Ino, u64, i64),
    ) -> MetaResult<()>;

    /// All paths leading to an inode (may be empty)
    fn get_paths(&self, ctx: &Context, ino: Ino) -> Vec<String>;
}

/// Open the metadata engine named by `url`
pub fn open(url: &MetaUrl) -> MetaResult<Arc<dyn Meta>> {
    info!(url = %url.redacted(), "Opening metadata engine");

    match url.scheme.as_str() {
        "json" => {
            let meta = dump::load_dump(Path::new(&url.address))?;
            Ok(Arc::new(meta))
        }
        "mem" => Ok(Arc::new(MemMeta::new(Format::default()))),
        other => Err(MetaError::UnsupportedEngine {
            scheme: other.to_string(),
        }),
    }
}
