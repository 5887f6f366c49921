//! Block verifier threads (consumers)
//!
//! Each verifier:
//! - Pulls file tasks from the task queue until it is closed and drained
//! - Skips files pending deletion
//! - Derives the object key of every block and looks it up in the store
//! - Records files with missing blocks in the shared broken map

use crate::chunk::{slice_blocks, KeyLayout};
use crate::deleted::DeletedSet;
use crate::error::WorkerError;
use crate::meta::{Context, Meta};
use crate::object::ObjectStorage;
use crate::report::BrokenFiles;
use crate::walker::queue::{FileTask, TaskReceiver};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::{debug, error, info, trace};

/// Log a progress line every this many checked files
pub const PROGRESS_LOG_INTERVAL: u64 = 100;

/// Statistics collected by a verifier
#[derive(Debug, Default)]
pub struct VerifyStats {
    /// Files whose blocks were looked up
    pub files_checked: AtomicU64,

    /// Blocks looked up
    pub blocks_checked: AtomicU64,

    /// Blocks not found (or not reachable)
    pub blocks_missing: AtomicU64,

    /// Files skipped because they are pending deletion
    pub files_deleted: AtomicU64,
}

impl VerifyStats {
    fn record_file(&self) {
        self.files_checked.fetch_add(1, Ordering::Relaxed);
    }

    fn record_block(&self) {
        self.blocks_checked.fetch_add(1, Ordering::Relaxed);
    }

    fn record_missing(&self) {
        self.blocks_missing.fetch_add(1, Ordering::Relaxed);
    }

    fn record_deleted(&self) {
        self.files_deleted.fetch_add(1, Ordering::Relaxed);
    }
}

/// Totals over all verifiers
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct VerifySummary {
    pub files_checked: u64,
    pub blocks_checked: u64,
    pub blocks_missing: u64,
    pub files_deleted: u64,
}

/// State shared by every verifier of a run
pub struct VerifyShared {
    pub meta: Arc<dyn Meta>,
    pub ctx: Context,
    /// Store scoped to the chunk namespace
    pub store: Arc<dyn ObjectStorage>,
    pub layout: KeyLayout,
    /// Block size in bytes
    pub block_size: u32,
    pub deleted: Arc<DeletedSet>,
    pub broken: Arc<BrokenFiles>,
    /// Files checked by all verifiers together
    pub processed: Arc<AtomicU64>,
}

/// A thread verifying the blocks of queued files
pub struct BlockVerifier {
    /// Verifier ID
    id: usize,

    /// Thread handle
    handle: Option<JoinHandle<Result<(), WorkerError>>>,

    /// Verifier statistics
    stats: Arc<VerifyStats>,
}

impl BlockVerifier {
    /// Spawn a new verifier thread
    pub fn spawn(
        id: usize,
        shared: Arc<VerifyShared>,
        tasks: TaskReceiver,
    ) -> Result<Self, WorkerError> {
        let stats = Arc::new(VerifyStats::default());
        let stats_clone = Arc::clone(&stats);

        let handle = thread::Builder::new()
            .name(format!("verifier-{}", id))
            .spawn(move || verifier_loop(id, shared, tasks, stats_clone))
            .map_err(|e| WorkerError::SpawnFailed {
                id,
                reason: e.to_string(),
            })?;

        Ok(Self {
            id,
            handle: Some(handle),
            stats,
        })
    }

    /// Get verifier ID
    pub fn id(&self) -> usize {
        self.id
    }

    /// Get verifier statistics
    pub fn stats(&self) -> Arc<VerifyStats> {
        Arc::clone(&self.stats)
    }

    /// Wait for the verifier to finish
    pub fn join(mut self) -> Result<(), WorkerError> {
        if let Some(handle) = self.handle.take() {
            match handle.join() {
                Ok(result) => result,
                Err(_) => Err(WorkerError::Panicked {
                    id: self.id,
                    message: "Verifier thread panicked".into(),
                }),
            }
        } else {
            Ok(())
        }
    }
}

/// Main verifier loop
fn verifier_loop(
    id: usize,
    shared: Arc<VerifyShared>,
    tasks: TaskReceiver,
    stats: Arc<VerifyStats>,
) -> Result<(), WorkerError> {
    debug!(worker = id, "Verifier starting");

    while let Some(task) = tasks.recv() {
        verify_file(&shared, &task, &stats);
    }

    debug!(
        worker = id,
        files = stats.files_checked.load(Ordering::Relaxed),
        blocks = stats.blocks_checked.load(Ordering::Relaxed),
        missing = stats.blocks_missing.load(Ordering::Relaxed),
        "Verifier finished"
    );

    Ok(())
}

/// Look up every block of one file
///
/// Returns the number of missing blocks.
pub fn verify_file(shared: &VerifyShared, task: &FileTask, stats: &VerifyStats) -> u64 {
    if shared.deleted.contains(task.inode) {
        trace!(inode = %task.inode, "Skipping file pending deletion");
        stats.record_deleted();
        return 0;
    }

    stats.record_file();
    let processed = shared.processed.fetch_add(1, Ordering::Relaxed) + 1;
    if processed % PROGRESS_LOG_INTERVAL == 0 {
        info!(count = processed, "check file num");
    }

    let mut missing = 0;
    for slice in &task.slices {
        for block in slice_blocks(slice, shared.block_size) {
            let key = block.object_key(shared.layout);
            stats.record_block();

            if let Err(e) = shared.store.head(&key) {
                missing += 1;
                stats.record_missing();
                shared.broken.record(task.inode, || {
                    shared
                        .meta
                        .get_paths(&shared.ctx, task.inode)
                        .into_iter()
                        .next()
                        .unwrap_or_else(|| format!("inode:{}", task.inode))
                });
                error!(
                    key = %key,
                    file = %task.name,
                    inode = %task.inode,
                    error = %e,
                    "can't find block"
                );
            }
        }
    }

    missing
}

/// Aggregate statistics from multiple verifiers
pub fn aggregate_stats(stats: &[Arc<VerifyStats>]) -> VerifySummary {
    stats
        .iter()
        .fold(VerifySummary::default(), |mut total, stats| {
            total.files_checked += stats.files_checked.load(Ordering::Relaxed);
            total.blocks_checked += stats.blocks_checked.load(Ordering::Relaxed);
            total.blocks_missing += stats.blocks_missing.load(Ordering::Relaxed);
            total.files_deleted += stats.files_deleted.load(Ordering::Relaxed);
            total
        })
}
