//! Check coordinator - orchestrates the parallel consistency check
//!
//! The coordinator is responsible for:
//! - Resolving the start path
//! - Starting the tree walker and the block verifiers
//! - Collecting the pending-deletion set while the walk runs
//! - Progress reporting and graceful shutdown
//! - Writing the fail record

use crate::chunk::KeyLayout;
use crate::config::CheckConfig;
use crate::deleted::scan_deleted;
use crate::error::{FsckError, Result, WorkerError};
use crate::meta::{self, Context, Format, Ino, Meta};
use crate::object::{create_storage, ObjectStorage, WithPrefix};
use crate::report::{self, BrokenFiles};
use crate::resolve::resolve;
use crate::walker::queue::task_queue;
use crate::walker::tree::{TreeWalker, WalkStats};
use crate::walker::worker::{aggregate_stats, BlockVerifier, VerifyShared, VerifySummary};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Result of a completed check
#[derive(Debug)]
pub struct FsckResult {
    /// Inode the check started from
    pub root: Ino,

    /// Broken files: inode to display path
    pub broken: HashMap<Ino, String>,

    /// Directories listed
    pub dirs: u64,

    /// Files queued by the walker
    pub files_queued: u64,

    /// Files skipped by the cutoff
    pub files_too_old: u64,

    /// Verifier totals
    pub verify: VerifySummary,

    /// Inodes pending deletion at scan time
    pub deleted: usize,

    /// Listing/slice errors during the walk
    pub errors: u64,

    /// Whether the fail record was written
    pub report_written: bool,

    /// Time taken for the check
    pub duration: Duration,

    /// Whether the walk completed (vs was interrupted)
    pub completed: bool,
}

impl FsckResult {
    /// Returns true if no broken file was found
    pub fn is_clean(&self) -> bool {
        self.broken.is_empty()
    }
}

/// Progress information for display
#[derive(Debug, Clone, Default)]
pub struct FsckProgress {
    /// Directories listed
    pub dirs: u64,

    /// Files queued by the walker
    pub queued: u64,

    /// Files checked by the verifiers
    pub checked: u64,

    /// Broken files so far
    pub broken: usize,

    /// Total verifiers
    pub total_workers: usize,

    /// Elapsed time
    pub elapsed: Duration,
}

impl FsckProgress {
    /// Calculate checked files per second
    pub fn files_per_second(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs > 0.0 {
            self.checked as f64 / secs
        } else {
            0.0
        }
    }
}

/// Coordinates one consistency check
pub struct FsckCoordinator {
    /// Configuration
    config: Arc<CheckConfig>,

    /// Metadata engine
    meta: Arc<dyn Meta>,

    /// Volume settings
    format: Format,

    /// Object store scoped to the volume
    store: Arc<dyn ObjectStorage>,

    /// Shutdown signal (also the walk's cancellation flag)
    shutdown: Arc<AtomicBool>,

    /// Files checked across all verifiers
    processed: Arc<AtomicU64>,

    /// Walker statistics
    walk_stats: Arc<WalkStats>,

    /// Broken files found so far
    broken: Arc<BrokenFiles>,
}

impl FsckCoordinator {
    /// Open the metadata engine and object store named by the configuration
    pub fn open(config: CheckConfig) -> Result<Self> {
        let meta = meta::open(&config.meta_url)?;
        let format = meta.load()?;
        format.block_size_bytes()?;
        info!(
            engine = meta.name(),
            volume = %format.name,
            storage = %format.storage,
            block_size_kib = format.block_size,
            hash_prefix = format.hash_prefix,
            "Loaded volume format"
        );

        let store = create_storage(&format)?;
        info!("Data use {}", store);

        Ok(Self::new(config, meta, format, store))
    }

    /// Create a coordinator over already opened collaborators
    pub fn new(
        config: CheckConfig,
        meta: Arc<dyn Meta>,
        format: Format,
        store: Arc<dyn ObjectStorage>,
    ) -> Self {
        Self {
            config: Arc::new(config),
            meta,
            format,
            store,
            shutdown: Arc::new(AtomicBool::new(false)),
            processed: Arc::new(AtomicU64::new(0)),
            walk_stats: Arc::new(WalkStats::default()),
            broken: Arc::new(BrokenFiles::new()),
        }
    }

    /// Get a clone of the shutdown flag (for signal handlers)
    pub fn shutdown_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.shutdown)
    }

    /// Volume format this check runs against
    pub fn format(&self) -> &Format {
        &self.format
    }

    /// Current progress snapshot
    pub fn progress(&self, elapsed: Duration) -> FsckProgress {
        FsckProgress {
            dirs: self.walk_stats.dirs(),
            queued: self.walk_stats.queued(),
            checked: self.processed.load(Ordering::Relaxed),
            broken: self.broken.len(),
            total_workers: self.config.worker_count,
            elapsed,
        }
    }

    /// Run the check
    pub fn run(&self) -> Result<FsckResult> {
        let start_time = Instant::now();
        let start_datetime: DateTime<Utc> = Utc::now();
        let config = &self.config;

        info!(
            path = %config.path,
            concurrent = config.worker_count,
            cutoff = config.has_cutoff().then_some(config.cutoff),
            "scan check path"
        );
        debug!(start_time = %start_datetime.to_rfc3339(), "Check started");

        if config.repair {
            warn!("--repair is not supported by this checker, broken files are only reported");
        }
        if config.sync_dir_stat {
            warn!("--sync-dir-stat is not supported by this checker, ignoring");
        }

        let block_size = self.format.block_size_bytes()?;
        let ctx = Context::root().with_cancel_flag(Arc::clone(&self.shutdown));

        let (root, root_attr) =
            resolve(self.meta.as_ref(), &ctx, &config.path).map_err(|source| {
                FsckError::Resolve {
                    path: config.path.clone(),
                    source,
                }
            })?;
        info!(inode = %root, "scan inode");

        let chunks: Arc<dyn ObjectStorage> =
            Arc::new(WithPrefix::new(Arc::clone(&self.store), "chunks/"));

        // Start the producer
        let (tasks_tx, tasks_rx) = task_queue(config.queue_size);
        let queue_stats = tasks_rx.stats();
        let walker = TreeWalker::new(Arc::clone(&self.meta), ctx.clone(), config.cutoff)
            .with_stats(Arc::clone(&self.walk_stats));
        let walker_handle = walker.spawn(root, root_attr, tasks_tx)?;

        // Collect the deletion set while the walk runs; verifiers only start
        // once it is complete
        let deleted = Arc::new(scan_deleted(self.meta.as_ref(), &ctx));
        info!(count = deleted.len(), "Scanned files pending deletion");

        let shared = Arc::new(VerifyShared {
            meta: Arc::clone(&self.meta),
            ctx: ctx.clone(),
            store: chunks,
            layout: KeyLayout::from_hash_prefix(self.format.hash_prefix),
            block_size,
            deleted: Arc::clone(&deleted),
            broken: Arc::clone(&self.broken),
            processed: Arc::clone(&self.processed),
        });

        let mut verifiers = Vec::with_capacity(config.worker_count);
        for id in 0..config.worker_count {
            match BlockVerifier::spawn(id, Arc::clone(&shared), tasks_rx.clone()) {
                Ok(verifier) => verifiers.push(verifier),
                Err(e) => {
                    // Stop the walker so the verifiers already running can drain
                    self.shutdown.store(true, Ordering::SeqCst);
                    drop(tasks_rx);
                    return Err(e.into());
                }
            }
        }
        drop(tasks_rx);
        debug!(count = verifiers.len(), "Verifiers spawned");

        // Verifiers return once the walker has closed the queue and it is drained
        let verifier_stats: Vec<_> = verifiers.iter().map(BlockVerifier::stats).collect();
        for verifier in verifiers {
            let id = verifier.id();
            if let Err(e) = verifier.join() {
                warn!(worker = id, error = %e, "Verifier failed to join cleanly");
            }
        }
        let verify = aggregate_stats(&verifier_stats);

        let walk_completed = walker_handle
            .join()
            .map_err(|_| WorkerError::Walker("tree walker panicked".into()))?;

        let processed = self.processed.load(Ordering::Relaxed);
        info!(count = processed, "check file total num");

        let broken = self.broken.snapshot();
        let report_written = report::write_report(&config.fail_record, &broken)?;

        let duration = start_time.elapsed();
        let completed = walk_completed && !self.shutdown.load(Ordering::Relaxed);

        info!(
            dirs = self.walk_stats.dirs(),
            files = verify.files_checked,
            blocks = verify.blocks_checked,
            missing_blocks = verify.blocks_missing,
            broken = broken.len(),
            backpressure = queue_stats.backpressure_count(),
            duration_secs = duration.as_secs(),
            completed = completed,
            "Check completed"
        );

        Ok(FsckResult {
            root,
            broken,
            dirs: self.walk_stats.dirs(),
            files_queued: self.walk_stats.queued(),
            files_too_old: self.walk_stats.too_old(),
            verify,
            deleted: deleted.len(),
            errors: self.walk_stats.error_count(),
            report_written,
            duration,
            completed,
        })
    }

    /// Run the check while a background thread feeds `progress_callback`
    pub fn run_with_progress<F>(&self, progress_callback: F) -> Result<FsckResult>
    where
        F: Fn(FsckProgress) + Send + 'static,
    {
        let start = Instant::now();
        let done = Arc::new(AtomicBool::new(false));
        let done_flag = Arc::clone(&done);
        let walk_stats = Arc::clone(&self.walk_stats);
        let processed = Arc::clone(&self.processed);
        let broken = Arc::clone(&self.broken);
        let total_workers = self.config.worker_count;

        let progress_handle = thread::Builder::new()
            .name("progress".into())
            .spawn(move || {
                while !done_flag.load(Ordering::Relaxed) {
                    progress_callback(FsckProgress {
                        dirs: walk_stats.dirs(),
                        queued: walk_stats.queued(),
                        checked: processed.load(Ordering::Relaxed),
                        broken: broken.len(),
                        total_workers,
                        elapsed: start.elapsed(),
                    });
                    thread::sleep(Duration::from_millis(100));
                }
            })
            .map_err(|e| WorkerError::SpawnFailed {
                id: usize::MAX,
                reason: e.to_string(),
            })?;

        let result = self.run();

        done.store(true, Ordering::SeqCst);
        let _ = progress_handle.join();

        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MetaUrl;
    use crate::meta::{MemMeta, Slice};
    use crate::object::MemStorage;
    use tempfile::TempDir;

    fn config(dir: &TempDir) -> CheckConfig {
        let mut config = CheckConfig::new(MetaUrl::parse("mem://").unwrap());
        config.fail_record = dir.path().join("fail.txt");
        config
    }

    #[test]
    fn test_progress_rates() {
        let progress = FsckProgress {
            checked: 1000,
            elapsed: Duration::from_secs(10),
            ..Default::default()
        };
        assert!((progress.files_per_second() - 100.0).abs() < 0.1);
    }

    #[test]
    fn test_run_reports_missing_block() {
        let dir = TempDir::new().unwrap();
        let format = Format::default();
        let meta = Arc::new(MemMeta::new(format.clone()));
        let f = meta
            .create(Ino::ROOT, "f", 0o644, vec![Slice::new(1, 100)], 0)
            .unwrap();
        let store = Arc::new(MemStorage::new());

        let coordinator = FsckCoordinator::new(config(&dir), meta, format, store);
        let result = coordinator.run().unwrap();

        assert!(result.completed);
        assert_eq!(result.broken.get(&f).map(String::as_str), Some("/f"));
        assert!(result.report_written);
        assert_eq!(result.verify.files_checked, 1);
    }

    #[test]
    fn test_run_unresolvable_path_is_fatal() {
        let dir = TempDir::new().unwrap();
        let format = Format::default();
        let meta = Arc::new(MemMeta::new(format.clone()));
        let mut config = config(&dir);
        config.path = "/missing".into();

        let coordinator =
            FsckCoordinator::new(config, meta, format, Arc::new(MemStorage::new()));
        assert!(matches!(
            coordinator.run(),
            Err(FsckError::Resolve { .. })
        ));
    }

    #[test]
    fn test_run_with_progress() {
        let dir = TempDir::new().unwrap();
        let format = Format::default();
        let meta = Arc::new(MemMeta::new(format.clone()));
        meta.create(Ino::ROOT, "empty", 0o644, vec![], 0).unwrap();

        let coordinator =
            FsckCoordinator::new(config(&dir), meta, format, Arc::new(MemStorage::new()));
        let result = coordinator.run_with_progress(|_| {}).unwrap();
        assert!(result.is_clean());
        assert!(!result.report_written);
        assert_eq!(coordinator.progress(result.duration).checked, 1);
    }
}
