//! Tree walker (producer)
//!
//! Walks the namespace below a start inode with an explicit stack and turns
//! every regular file changed at or after the cutoff into a [`FileTask`].
//!
//! - `.` and `..` are skipped, symlinks are never followed
//! - a directory that cannot be listed is logged and its subtree abandoned
//! - cancellation is checked once per entry
//! - the queue is closed exactly once, when the walk returns

use super::queue::{FileTask, TaskSender};
use crate::error::{WalkOutcome, WorkerError};
use crate::meta::{Attr, Context, Entry, FileType, Ino, Meta};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::{debug, info, trace, warn};

/// Statistics collected by the walker
#[derive(Debug, Default)]
pub struct WalkStats {
    /// Directories listed
    pub dirs_listed: AtomicU64,

    /// Files handed to the verifiers
    pub files_queued: AtomicU64,

    /// Files skipped because their ctime is before the cutoff
    pub files_too_old: AtomicU64,

    /// Symlinks skipped
    pub symlinks_skipped: AtomicU64,

    /// Fifos, devices and sockets skipped
    pub specials_skipped: AtomicU64,

    /// Listing or slice lookup failures
    pub errors: AtomicU64,
}

impl WalkStats {
    fn record_dir(&self) {
        self.dirs_listed.fetch_add(1, Ordering::Relaxed);
    }

    fn record_queued(&self) {
        self.files_queued.fetch_add(1, Ordering::Relaxed);
    }

    fn record_too_old(&self) {
        self.files_too_old.fetch_add(1, Ordering::Relaxed);
    }

    fn record_symlink(&self) {
        self.symlinks_skipped.fetch_add(1, Ordering::Relaxed);
    }

    fn record_special(&self) {
        self.specials_skipped.fetch_add(1, Ordering::Relaxed);
    }

    fn record_error(&self) {
        self.errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn dirs(&self) -> u64 {
        self.dirs_listed.load(Ordering::Relaxed)
    }

    pub fn queued(&self) -> u64 {
        self.files_queued.load(Ordering::Relaxed)
    }

    pub fn too_old(&self) -> u64 {
        self.files_too_old.load(Ordering::Relaxed)
    }

    pub fn error_count(&self) -> u64 {
        self.errors.load(Ordering::Relaxed)
    }
}

/// Walks a subtree and feeds the task queue
pub struct TreeWalker {
    meta: Arc<dyn Meta>,
    ctx: Context,
    cutoff: i64,
    stats: Arc<WalkStats>,
}

impl TreeWalker {
    /// Create a walker skipping files with ctime before `cutoff`
    ///
    /// Cancellation is taken from `ctx`.
    pub fn new(meta: Arc<dyn Meta>, ctx: Context, cutoff: i64) -> Self {
        Self {
            meta,
            ctx,
            cutoff,
            stats: Arc::new(WalkStats::default()),
        }
    }

    /// Count into an existing stats block (e.g. one a progress display reads)
    pub fn with_stats(mut self, stats: Arc<WalkStats>) -> Self {
        self.stats = stats;
        self
    }

    /// Get walker statistics
    pub fn stats(&self) -> Arc<WalkStats> {
        Arc::clone(&self.stats)
    }

    /// Run the walk on a dedicated thread
    ///
    /// The thread yields `true` if the whole subtree was visited.
    pub fn spawn(
        self,
        root: Ino,
        root_attr: Attr,
        tasks: TaskSender,
    ) -> Result<JoinHandle<bool>, WorkerError> {
        thread::Builder::new()
            .name("tree-walker".into())
            .spawn(move || self.walk(root, &root_attr, tasks))
            .map_err(|e| WorkerError::Walker(e.to_string()))
    }

    /// Walk everything below `root`, consuming (and so closing) the queue
    ///
    /// Returns `false` if the walk was cut short by cancellation or because
    /// nobody is consuming tasks anymore.
    pub fn walk(&self, root: Ino, root_attr: &Attr, tasks: TaskSender) -> bool {
        info!(inode = %root, cutoff = self.cutoff, "Starting tree walk");

        // A single file can be checked directly
        if !root_attr.typ.is_dir() {
            let entry = Entry {
                inode: root,
                name: root.to_string(),
                attr: root_attr.clone(),
            };
            let completed = !matches!(self.dispatch(&entry, &tasks), Dispatch::Stop);
            tasks.close();
            return completed;
        }

        let mut pending = vec![root];
        let mut completed = true;

        while let Some(ino) = pending.pop() {
            let outcome = self.process_directory(ino, &tasks, &mut pending);

            match &outcome {
                WalkOutcome::Success {
                    entries, subdirs, ..
                } => {
                    trace!(inode = %ino, entries = entries, subdirs = subdirs, "Directory listed");
                }
                WalkOutcome::Failed { error, .. } => {
                    warn!(
                        inode = %ino,
                        error = %error,
                        recoverable = error.is_recoverable(),
                        "readdir failed, skipping subtree"
                    );
                }
                WalkOutcome::Canceled { .. } => {
                    info!(inode = %ino, "Walk canceled");
                    completed = false;
                    break;
                }
            }
        }

        info!(
            dirs = self.stats.dirs(),
            queued = self.stats.queued(),
            too_old = self.stats.too_old(),
            errors = self.stats.error_count(),
            "Tree walk finished"
        );

        tasks.close();
        completed
    }

    /// List one directory, queue its files and stack its subdirectories
    fn process_directory(
        &self,
        ino: Ino,
        tasks: &TaskSender,
        pending: &mut Vec<Ino>,
    ) -> WalkOutcome {
        let entries = match self.meta.readdir(&self.ctx, ino) {
            Ok(entries) => entries,
            Err(error) => {
                self.stats.record_error();
                return WalkOutcome::Failed { ino, error };
            }
        };

        self.stats.record_dir();

        let mut entry_count = 0;
        let mut subdir_count = 0;

        for entry in &entries {
            if entry.is_special() {
                continue;
            }
            if self.ctx.canceled() {
                return WalkOutcome::Canceled { ino };
            }

            entry_count += 1;
            match self.dispatch(entry, tasks) {
                Dispatch::Descend => {
                    subdir_count += 1;
                    pending.push(entry.inode);
                }
                Dispatch::Done => {}
                Dispatch::Stop => return WalkOutcome::Canceled { ino },
            }
        }

        WalkOutcome::Success {
            ino,
            entries: entry_count,
            subdirs: subdir_count,
        }
    }

    fn dispatch(&self, entry: &Entry, tasks: &TaskSender) -> Dispatch {
        match entry.attr.typ {
            FileType::Directory => Dispatch::Descend,
            FileType::Symlink => {
                self.stats.record_symlink();
                Dispatch::Done
            }
            FileType::File => self.queue_file(entry, tasks),
            _ => {
                self.stats.record_special();
                Dispatch::Done
            }
        }
    }

    fn queue_file(&self, entry: &Entry, tasks: &TaskSender) -> Dispatch {
        if entry.attr.ctime < self.cutoff {
            self.stats.record_too_old();
            return Dispatch::Done;
        }

        let slices = match self.meta.list_slices(&self.ctx, entry.inode) {
            Ok(slices) => slices,
            Err(e) => {
                self.stats.record_error();
                warn!(inode = %entry.inode, name = %entry.name, error = %e, "list slices failed, skipping file");
                return Dispatch::Done;
            }
        };

        let task = FileTask::new(entry.inode, entry.name.clone(), entry.attr.length, slices);
        match tasks.send(task) {
            Ok(()) => {
                self.stats.record_queued();
                Dispatch::Done
            }
            Err(task) => {
                debug!(inode = %task.inode, "Task queue has no consumers");
                warn!("Task queue closed, stopping walk");
                Dispatch::Stop
            }
        }
    }
}

enum Dispatch {
    Descend,
    Done,
    Stop,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::MetaError;
    use crate::meta::{Format, MemMeta, Slice};
    use crate::walker::queue::{task_queue, TaskReceiver};

    fn drain(rx: &TaskReceiver) -> Vec<FileTask> {
        let mut tasks = Vec::new();
        while let Some(task) = rx.recv() {
            tasks.push(task);
        }
        tasks
    }

    fn root_attr(meta: &MemMeta) -> Attr {
        meta.getattr(&Context::root(), Ino::ROOT).unwrap()
    }

    #[test]
    fn test_walk_emits_files_only() {
        let meta = Arc::new(MemMeta::new(Format::default()));
        let a = meta.mkdir(Ino::ROOT, "a", 0o755).unwrap();
        let b = meta.mkdir(a, "b", 0o755).unwrap();
        let f1 = meta
            .create(a, "f1", 0o644, vec![Slice::new(1, 10)], 100)
            .unwrap();
        let f2 = meta.create(b, "f2", 0o644, vec![], 100).unwrap();
        meta.symlink(a, "link", "f1").unwrap();
        let attr = root_attr(&meta);

        let walker = TreeWalker::new(meta, Context::root(), i64::MIN);
        let stats = walker.stats();
        let (tx, rx) = task_queue(16);
        assert!(walker.walk(Ino::ROOT, &attr, tx));

        let mut inodes: Vec<Ino> = drain(&rx).iter().map(|t| t.inode).collect();
        inodes.sort();
        assert_eq!(inodes, vec![f1, f2]);
        assert_eq!(stats.dirs(), 3);
        assert_eq!(stats.symlinks_skipped.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn test_walk_task_content() {
        let meta = Arc::new(MemMeta::new(Format::default()));
        meta.create(
            Ino::ROOT,
            "data",
            0o644,
            vec![Slice::new(4, 100), Slice::new(5, 50)],
            0,
        )
        .unwrap();
        let attr = root_attr(&meta);

        let walker = TreeWalker::new(meta, Context::root(), i64::MIN);
        let (tx, rx) = task_queue(16);
        walker.walk(Ino::ROOT, &attr, tx);

        let tasks = drain(&rx);
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].name, "data");
        assert_eq!(tasks[0].length, 150);
        assert_eq!(tasks[0].slices.len(), 2);
    }

    #[test]
    fn test_cutoff_is_inclusive() {
        let meta = Arc::new(MemMeta::new(Format::default()));
        let old = meta.create(Ino::ROOT, "old", 0o644, vec![], 999).unwrap();
        let edge = meta.create(Ino::ROOT, "edge", 0o644, vec![], 1000).unwrap();
        let new = meta.create(Ino::ROOT, "new", 0o644, vec![], 1001).unwrap();
        let attr = root_attr(&meta);

        let walker = TreeWalker::new(meta, Context::root(), 1000);
        let stats = walker.stats();
        let (tx, rx) = task_queue(16);
        walker.walk(Ino::ROOT, &attr, tx);

        let inodes: Vec<Ino> = drain(&rx).iter().map(|t| t.inode).collect();
        assert!(inodes.contains(&edge));
        assert!(inodes.contains(&new));
        assert!(!inodes.contains(&old));
        assert_eq!(stats.too_old(), 1);
    }

    #[test]
    fn test_readdir_failure_abandons_subtree() {
        let meta = Arc::new(MemMeta::new(Format::default()));
        let bad = meta.mkdir(Ino::ROOT, "bad", 0o755).unwrap();
        meta.create(bad, "hidden", 0o644, vec![], 0).unwrap();
        let good = meta.mkdir(Ino::ROOT, "good", 0o755).unwrap();
        let visible = meta.create(good, "visible", 0o644, vec![], 0).unwrap();
        meta.inject_readdir_error(bad, MetaError::Io("broken".into()));
        let attr = root_attr(&meta);

        let walker = TreeWalker::new(meta, Context::root(), i64::MIN);
        let stats = walker.stats();
        let (tx, rx) = task_queue(16);
        assert!(walker.walk(Ino::ROOT, &attr, tx));

        let inodes: Vec<Ino> = drain(&rx).iter().map(|t| t.inode).collect();
        assert_eq!(inodes, vec![visible]);
        assert_eq!(stats.error_count(), 1);
    }

    #[test]
    fn test_slice_failure_skips_file() {
        let meta = Arc::new(MemMeta::new(Format::default()));
        let bad = meta.create(Ino::ROOT, "bad", 0o644, vec![], 0).unwrap();
        let ok = meta.create(Ino::ROOT, "ok", 0o644, vec![], 0).unwrap();
        meta.inject_slices_error(bad, MetaError::Io("slices".into()));
        let attr = root_attr(&meta);

        let walker = TreeWalker::new(meta, Context::root(), i64::MIN);
        let (tx, rx) = task_queue(16);
        walker.walk(Ino::ROOT, &attr, tx);

        let inodes: Vec<Ino> = drain(&rx).iter().map(|t| t.inode).collect();
        assert_eq!(inodes, vec![ok]);
    }

    #[test]
    fn test_cancel_closes_queue() {
        let meta = Arc::new(MemMeta::new(Format::default()));
        for i in 0..10 {
            meta.create(Ino::ROOT, &format!("f{}", i), 0o644, vec![], 0)
                .unwrap();
        }
        let attr = root_attr(&meta);

        let ctx = Context::root();
        ctx.cancel();
        let walker = TreeWalker::new(meta, ctx, i64::MIN);
        let (tx, rx) = task_queue(16);
        assert!(!walker.walk(Ino::ROOT, &attr, tx));

        // Closed: recv returns None instead of blocking
        assert!(drain(&rx).is_empty());
    }

    #[test]
    fn test_walk_single_file_root() {
        let meta = Arc::new(MemMeta::new(Format::default()));
        let f = meta
            .create(Ino::ROOT, "only", 0o644, vec![Slice::new(9, 1)], 0)
            .unwrap();
        let attr = meta.getattr(&Context::root(), f).unwrap();

        let walker = TreeWalker::new(meta, Context::root(), i64::MIN);
        let (tx, rx) = task_queue(4);
        assert!(walker.walk(f, &attr, tx));
        assert_eq!(drain(&rx)[0].inode, f);
    }

    #[test]
    fn test_spawned_walker() {
        let meta = Arc::new(MemMeta::new(Format::default()));
        meta.create(Ino::ROOT, "f", 0o644, vec![], 0).unwrap();
        let attr = root_attr(&meta);

        let walker = TreeWalker::new(meta, Context::root(), i64::MIN);
        let (tx, rx) = task_queue(1);
        let handle = walker.spawn(Ino::ROOT, attr, tx).unwrap();
        assert_eq!(drain(&rx).len(), 1);
        assert!(handle.join().unwrap());
    }
}
