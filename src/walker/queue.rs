//! Task queue between the tree walker and the block verifiers
//!
//! A bounded channel carries one [`FileTask`] per regular file. The walker
//! owns the only sender, so dropping it (or calling [`TaskSender::close`])
//! is what tells the verifiers that no more work is coming. When the queue is
//! full the walker blocks; each such stall is counted as a backpressure event.

use crate::meta::{Ino, Slice};
use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// A file whose blocks must be verified
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileTask {
    /// Inode of the file
    pub inode: Ino,

    /// Entry name (not full path), for log lines
    pub name: String,

    /// Declared file length
    pub length: u64,

    /// Slices making up the file
    pub slices: Vec<Slice>,
}

impl FileTask {
    /// Create a new file task
    pub fn new(inode: Ino, name: impl Into<String>, length: u64, slices: Vec<Slice>) -> Self {
        Self {
            inode,
            name: name.into(),
            length,
            slices,
        }
    }
}

/// Statistics for the task queue
#[derive(Debug, Default)]
pub struct QueueStats {
    /// Total tasks enqueued
    pub enqueued: AtomicU64,

    /// Total tasks dequeued
    pub dequeued: AtomicU64,

    /// Number of times the producer had to wait for room
    pub backpressure_events: AtomicU64,
}

impl QueueStats {
    /// Get queue throughput (dequeued tasks)
    pub fn throughput(&self) -> u64 {
        self.dequeued.load(Ordering::Relaxed)
    }

    /// Get backpressure event count
    pub fn backpressure_count(&self) -> u64 {
        self.backpressure_events.load(Ordering::Relaxed)
    }

    /// Tasks sent but not yet taken
    pub fn pending(&self) -> u64 {
        self.enqueued
            .load(Ordering::Relaxed)
            .saturating_sub(self.dequeued.load(Ordering::Relaxed))
    }
}

/// Create a task queue holding at most `capacity` tasks
pub fn task_queue(capacity: usize) -> (TaskSender, TaskReceiver) {
    let (sender, receiver) = bounded(capacity);
    let stats = Arc::new(QueueStats::default());

    (
        TaskSender {
            sender,
            stats: Arc::clone(&stats),
        },
        TaskReceiver { receiver, stats },
    )
}

/// Producer side of the queue
///
/// Not `Clone`: the queue is closed exactly once, when this handle goes away.
pub struct TaskSender {
    sender: Sender<FileTask>,
    stats: Arc<QueueStats>,
}

impl TaskSender {
    /// Send a task, blocking while the queue is full
    ///
    /// Returns the task back if every receiver is gone.
    pub fn send(&self, task: FileTask) -> Result<(), FileTask> {
        let task = match self.sender.try_send(task) {
            Ok(()) => {
                self.stats.enqueued.fetch_add(1, Ordering::Relaxed);
                return Ok(());
            }
            Err(TrySendError::Full(task)) => {
                self.stats
                    .backpressure_events
                    .fetch_add(1, Ordering::Relaxed);
                task
            }
            Err(TrySendError::Disconnected(task)) => return Err(task),
        };

        self.sender.send(task).map_err(|e| e.into_inner())?;
        self.stats.enqueued.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    /// Close the queue; receivers drain what is buffered and then stop
    pub fn close(self) {
        drop(self);
    }

    /// Get queue statistics
    pub fn stats(&self) -> Arc<QueueStats> {
        Arc::clone(&self.stats)
    }

    /// Get current queue length
    pub fn len(&self) -> usize {
        self.sender.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sender.is_empty()
    }
}

/// Consumer side of the queue (clone for each worker)
#[derive(Clone)]
pub struct TaskReceiver {
    receiver: Receiver<FileTask>,
    stats: Arc<QueueStats>,
}

impl TaskReceiver {
    /// Receive a task from the queue
    ///
    /// Blocks until a task is available; returns `None` once the queue is
    /// closed and drained.
    pub fn recv(&self) -> Option<FileTask> {
        match self.receiver.recv() {
            Ok(task) => {
                self.stats.dequeued.fetch_add(1, Ordering::Relaxed);
                Some(task)
            }
            Err(_) => None,
        }
    }

    /// Get queue statistics
    pub fn stats(&self) -> Arc<QueueStats> {
        Arc::clone(&self.stats)
    }

    /// Check if the queue is empty
    pub fn is_empty(&self) -> bool {
        self.receiver.is_empty()
    }

    /// Get current queue length
    pub fn len(&self) -> usize {
        self.receiver.len()
    }
}
