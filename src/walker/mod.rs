//! Parallel block verification
//!
//! One tree walker lists the namespace depth-first and queues every regular
//! file. A pool of block verifiers drains the queue and queries the object
//! store for each block the file references.
//!
//! # Architecture
//!
//! ```text
//!   ┌──────────────────────┐        ┌──────────────────────┐
//!   │     TreeWalker       │        │   scan_deleted       │
//!   │  - readdir (plus)    │        │  (coordinator thread)│
//!   │  - ctime cutoff      │        └──────────┬───────────┘
//!   │  - list_slices       │                   │ DeletedSet
//!   └──────────┬───────────┘                   │
//!              │ FileTask                      │
//!              ▼                               │
//!   ┌──────────────────────┐                   │
//!   │  bounded task queue  │                   │
//!   └──────────┬───────────┘                   │
//!              │                               │
//!   ┌──────────┼───────────────────┐           │
//!   │          │                   │           │
//! ┌─▼────────┐ ┌▼─────────┐  ┌─────▼────┐      │
//! │Verifier 0│ │Verifier 1│..│Verifier N│◄─────┘
//! │  HEAD    │ │  HEAD    │  │  HEAD    │
//! └────┬─────┘ └────┬─────┘  └────┬─────┘
//!      └────────────┼─────────────┘
//!                   ▼
//!            BrokenFiles ──► fail record
//! ```

pub mod coordinator;
pub mod queue;
pub mod tree;
pub mod worker;

pub use coordinator::{FsckCoordinator, FsckProgress, FsckResult};
pub use queue::{task_queue, FileTask, QueueStats, TaskReceiver, TaskSender};
pub use tree::{TreeWalker, WalkStats};
pub use worker::{aggregate_stats, verify_file, BlockVerifier, VerifyShared, VerifyStats, VerifySummary};
