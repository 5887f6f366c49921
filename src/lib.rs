//! pfsck - parallel block consistency checker
//!
//! Checks that every data block referenced by a volume's metadata still
//! exists in its object store. File metadata (namespace, attributes, slice
//! lists) lives in a metadata engine; file content lives in the object
//! store as fixed-size blocks keyed by slice id, block index and block size.
//!
//! # Features
//!
//! - **Parallel Verification**: One walker thread lists the namespace while
//!   a pool of verifier threads queries the object store.
//!
//! - **Memory Bounded**: A bounded task queue with backpressure keeps the
//!   walker from running ahead of the verifiers on huge trees.
//!
//! - **Incremental Checks**: A ctime cutoff restricts the check to files
//!   changed since a given day.
//!
//! - **Deletion Aware**: Files pending deletion are skipped, their blocks
//!   may legitimately be gone already.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────┐                 ┌──────────────────────┐
//! │   Metadata engine    │                 │    Object store      │
//! │ (json dump, memory)  │                 │   (file, memory)     │
//! └──────────┬───────────┘                 └──────────▲───────────┘
//!            │ resolve / readdir / slices             │ HEAD <key>
//!            ▼                                        │
//! ┌──────────────────────┐   ┌──────────────┐   ┌─────┴────────────┐
//! │     TreeWalker       ├──►│  task queue  ├──►│ BlockVerifier xN │
//! └──────────────────────┘   └──────────────┘   └─────┬────────────┘
//!                                                     │
//!                                                     ▼
//!                                            ┌──────────────────┐
//!                                            │  fail record     │
//!                                            └──────────────────┘
//! ```

pub mod chunk;
pub mod config;
pub mod deleted;
pub mod error;
pub mod meta;
pub mod object;
pub mod progress;
pub mod report;
pub mod resolve;
pub mod walker;

pub use config::{CheckConfig, CliArgs, MetaUrl};
pub use error::{FsckError, Result};
pub use walker::{FsckCoordinator, FsckProgress, FsckResult};
