//! Error types for pfsck
//!
//! This module defines the error hierarchy that covers:
//! - Metadata engine errors (errno-like, returned by `Meta` implementations)
//! - Object storage errors
//! - Configuration and CLI errors
//! - Worker thread errors
//! - Report output errors
//!
//! Design philosophy:
//! - Use thiserror for structured error types in library code
//! - Metadata errors are passed through unmodified so callers can match on them
//! - Preserve error chains for debugging

use crate::meta::Ino;
use std::path::PathBuf;
use thiserror::Error;

/// Top-level error type for a check run
#[derive(Error, Debug)]
pub enum FsckError {
    /// Metadata engine errors
    #[error("Metadata error: {0}")]
    Meta(#[from] MetaError),

    /// Object storage errors
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Worker/concurrency errors
    #[error("Worker error: {0}")]
    Worker(#[from] WorkerError),

    /// Failed to resolve the path the check should start from
    #[error("Failed to resolve start path '{path}': {source}")]
    Resolve { path: String, source: MetaError },

    /// Failed to persist the failure report
    #[error("Failed to write report to '{path}': {source}")]
    Report {
        path: PathBuf,
        source: std::io::Error,
    },

    /// I/O errors (file operations, etc.)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors reported by a metadata engine
///
/// These mirror the errno values a metadata engine returns, so the resolver
/// can tell "unsupported" apart from real failures.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MetaError {
    /// No such inode or directory entry
    #[error("No such file or directory: {0}")]
    NotFound(String),

    /// Access check failed
    #[error("Permission denied on inode {ino}")]
    PermissionDenied { ino: Ino },

    /// The engine (or the resolver) does not support this operation
    #[error("Operation not supported: {0}")]
    NotSupported(String),

    /// A directory operation was attempted on a non-directory
    #[error("Inode {ino} is not a directory")]
    NotDir { ino: Ino },

    /// An entry with this name already exists
    #[error("File exists: {0}")]
    AlreadyExists(String),

    /// The operation does not apply to this object (e.g. readlink on a file)
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Symlink resolution nested too deeply (probable cycle)
    #[error("Too many levels of symbolic links resolving '{path}'")]
    TooManySymlinks { path: String },

    /// The metadata URL names an engine this build cannot open
    #[error("Unsupported metadata engine '{scheme}'")]
    UnsupportedEngine { scheme: String },

    /// The metadata URL could not be parsed
    #[error("Invalid metadata URL '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },

    /// The volume format cannot be checked against
    #[error("Invalid volume format: {reason}")]
    InvalidFormat { reason: String },

    /// A metadata dump file is malformed
    #[error("Invalid metadata dump '{path}': {reason}")]
    InvalidDump { path: String, reason: String },

    /// Engine-side I/O failure
    #[error("Metadata I/O error: {0}")]
    Io(String),
}

impl MetaError {
    /// Check whether this error means "capability not available"
    pub fn is_not_supported(&self) -> bool {
        matches!(self, MetaError::NotSupported(_))
    }

    /// Check if this error is expected on a live filesystem (entry vanished
    /// or became unreadable while we were walking)
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            MetaError::NotFound(_) | MetaError::PermissionDenied { .. } | MetaError::NotDir { .. }
        )
    }
}

/// Object storage errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StorageError {
    /// Object does not exist
    #[error("Object not found: '{key}'")]
    NotFound { key: String },

    /// Transport or backend failure
    #[error("Failed to access object '{key}': {reason}")]
    Io { key: String, reason: String },

    /// Storage type this build cannot construct
    #[error("Unsupported storage type '{storage}'")]
    Unsupported { storage: String },

    /// Storage could not be initialized
    #[error("Failed to initialize {storage} storage at '{bucket}': {reason}")]
    InitFailed {
        storage: String,
        bucket: String,
        reason: String,
    },
}

impl StorageError {
    /// Returns true if the object is definitely absent (as opposed to
    /// unreachable)
    pub fn is_not_found(&self) -> bool {
        matches!(self, StorageError::NotFound { .. })
    }
}

/// Configuration and CLI errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Invalid worker count
    #[error("Invalid concurrency {count}: must be between 1 and {max}")]
    InvalidWorkerCount { count: usize, max: usize },

    /// Invalid queue size
    #[error("Invalid queue size {size}: must be at least {min}")]
    InvalidQueueSize { size: usize, min: usize },

    /// Metadata URL could not be parsed
    #[error("Invalid metadata URL '{url}': {reason}")]
    InvalidMetaUrl { url: String, reason: String },

    /// Check time is not a YYYY-MM-DD date
    #[error("Invalid check time '{value}': {reason}")]
    InvalidCheckTime { value: String, reason: String },

    /// Output path error
    #[error("Invalid fail record path '{path}': {reason}")]
    InvalidOutputPath { path: PathBuf, reason: String },

    /// Repair requested without a target
    #[error("Please provide the path to repair with `--path` option")]
    RepairWithoutPath,
}

/// Worker thread errors
#[derive(Error, Debug)]
pub enum WorkerError {
    /// Worker panicked
    #[error("Worker {id} panicked: {message}")]
    Panicked { id: usize, message: String },

    /// Worker thread could not be started
    #[error("Failed to start worker {id}: {reason}")]
    SpawnFailed { id: usize, reason: String },

    /// The tree walker thread died
    #[error("Tree walker failed: {0}")]
    Walker(String),
}

/// Result type alias for FsckError
pub type Result<T> = std::result::Result<T, FsckError>;

/// Result type alias for MetaError
pub type MetaResult<T> = std::result::Result<T, MetaError>;

/// Result type alias for StorageError
pub type StorageResult<T> = std::result::Result<T, StorageError>;

/// Outcome of listing one directory during the walk
#[derive(Debug)]
pub enum WalkOutcome {
    /// Directory listed, entries dispatched
    Success {
        ino: Ino,
        entries: usize,
        subdirs: usize,
    },

    /// Listing failed; the subtree is abandoned
    Failed { ino: Ino, error: MetaError },

    /// Cancellation fired while dispatching entries
    Canceled { ino: Ino },
}
