//! Broken file collection and the fail record
//!
//! Verifiers record files with missing blocks into a shared [`BrokenFiles`]
//! map. The first miss for an inode decides its display path. Once every
//! verifier has finished, the map is rendered into a sorted report:
//!
//! ```text
//!  broken files:2
//!             12: /a/b/file
//!            345: inode:345
//! ```

use crate::error::FsckError;
use crate::meta::Ino;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;
use tracing::info;

/// Inode to display path of every file found broken
#[derive(Debug, Default)]
pub struct BrokenFiles {
    files: Mutex<HashMap<Ino, String>>,
}

impl BrokenFiles {
    pub fn new() -> Self {
        Self::default()
    }

    /// Check whether `ino` is already recorded
    pub fn contains(&self, ino: Ino) -> bool {
        self.files.lock().contains_key(&ino)
    }

    /// Record `ino` as broken unless it already is
    ///
    /// `path` is only called for the first miss of an inode. Returns `true`
    /// if this call inserted the entry.
    pub fn record<F>(&self, ino: Ino, path: F) -> bool
    where
        F: FnOnce() -> String,
    {
        if self.contains(ino) {
            return false;
        }
        // Resolve the path outside the lock; a racing verifier may still win
        let display = path();
        let mut files = self.files.lock();
        if files.contains_key(&ino) {
            return false;
        }
        files.insert(ino, display);
        true
    }

    pub fn len(&self) -> usize {
        self.files.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.lock().is_empty()
    }

    /// Copy of the current map
    pub fn snapshot(&self) -> HashMap<Ino, String> {
        self.files.lock().clone()
    }
}

/// Render the report for `broken`: header line, then one sorted line per file
pub fn render(broken: &HashMap<Ino, String>) -> String {
    let mut lines: Vec<String> = broken
        .iter()
        .map(|(ino, path)| format!("{:>13}: {}", ino, path))
        .collect();
    lines.sort();

    let mut report = format!(" broken files:{} \n", broken.len());
    report.push_str(&lines.join("\n"));
    report
}

/// Write the report to `path`, replacing any previous content
///
/// Nothing is written when no file is broken. Returns whether a file was
/// produced.
pub fn write_report(path: &Path, broken: &HashMap<Ino, String>) -> Result<bool, FsckError> {
    if broken.is_empty() {
        return Ok(false);
    }

    info!(path = %path.display(), count = broken.len(), "Saving fail record");

    let report_err = |source: std::io::Error| FsckError::Report {
        path: path.to_path_buf(),
        source,
    };

    let mut file = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(path)
        .map_err(report_err)?;
    file.write_all(render(broken).as_bytes())
        .map_err(report_err)?;
    file.flush().map_err(report_err)?;

    Ok(true)
}
