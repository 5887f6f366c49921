//! Load a metadata dump into a [`MemMeta`]
//!
//! The dump is a JSON document holding the volume settings, the directory
//! tree (each node with its inode, attributes and slices) and the list of
//! files pending deletion:
//!
//! ```json
//! {
//!   "setting": { "name": "vol", "storage": "file", "bucket": "/var/vol", "block_size": 4096 },
//!   "tree": {
//!     "inode": 1,
//!     "attr": { "type": "directory", "mode": 511 },
//!     "entries": {
//!       "f": { "inode": 2, "attr": { "type": "file", "mode": 420, "ctime": 1700000000 },
//!              "slices": [ { "id": 10, "size": 1024, "len": 1024 } ] }
//!     }
//!   },
//!   "del_files": [ { "inode": 7, "length": 1024, "expire": 1700000000 } ]
//! }
//! ```
//!
//! An inode appearing under several names is loaded as hard links. Every
//! occurrence carries the full record; the first one loaded wins.

use super::memory::{MemMeta, NodeData};
use super::types::{Attr, FileType, Format, Ino, Slice};
use crate::error::{MetaError, MetaResult};
use serde::Deserialize;
use std::collections::{BTreeMap, HashSet};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use tracing::{debug, info};

#[derive(Debug, Deserialize)]
struct DumpFile {
    #[serde(default)]
    setting: Format,
    tree: DumpedEntry,
    #[serde(default)]
    del_files: Vec<DumpedDelFile>,
}

#[derive(Debug, Deserialize)]
struct DumpedEntry {
    inode: Ino,
    #[serde(default)]
    attr: Attr,
    #[serde(default)]
    symlink: Option<String>,
    #[serde(default)]
    slices: Vec<Slice>,
    #[serde(default)]
    entries: BTreeMap<String, DumpedEntry>,
}

#[derive(Debug, Deserialize)]
struct DumpedDelFile {
    inode: Ino,
    #[serde(default)]
    length: u64,
    #[serde(default)]
    expire: i64,
}

/// Read a dump file from disk
pub fn load_dump(path: &Path) -> MetaResult<MemMeta> {
    let invalid = |reason: String| MetaError::InvalidDump {
        path: path.display().to_string(),
        reason,
    };

    let file = File::open(path).map_err(|e| invalid(e.to_string()))?;
    let dump: DumpFile =
        serde_json::from_reader(BufReader::new(file)).map_err(|e| invalid(e.to_string()))?;

    let meta = build(dump).map_err(|e| match e {
        MetaError::InvalidDump { reason, .. } => invalid(reason),
        other => invalid(other.to_string()),
    })?;

    info!(
        path = %path.display(),
        inodes = meta.inode_count(),
        "Loaded metadata dump"
    );
    Ok(meta)
}

/// Parse a dump held in memory
pub fn load_dump_str(json: &str) -> MetaResult<MemMeta> {
    let dump: DumpFile = serde_json::from_str(json).map_err(|e| MetaError::InvalidDump {
        path: "<memory>".into(),
        reason: e.to_string(),
    })?;
    build(dump)
}

fn build(dump: DumpFile) -> MetaResult<MemMeta> {
    let invalid = |reason: String| MetaError::InvalidDump {
        path: String::new(),
        reason,
    };

    let DumpFile {
        setting,
        tree,
        del_files,
    } = dump;

    if !tree.inode.is_root() {
        return Err(invalid(format!(
            "tree root has inode {}, expected {}",
            tree.inode,
            Ino::ROOT
        )));
    }
    if tree.attr.typ != FileType::Directory {
        return Err(invalid("tree root is not a directory".into()));
    }

    setting
        .block_size_bytes()
        .map_err(|e| invalid(e.to_string()))?;

    let meta = MemMeta::new(setting);
    let root_attr = tree.attr;
    meta.update_attr(Ino::ROOT, |attr| {
        attr.mode = root_attr.mode;
        attr.uid = root_attr.uid;
        attr.gid = root_attr.gid;
        attr.atime = root_attr.atime;
        attr.mtime = root_attr.mtime;
        attr.ctime = root_attr.ctime;
    })?;

    let mut seen: HashSet<Ino> = HashSet::new();
    seen.insert(Ino::ROOT);

    let mut pending: Vec<(Ino, String, DumpedEntry)> = tree
        .entries
        .into_iter()
        .map(|(name, entry)| (Ino::ROOT, name, entry))
        .collect();

    while let Some((parent, name, entry)) = pending.pop() {
        if !seen.insert(entry.inode) {
            debug!(inode = %entry.inode, name = %name, "Hard link in dump");
            meta.link(entry.inode, parent, &name)?;
            continue;
        }

        let data = match entry.attr.typ {
            FileType::Directory => NodeData::Dir,
            FileType::File => NodeData::File(entry.slices),
            FileType::Symlink => NodeData::Symlink(entry.symlink.ok_or_else(|| {
                invalid(format!("symlink '{}' ({}) has no target", name, entry.inode))
            })?),
            _ => NodeData::Special,
        };

        let ino = meta.insert(parent, &name, Some(entry.inode), entry.attr, data)?;
        pending.extend(
            entry
                .entries
                .into_iter()
                .map(|(child, child_entry)| (ino, child, child_entry)),
        );
    }

    for del in del_files {
        meta.mark_deleted(del.inode, del.length, del.expire);
    }

    Ok(meta)
}
