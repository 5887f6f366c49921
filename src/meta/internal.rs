//! Internal (virtual) nodes exposed at the volume root
//!
//! These names never exist in the directory tree; they map to fixed inodes in
//! a reserved range.

use super::types::{Attr, FileType, Ino};

/// First inode of the reserved internal range
pub const MIN_INTERNAL_NODE: u64 = 0x7FFF_FFFF_0000_0000;

/// Access log
pub const LOG_INODE: Ino = Ino(MIN_INTERNAL_NODE + 1);

/// Control file
pub const CONTROL_INODE: Ino = Ino(MIN_INTERNAL_NODE + 2);

/// Runtime statistics
pub const STATS_INODE: Ino = Ino(MIN_INTERNAL_NODE + 3);

/// Client configuration
pub const CONFIG_INODE: Ino = Ino(MIN_INTERNAL_NODE + 4);

/// Trash directory
pub const TRASH_INODE: Ino = Ino(0x7FFF_FFFF_1000_0000);

struct InternalNode {
    ino: Ino,
    name: &'static str,
    typ: FileType,
    mode: u16,
}

const INTERNAL_NODES: [InternalNode; 5] = [
    InternalNode {
        ino: LOG_INODE,
        name: ".accesslog",
        typ: FileType::File,
        mode: 0o400,
    },
    InternalNode {
        ino: CONTROL_INODE,
        name: ".control",
        typ: FileType::File,
        mode: 0o666,
    },
    InternalNode {
        ino: STATS_INODE,
        name: ".stats",
        typ: FileType::File,
        mode: 0o444,
    },
    InternalNode {
        ino: CONFIG_INODE,
        name: ".config",
        typ: FileType::File,
        mode: 0o400,
    },
    InternalNode {
        ino: TRASH_INODE,
        name: ".trash",
        typ: FileType::Directory,
        mode: 0o555,
    },
];

/// Check if `name` is reserved for an internal node
pub fn is_special_name(name: &str) -> bool {
    name.starts_with('.') && INTERNAL_NODES.iter().any(|n| n.name == name)
}

/// Look up an internal node by name
pub fn internal_node_by_name(name: &str) -> Option<(Ino, Attr)> {
    INTERNAL_NODES
        .iter()
        .find(|n| n.name == name)
        .map(|n| (n.ino, internal_attr(n)))
}

/// Look up an internal node by inode
pub fn internal_node_by_ino(ino: Ino) -> Option<Attr> {
    INTERNAL_NODES
        .iter()
        .find(|n| n.ino == ino)
        .map(internal_attr)
}

fn internal_attr(node: &InternalNode) -> Attr {
    Attr {
        typ: node.typ,
        mode: node.mode,
        nlink: 1,
        parent: Ino::ROOT,
        ..Default::default()
    }
}
