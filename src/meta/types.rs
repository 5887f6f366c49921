//! Metadata types
//!
//! These types represent the records a metadata engine hands out: inodes,
//! attributes, directory entries, slices and the volume format.

use crate::error::{MetaError, MetaResult};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Inode number of a filesystem object
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Ino(pub u64);

impl Ino {
    /// The root directory
    pub const ROOT: Ino = Ino(1);

    /// Check if this is the root inode
    pub fn is_root(&self) -> bool {
        *self == Ino::ROOT
    }
}

impl fmt::Display for Ino {
    // Forward to u64 so width/alignment flags apply
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl From<u64> for Ino {
    fn from(value: u64) -> Self {
        Ino(value)
    }
}

/// Type of filesystem object
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[repr(u8)]
pub enum FileType {
    /// Regular file
    #[default]
    File = 1,
    /// Directory
    Directory = 2,
    /// Symbolic link
    Symlink = 3,
    /// Named pipe (FIFO)
    Fifo = 4,
    /// Block device
    BlockDev = 5,
    /// Character device
    CharDev = 6,
    /// Unix socket
    Socket = 7,
}

impl FileType {
    /// Check if this is a regular file
    pub fn is_file(&self) -> bool {
        *self == FileType::File
    }

    /// Check if this is a directory
    pub fn is_dir(&self) -> bool {
        *self == FileType::Directory
    }

    /// Check if this is a symbolic link
    pub fn is_symlink(&self) -> bool {
        *self == FileType::Symlink
    }
}

/// Attributes of a filesystem object
///
/// Times are unix seconds.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Attr {
    #[serde(rename = "type")]
    pub typ: FileType,
    pub mode: u16,
    pub uid: u32,
    pub gid: u32,
    pub nlink: u32,
    pub length: u64,
    pub atime: i64,
    pub mtime: i64,
    pub ctime: i64,
    pub parent: Ino,
}

impl Attr {
    /// Attributes for a new directory
    pub fn directory(mode: u16, now: i64) -> Self {
        Self {
            typ: FileType::Directory,
            mode,
            nlink: 2,
            length: 4096,
            atime: now,
            mtime: now,
            ctime: now,
            ..Default::default()
        }
    }

    /// Attributes for a new regular file
    pub fn file(mode: u16, length: u64, ctime: i64) -> Self {
        Self {
            typ: FileType::File,
            mode,
            nlink: 1,
            length,
            atime: ctime,
            mtime: ctime,
            ctime,
            ..Default::default()
        }
    }

    /// Attributes for a new symlink pointing at `target`
    pub fn symlink(target_len: usize, now: i64) -> Self {
        Self {
            typ: FileType::Symlink,
            mode: 0o777,
            nlink: 1,
            length: target_len as u64,
            atime: now,
            mtime: now,
            ctime: now,
            ..Default::default()
        }
    }
}

/// A directory entry returned from readdir
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    /// Inode the entry points at
    pub inode: Ino,

    /// Entry name (not full path)
    pub name: String,

    /// Attributes of the target
    pub attr: Attr,
}

impl Entry {
    /// Check if this is a special entry (. or ..)
    pub fn is_special(&self) -> bool {
        self.name == "." || self.name == ".."
    }
}

/// A contiguous extent of file data stored as its own objects
///
/// `id == 0` marks a hole with no backing objects.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Slice {
    pub id: u64,
    pub size: u32,
    pub off: u32,
    pub len: u32,
}

impl Slice {
    /// A slice whose whole content is referenced
    pub fn new(id: u64, size: u32) -> Self {
        Self {
            id,
            size,
            off: 0,
            len: size,
        }
    }

    /// Check if this slice is a hole
    pub fn is_hole(&self) -> bool {
        self.id == 0
    }
}

/// Volume settings stored in the metadata engine
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Format {
    /// Volume name
    pub name: String,

    /// Volume UUID
    pub uuid: String,

    /// Object storage type (file, mem, s3, ...)
    pub storage: String,

    /// Bucket / endpoint of the object storage
    pub bucket: String,

    /// Block size in KiB
    pub block_size: u32,

    /// Compression algorithm used for blocks
    pub compression: String,

    /// Whether object keys carry a hash prefix
    pub hash_prefix: bool,

    /// Days deleted files stay in trash
    pub trash_days: u32,
}

impl Default for Format {
    fn default() -> Self {
        Self {
            name: "pfsck".to_string(),
            uuid: String::new(),
            storage: "mem".to_string(),
            bucket: String::new(),
            block_size: 4096,
            compression: "none".to_string(),
            hash_prefix: false,
            trash_days: 1,
        }
    }
}

impl Format {
    /// Block size in bytes
    ///
    /// A zero block size would make every slice blockless, and a size that
    /// does not fit in `u32` bytes cannot describe a block key.
    pub fn block_size_bytes(&self) -> MetaResult<u32> {
        match self.block_size.checked_mul(1024) {
            Some(bytes) if bytes > 0 => Ok(bytes),
            _ => Err(MetaError::InvalidFormat {
                reason: format!("block size {} KiB is out of range", self.block_size),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ino_display_honors_width() {
        assert_eq!(format!("{:>5}", Ino(42)), "   42");
        assert_eq!(Ino::ROOT.to_string(), "1");
        assert!(Ino::ROOT.is_root());
    }

    #[test]
    fn test_file_type_predicates() {
        assert!(FileType::File.is_file());
        assert!(!FileType::Symlink.is_dir());
    }

    #[test]
    fn test_entry_special() {
        let entry = Entry {
            inode: Ino(1),
            name: "..".into(),
            attr: Attr::default(),
        };
        assert!(entry.is_special());
    }

    #[test]
    fn test_format_block_size() {
        let format = Format::default();
        assert_eq!(format.block_size_bytes().unwrap(), 4 << 20);
    }

    #[test]
    fn test_format_block_size_out_of_range() {
        for block_size in [0, 4 << 20, u32::MAX] {
            let format = Format {
                block_size,
                ..Default::default()
            };
            assert!(matches!(
                format.block_size_bytes(),
                Err(MetaError::InvalidFormat { .. })
            ));
        }
    }

    #[test]
    fn test_slice_hole() {
        assert!(Slice::new(0, 100).is_hole());
        assert!(!Slice::new(7, 100).is_hole());
    }
}
