//! Block layout and object key derivation
//!
//! A slice is stored as `ceil(size / block_size)` objects. Every block but
//! the last is `block_size` bytes; the last holds the remainder. Keys are a
//! pure function of (slice id, block index, block size, layout):
//!
//! ```text
//! local:        {id}_{index}_{size}
//! hash prefix:  {id % 256 as %02X}/{id / 1_000_000}/{local}
//! legacy:       {id / 1_000_000}/{id / 1_000}/{local}
//! ```

use crate::meta::Slice;

/// Object key scheme of a volume
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyLayout {
    /// Keys spread over 256 hex prefixes
    HashPrefix,
    /// Keys grouped by id ranges
    Legacy,
}

impl KeyLayout {
    pub fn from_hash_prefix(hash_prefix: bool) -> Self {
        if hash_prefix {
            KeyLayout::HashPrefix
        } else {
            KeyLayout::Legacy
        }
    }
}

/// One block of a slice
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockRef {
    pub slice_id: u64,
    pub index: u32,
    pub size: u32,
}

impl BlockRef {
    /// Key of this block relative to the slice store
    pub fn local_key(&self) -> String {
        format!("{}_{}_{}", self.slice_id, self.index, self.size)
    }

    /// Full object key under the chunk namespace
    pub fn object_key(&self, layout: KeyLayout) -> String {
        let id = self.slice_id;
        match layout {
            KeyLayout::HashPrefix => {
                format!("{:02X}/{}/{}", id % 256, id / 1_000_000, self.local_key())
            }
            KeyLayout::Legacy => {
                format!("{}/{}/{}", id / 1_000_000, id / 1_000, self.local_key())
            }
        }
    }
}

/// Iterator over the blocks of one slice
#[derive(Debug, Clone)]
pub struct SliceBlocks {
    slice_id: u64,
    remaining: u32,
    block_size: u32,
    index: u32,
}

impl Iterator for SliceBlocks {
    type Item = BlockRef;

    fn next(&mut self) -> Option<BlockRef> {
        if self.remaining == 0 {
            return None;
        }
        let size = self.remaining.min(self.block_size);
        let block = BlockRef {
            slice_id: self.slice_id,
            index: self.index,
            size,
        };
        self.remaining -= size;
        self.index += 1;
        Some(block)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let n = block_count(self.remaining, self.block_size) as usize;
        (n, Some(n))
    }
}

impl ExactSizeIterator for SliceBlocks {}

/// Number of blocks a slice of `size` bytes occupies
pub fn block_count(size: u32, block_size: u32) -> u32 {
    if block_size == 0 {
        return 0;
    }
    size.div_ceil(block_size)
}

/// Blocks backing `slice`
///
/// Holes and empty slices have none.
pub fn slice_blocks(slice: &Slice, block_size: u32) -> SliceBlocks {
    let remaining = if slice.is_hole() || block_size == 0 {
        0
    } else {
        slice.size
    };
    SliceBlocks {
        slice_id: slice.id,
        remaining,
        block_size,
        index: 0,
    }
}
