//! Tree header: the fixed preamble that anchors a store.
//!
//! The header is the only part of a store rewritten in place. It carries the
//! tree's shape plus the two addresses that make a committed state reachable:
//! - the root block
//! - the head of the free list

use crate::common::{BlockId, Error, Result};

/// Persistent tree metadata.
///
/// # Layout (34 bytes)
/// ```text
/// Offset  Size  Field
/// ------  ----  -----
/// 0       5     magic "bpNbp"
/// 5       1     version
/// 6       4     order (little-endian)
/// 10      4     max_key_length (little-endian)
/// 14      4     locale_id (little-endian)
/// 18      8     root (BlockId, -1 = empty tree)
/// 26      8     free_head (BlockId, -1 = empty free list)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TreeHeader {
    pub order: u32,
    pub max_key_length: u32,
    /// Comparator identity. A store must always be opened with the same one.
    pub locale_id: u32,
    pub root: BlockId,
    pub free_head: BlockId,
}

impl TreeHeader {
    /// Size of the header in bytes.
    pub const SIZE: usize = 34;

    pub const MAGIC: &'static [u8; 5] = b"bpNbp";
    pub const VERSION: u8 = 0;

    /// Offset of each field within the header.
    pub const OFFSET_VERSION: usize = 5;
    pub const OFFSET_ORDER: usize = 6;
    pub const OFFSET_KEY_LENGTH: usize = 10;
    pub const OFFSET_LOCALE: usize = 14;
    pub const OFFSET_ROOT: usize = 18;
    pub const OFFSET_FREE_HEAD: usize = 26;

    /// Header for a fresh, empty tree.
    pub fn new(order: u32, max_key_length: u32, locale_id: u32) -> Self {
        Self {
            order,
            max_key_length,
            locale_id,
            root: BlockId::NONE,
            free_head: BlockId::NONE,
        }
    }

    /// Decode a header.
    ///
    /// # Errors
    /// `Error::BadMagic` if the prefix is wrong, `Error::Structural` if the
    /// buffer is short or a field is out of range.
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        if data.len() < Self::SIZE {
            return Err(Error::structural(format!(
                "tree header needs {} bytes, got {}",
                Self::SIZE,
                data.len()
            )));
        }
        if &data[..Self::MAGIC.len()] != Self::MAGIC {
            return Err(Error::BadMagic("tree header"));
        }

        let order = read_u32(data, Self::OFFSET_ORDER);
        let max_key_length = read_u32(data, Self::OFFSET_KEY_LENGTH);
        let locale_id = read_u32(data, Self::OFFSET_LOCALE);
        let root = read_block_id(data, Self::OFFSET_ROOT);
        let free_head = read_block_id(data, Self::OFFSET_FREE_HEAD);

        if order == 0 || max_key_length == 0 {
            return Err(Error::structural(format!(
                "tree header has order {} and key length {}",
                order, max_key_length
            )));
        }

        Ok(Self {
            order,
            max_key_length,
            locale_id,
            root,
            free_head,
        })
    }

    /// Encode the header.
    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        let mut out = [0u8; Self::SIZE];
        out[..Self::MAGIC.len()].copy_from_slice(Self::MAGIC);
        out[Self::OFFSET_VERSION] = Self::VERSION;
        out[Self::OFFSET_ORDER..Self::OFFSET_ORDER + 4].copy_from_slice(&self.order.to_le_bytes());
        out[Self::OFFSET_KEY_LENGTH..Self::OFFSET_KEY_LENGTH + 4]
            .copy_from_slice(&self.max_key_length.to_le_bytes());
        out[Self::OFFSET_LOCALE..Self::OFFSET_LOCALE + 4]
            .copy_from_slice(&self.locale_id.to_le_bytes());
        out[Self::OFFSET_ROOT..Self::OFFSET_ROOT + 8].copy_from_slice(&self.root.to_le_bytes());
        out[Self::OFFSET_FREE_HEAD..Self::OFFSET_FREE_HEAD + 8]
            .copy_from_slice(&self.free_head.to_le_bytes());
        out
    }
}

fn read_u32(data: &[u8], at: usize) -> u32 {
    u32::from_le_bytes([data[at], data[at + 1], data[at + 2], data[at + 3]])
}

fn read_block_id(data: &[u8], at: usize) -> BlockId {
    let mut raw = [0u8; 8];
    raw.copy_from_slice(&data[at..at + 8]);
    BlockId::from_le_bytes(raw)
}
