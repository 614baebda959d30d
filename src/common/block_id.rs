//! Block identifier type.

use std::fmt;

/// Identifies a fixed-size block in the block store.
///
/// Blocks are numbered sequentially from zero. On disk a block address is
/// stored as 8 little-endian bytes; [`BlockId::NONE`] (`u64::MAX`) encodes as
/// all-ones, i.e. `-1` when read as a signed integer, which is the "no block"
/// marker used throughout the node and header layouts.
///
/// # Example
/// ```
/// use shadowtree::BlockId;
///
/// let block = BlockId::new(42);
/// assert!(block.is_valid());
/// assert!(!BlockId::NONE.is_valid());
/// assert_eq!(BlockId::from_le_bytes(BlockId::NONE.to_le_bytes()), BlockId::NONE);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BlockId(pub u64);

impl BlockId {
    /// Sentinel for "no block" (unassigned node, empty tree, end of free list).
    pub const NONE: BlockId = BlockId(u64::MAX);

    /// Create a new BlockId.
    #[inline]
    pub fn new(id: u64) -> Self {
        BlockId(id)
    }

    /// Check if this block ID is valid (not the sentinel value).
    #[inline]
    pub fn is_valid(&self) -> bool {
        *self != Self::NONE
    }

    /// On-disk encoding.
    #[inline]
    pub fn to_le_bytes(self) -> [u8; 8] {
        self.0.to_le_bytes()
    }

    /// Decode from the on-disk encoding.
    #[inline]
    pub fn from_le_bytes(bytes: [u8; 8]) -> Self {
        BlockId(u64::from_le_bytes(bytes))
    }
}

impl fmt::Display for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if *self == Self::NONE {
            write!(f, "Block(NONE)")
        } else {
            write!(f, "Block({})", self.0)
        }
    }
}
