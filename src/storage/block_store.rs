//! The contract between the tree and its block storage.

use crate::common::{BlockId, Result};

/// Durable array of equal-size blocks addressed by sequential [`BlockId`].
///
/// Alongside the blocks the store reserves a fixed-size header region for
/// its owner. The tree keeps its [`TreeHeader`](super::TreeHeader) there.
///
/// The store never shrinks: released blocks are recycled through the tree's
/// free list, not returned to the store.
pub trait BlockStore {
    /// Size of every block in bytes.
    fn block_size(&self) -> usize;

    /// First address that has never been written.
    ///
    /// Derived from the length of the backing medium, rounded up, so a
    /// partially written final block still counts.
    fn next_block(&self) -> Result<BlockId>;

    /// Read the first `buf.len()` bytes of block `id`.
    ///
    /// Bytes past the end of the medium read as zero.
    ///
    /// # Errors
    /// `Error::BlockNotFound` if `id >= next_block()`.
    fn read_block(&mut self, id: BlockId, buf: &mut [u8]) -> Result<()>;

    /// Write `data` at the start of block `id`.
    ///
    /// # Errors
    /// `Error::BlockGap` if `id > next_block()`: the store never has holes.
    fn write_block(&mut self, id: BlockId, data: &[u8]) -> Result<()>;

    /// Read the owner header region into `buf`.
    fn read_preamble(&mut self, buf: &mut [u8]) -> Result<()>;

    /// Overwrite the owner header region.
    fn write_preamble(&mut self, data: &[u8]) -> Result<()>;

    /// Push all buffered writes to stable storage.
    fn flush(&mut self) -> Result<()>;
}
