//! Block file - fixed-size block I/O over a [`Medium`].
//!
//! The [`BlockFile`] is the one concrete [`BlockStore`] shipped with the crate:
//! - Reading and writing blocks by address
//! - Reserving a header region for the owner
//! - Validating its own preamble on open

use std::fs::{File, OpenOptions};
use std::io::SeekFrom;
use std::path::Path;

use tracing::info;

use super::block_store::BlockStore;
use super::medium::Medium;
use crate::common::{BlockId, Error, Result};

/// Bytes of the block file's own preamble.
const PREAMBLE_SIZE: usize = 10;

/// Manages block I/O for a single medium.
///
/// # Layout
/// ```text
/// ┌──────────────┬──────────────┬─────────┬─────────┬─────────┐
/// │ Owner header │  Preamble    │ Block 0 │ Block 1 │   ...   │
/// │ (reserved)   │  (10 bytes)  │         │         │         │
/// └──────────────┴──────────────┴─────────┴─────────┴─────────┘
/// ```
///
/// Preamble:
/// ```text
/// Offset  Size  Field
/// ------  ----  -----
/// 0       5     magic "bpNbf"
/// 5       1     version
/// 6       4     block_size (little-endian)
/// ```
///
/// Block N starts at `reserved + PREAMBLE_SIZE + N × block_size`.
///
/// # Durability
/// Writes are buffered by the medium; [`flush`](BlockStore::flush) syncs.
/// The tree flushes at every commit and abort.
pub struct BlockFile<M: Medium> {
    medium: M,
    block_size: usize,
    /// Bytes reserved for the owner header before the preamble.
    reserved: u64,
}

impl<M: Medium> BlockFile<M> {
    pub const MAGIC: &'static [u8; 5] = b"bpNbf";
    pub const VERSION: u8 = 0;
    pub const PREAMBLE_SIZE: usize = PREAMBLE_SIZE;

    /// Initialize a new block file on an empty medium.
    ///
    /// The owner region is zero-filled and the preamble written.
    ///
    /// # Errors
    /// `Error::InvalidConfig` if `block_size` is zero or the medium already
    /// holds data.
    pub fn create(mut medium: M, block_size: usize, reserved: usize) -> Result<Self> {
        if block_size == 0 || block_size > u32::MAX as usize {
            return Err(Error::InvalidConfig(format!(
                "block size {} out of range",
                block_size
            )));
        }
        if medium.byte_len()? != 0 {
            return Err(Error::InvalidConfig(
                "cannot create a block file on a non-empty medium".to_string(),
            ));
        }

        let mut prefix = vec![0u8; reserved + Self::PREAMBLE_SIZE];
        prefix[reserved..reserved + 5].copy_from_slice(Self::MAGIC);
        prefix[reserved + 5] = Self::VERSION;
        prefix[reserved + 6..reserved + 10].copy_from_slice(&(block_size as u32).to_le_bytes());

        medium.seek(SeekFrom::Start(0))?;
        medium.write_all(&prefix)?;

        Ok(Self {
            medium,
            block_size,
            reserved: reserved as u64,
        })
    }

    /// Open an existing block file, reading the block size from its preamble.
    ///
    /// # Errors
    /// `Error::BadMagic` if the preamble is missing or malformed.
    pub fn open(mut medium: M, reserved: usize) -> Result<Self> {
        let mut preamble = [0u8; PREAMBLE_SIZE];
        if medium.byte_len()? < (reserved + Self::PREAMBLE_SIZE) as u64 {
            return Err(Error::BadMagic("block file"));
        }
        medium.seek(SeekFrom::Start(reserved as u64))?;
        medium.read_exact(&mut preamble)?;

        if &preamble[..5] != Self::MAGIC {
            return Err(Error::BadMagic("block file"));
        }
        // Version byte is not checked: only version 0 exists.
        let block_size =
            u32::from_le_bytes([preamble[6], preamble[7], preamble[8], preamble[9]]) as usize;
        if block_size == 0 {
            return Err(Error::structural("block file preamble has zero block size"));
        }

        Ok(Self {
            medium,
            block_size,
            reserved: reserved as u64,
        })
    }

    /// Consume the block file, returning its medium.
    pub fn into_inner(self) -> M {
        self.medium
    }

    #[inline]
    fn data_start(&self) -> u64 {
        self.reserved + Self::PREAMBLE_SIZE as u64
    }

    #[inline]
    fn block_offset(&self, id: BlockId) -> u64 {
        self.data_start() + id.0 * self.block_size as u64
    }

    fn check_len(&self, len: usize) -> Result<()> {
        if len > self.block_size {
            return Err(Error::structural(format!(
                "{} bytes do not fit a {}-byte block",
                len, self.block_size
            )));
        }
        Ok(())
    }
}

impl BlockFile<File> {
    /// Create a new block file at `path`.
    ///
    /// # Errors
    /// Returns an error if the file already exists or cannot be created.
    pub fn create_path<P: AsRef<Path>>(path: P, block_size: usize, reserved: usize) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create_new(true)
            .open(path.as_ref())?;
        info!(path = %path.as_ref().display(), block_size, "created block file");
        Self::create(file, block_size, reserved)
    }

    /// Open an existing block file at `path`.
    ///
    /// With `read_only` the file is opened without write access, so any
    /// write fails with an I/O error.
    pub fn open_path<P: AsRef<Path>>(path: P, reserved: usize, read_only: bool) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(!read_only)
            .open(path.as_ref())?;
        Self::open(file, reserved)
    }
}

impl<M: Medium> BlockStore for BlockFile<M> {
    #[inline]
    fn block_size(&self) -> usize {
        self.block_size
    }

    fn next_block(&self) -> Result<BlockId> {
        let len = self.medium.byte_len()?;
        let space = len.saturating_sub(self.data_start());
        let bs = self.block_size as u64;
        // Round up: a partially written final block still occupies its slot.
        Ok(BlockId::new(space.div_ceil(bs)))
    }

    fn read_block(&mut self, id: BlockId, buf: &mut [u8]) -> Result<()> {
        self.check_len(buf.len())?;
        let next = self.next_block()?;
        if !id.is_valid() || id >= next {
            return Err(Error::BlockNotFound { id, next });
        }

        self.medium.seek(SeekFrom::Start(self.block_offset(id)))?;
        let mut filled = 0;
        while filled < buf.len() {
            let n = self.medium.read(&mut buf[filled..])?;
            if n == 0 {
                break;
            }
            filled += n;
        }
        buf[filled..].fill(0);
        Ok(())
    }

    fn write_block(&mut self, id: BlockId, data: &[u8]) -> Result<()> {
        self.check_len(data.len())?;
        let next = self.next_block()?;
        if !id.is_valid() || id > next {
            return Err(Error::BlockGap { id, next });
        }

        self.medium.seek(SeekFrom::Start(self.block_offset(id)))?;
        self.medium.write_all(data)?;
        Ok(())
    }

    fn read_preamble(&mut self, buf: &mut [u8]) -> Result<()> {
        if buf.len() as u64 > self.reserved {
            return Err(Error::structural("header larger than reserved region"));
        }
        self.medium.seek(SeekFrom::Start(0))?;
        self.medium.read_exact(buf)?;
        Ok(())
    }

    fn write_preamble(&mut self, data: &[u8]) -> Result<()> {
        if data.len() as u64 > self.reserved {
            return Err(Error::structural("header larger than reserved region"));
        }
        self.medium.seek(SeekFrom::Start(0))?;
        self.medium.write_all(data)?;
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        self.medium.flush()?;
        self.medium.sync()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryMedium;
    use std::io::Write;
    use tempfile::tempdir;

    const RESERVED: usize = 16;

    #[test]
    fn test_create_new_block_file() {
        let bf = BlockFile::create(MemoryMedium::new(), 64, RESERVED).unwrap();
        assert_eq!(bf.block_size(), 64);
        assert_eq!(bf.next_block().unwrap(), BlockId::new(0));
    }

    #[test]
    fn test_create_on_non_empty_fails() {
        let medium = MemoryMedium::new();
        BlockFile::create(medium.clone(), 64, RESERVED).unwrap();
        assert!(BlockFile::create(medium, 64, RESERVED).is_err());
    }

    #[test]
    fn test_open_reads_block_size() {
        let medium = MemoryMedium::new();
        BlockFile::create(medium.clone(), 77, RESERVED).unwrap();

        let bf = BlockFile::open(medium, RESERVED).unwrap();
        assert_eq!(bf.block_size(), 77);
    }

    #[test]
    fn test_open_bad_magic() {
        let mut medium = MemoryMedium::new();
        medium.write_all(&[0u8; RESERVED + 10]).unwrap();
        assert!(matches!(
            BlockFile::open(medium, RESERVED),
            Err(Error::BadMagic(_))
        ));
    }

    #[test]
    fn test_open_empty_medium_fails() {
        assert!(BlockFile::open(MemoryMedium::new(), RESERVED).is_err());
    }

    #[test]
    fn test_write_and_read_block() {
        let mut bf = BlockFile::create(MemoryMedium::new(), 32, RESERVED).unwrap();

        let mut data = [0u8; 32];
        data[0] = 0xAB;
        data[31] = 0xEF;
        bf.write_block(BlockId::new(0), &data).unwrap();
        assert_eq!(bf.next_block().unwrap(), BlockId::new(1));

        let mut buf = [0u8; 32];
        bf.read_block(BlockId::new(0), &mut buf).unwrap();
        assert_eq!(buf, data);
    }

    #[test]
    fn test_partial_block_counts_and_reads_zero_padded() {
        let mut bf = BlockFile::create(MemoryMedium::new(), 32, RESERVED).unwrap();
        bf.write_block(BlockId::new(0), &[1, 2, 3]).unwrap();
        assert_eq!(bf.next_block().unwrap(), BlockId::new(1));

        let mut buf = [0xFFu8; 32];
        bf.read_block(BlockId::new(0), &mut buf).unwrap();
        assert_eq!(&buf[..3], &[1, 2, 3]);
        assert!(buf[3..].iter().all(|&b| b == 0));
    }

    #[test]
    fn test_read_past_end_fails() {
        let mut bf = BlockFile::create(MemoryMedium::new(), 32, RESERVED).unwrap();
        bf.write_block(BlockId::new(0), &[0u8; 32]).unwrap();

        let mut buf = [0u8; 32];
        assert!(matches!(
            bf.read_block(BlockId::new(1), &mut buf),
            Err(Error::BlockNotFound { .. })
        ));
    }

    #[test]
    fn test_write_with_gap_fails() {
        let mut bf = BlockFile::create(MemoryMedium::new(), 32, RESERVED).unwrap();
        assert!(matches!(
            bf.write_block(BlockId::new(1), &[0u8; 32]),
            Err(Error::BlockGap { .. })
        ));
    }

    #[test]
    fn test_oversized_write_fails() {
        let mut bf = BlockFile::create(MemoryMedium::new(), 8, RESERVED).unwrap();
        assert!(bf.write_block(BlockId::new(0), &[0u8; 9]).is_err());
    }

    #[test]
    fn test_preamble_round_trip_leaves_blocks_alone() {
        let mut bf = BlockFile::create(MemoryMedium::new(), 8, RESERVED).unwrap();
        bf.write_block(BlockId::new(0), &[9u8; 8]).unwrap();
        bf.write_preamble(&[5u8; RESERVED]).unwrap();

        let mut header = [0u8; RESERVED];
        bf.read_preamble(&mut header).unwrap();
        assert_eq!(header, [5u8; RESERVED]);

        let mut block = [0u8; 8];
        bf.read_block(BlockId::new(0), &mut block).unwrap();
        assert_eq!(block, [9u8; 8]);
    }

    #[test]
    fn test_persistence_on_disk() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("blocks.db");

        {
            let mut bf = BlockFile::create_path(&path, 16, RESERVED).unwrap();
            for i in 0..10u8 {
                bf.write_block(BlockId::new(i as u64), &[i; 16]).unwrap();
            }
            bf.flush().unwrap();
        }

        {
            let mut bf = BlockFile::open_path(&path, RESERVED, true).unwrap();
            assert_eq!(bf.next_block().unwrap(), BlockId::new(10));
            let mut buf = [0u8; 16];
            bf.read_block(BlockId::new(7), &mut buf).unwrap();
            assert_eq!(buf, [7u8; 16]);
            assert!(bf.write_block(BlockId::new(0), &[0u8; 16]).is_err());
        }
    }

    #[test]
    fn test_preamble_size_matches_layout() {
        let medium = MemoryMedium::new();
        BlockFile::create(medium.clone(), 8, RESERVED).unwrap();
        assert_eq!(
            medium.byte_len().unwrap(),
            (RESERVED + BlockFile::<MemoryMedium>::PREAMBLE_SIZE) as u64
        );
    }

    #[test]
    fn test_create_path_existing_fails() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("blocks.db");
        BlockFile::create_path(&path, 16, RESERVED).unwrap();
        assert!(BlockFile::create_path(&path, 16, RESERVED).is_err());
    }
}
