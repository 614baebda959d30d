//! Backing media for block files.
//!
//! A [`Medium`] is a seekable byte stream that can report its length and be
//! forced to stable storage. Two implementations ship with the crate:
//! - [`std::fs::File`] for on-disk stores
//! - [`MemoryMedium`] for tests and scratch trees

use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::sync::Arc;

use parking_lot::Mutex;

/// Byte-addressable storage underneath a [`BlockFile`](super::BlockFile).
pub trait Medium: Read + Write + Seek {
    /// Current length of the medium in bytes.
    fn byte_len(&self) -> io::Result<u64>;

    /// Force written data to stable storage.
    fn sync(&mut self) -> io::Result<()>;
}

impl Medium for File {
    fn byte_len(&self) -> io::Result<u64> {
        Ok(self.metadata()?.len())
    }

    fn sync(&mut self) -> io::Result<()> {
        self.sync_all()
    }
}

/// Growable in-memory medium.
///
/// Clones share the same bytes but keep their own cursor, so a test can hand
/// one clone to a tree, drop the tree, and reopen a new tree on another clone.
///
/// # Example
/// ```
/// use std::io::{Read, Seek, SeekFrom, Write};
/// use shadowtree::storage::{Medium, MemoryMedium};
///
/// let mut a = MemoryMedium::new();
/// let mut b = a.clone();
/// a.write_all(b"hello").unwrap();
/// assert_eq!(b.byte_len().unwrap(), 5);
///
/// let mut buf = [0u8; 5];
/// b.seek(SeekFrom::Start(0)).unwrap();
/// b.read_exact(&mut buf).unwrap();
/// assert_eq!(&buf, b"hello");
/// ```
#[derive(Debug, Clone, Default)]
pub struct MemoryMedium {
    bytes: Arc<Mutex<Vec<u8>>>,
    pos: u64,
}

impl MemoryMedium {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of the current contents.
    pub fn snapshot(&self) -> Vec<u8> {
        self.bytes.lock().clone()
    }
}

impl Read for MemoryMedium {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let bytes = self.bytes.lock();
        let start = (self.pos as usize).min(bytes.len());
        let n = buf.len().min(bytes.len() - start);
        buf[..n].copy_from_slice(&bytes[start..start + n]);
        self.pos += n as u64;
        Ok(n)
    }
}

impl Write for MemoryMedium {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut bytes = self.bytes.lock();
        let start = self.pos as usize;
        let end = start + buf.len();
        if bytes.len() < end {
            // Writing past the end zero-fills the hole, like a sparse file.
            bytes.resize(end, 0);
        }
        bytes[start..end].copy_from_slice(buf);
        self.pos = end as u64;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Seek for MemoryMedium {
    fn seek(&mut self, target: SeekFrom) -> io::Result<u64> {
        let len = self.bytes.lock().len() as i64;
        let next = match target {
            SeekFrom::Start(offset) => offset as i64,
            SeekFrom::End(delta) => len + delta,
            SeekFrom::Current(delta) => self.pos as i64 + delta,
        };
        if next < 0 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "seek before start of medium",
            ));
        }
        self.pos = next as u64;
        Ok(self.pos)
    }
}

impl Medium for MemoryMedium {
    fn byte_len(&self) -> io::Result<u64> {
        Ok(self.bytes.lock().len() as u64)
    }

    fn sync(&mut self) -> io::Result<()> {
        Ok(())
    }
}
