//! Storage layer - block I/O and on-disk formats.
//!
//! This module handles persistent storage:
//! - [`Medium`] - Byte-addressable backing (file or memory)
//! - [`BlockStore`] - The block contract the tree is written against
//! - [`BlockFile`] - Fixed-size block I/O over a medium
//! - [`TreeHeader`] - The tree's fixed preamble

mod block_file;
mod block_store;
mod header;
mod medium;

pub use block_file::BlockFile;
pub use block_store::BlockStore;
pub use header::TreeHeader;
pub use medium::{Medium, MemoryMedium};
