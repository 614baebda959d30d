//! Index structures.
//!
//! - [`btree`] - Persistent B+tree from byte-string keys to `i64` values

pub mod btree;

pub use btree::BPlusTree;
