//! shadowtree - a persistent B+tree with shadow paging.
//!
//! Keys are byte strings up to a fixed maximum length, values are `i64`.
//! Every node occupies one fixed-size block. Changed nodes are written to
//! fresh blocks, never over committed ones, so the tree can commit or abort
//! a batch of changes atomically and always reopens in its last committed
//! state.
//!
//! # Architecture
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │  BPlusTree (index/btree)                                    │
//! │    get / set / remove_key / first_key / next_key            │
//! │    commit / abort / recover                                 │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Residency (cache/)                                         │
//! │    TerminalRegistry (eviction order) + TreeStats            │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Storage (storage/)                                         │
//! │    BlockStore trait ← BlockFile<M: Medium> + TreeHeader     │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Modules
//! - [`common`] - Shared primitives (BlockId, NodeId, Error, config)
//! - [`storage`] - Block I/O and on-disk formats
//! - [`cache`] - Resident node bookkeeping and statistics
//! - [`index`] - The B+tree itself
//!
//! # Quick Start
//! ```no_run
//! use shadowtree::{BPlusTree, TreeConfig};
//!
//! let mut tree = BPlusTree::create_file("words.bpt", TreeConfig::new(32)).unwrap();
//! tree.set("apple", 3).unwrap();
//! tree.set("pear", 5).unwrap();
//! tree.commit().unwrap();
//!
//! let mut key = tree.first_key().unwrap();
//! while let Some(k) = key {
//!     println!("{} = {}", String::from_utf8_lossy(&k), tree.get(&k).unwrap());
//!     key = tree.next_key(&k).unwrap();
//! }
//! tree.shutdown().unwrap();
//! ```

pub mod cache;
pub mod common;
pub mod index;
pub mod storage;

// Re-export commonly used items at crate root for convenience
pub use common::config::{OpenMode, TreeConfig};
pub use common::{BlockId, Error, NodeId, Result};

pub use cache::{StatsSnapshot, TreeStats};
pub use index::btree::{BPlusTree, CodePointOrder, KeyComparator};
pub use storage::{BlockFile, BlockStore, Medium, MemoryMedium};
