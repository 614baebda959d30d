//! Disk-resident B+tree with shadow paging.
//!
//! # Layout
//! - `tree` - the [`BPlusTree`] handle, lookups and traversal
//! - `insert` / `delete` - recursive mutation with split and merge
//! - `txn` - block allocation, write-back, eviction, commit and abort
//! - `recovery` - whole-tree consistency check and leak repair
//! - `node` / `arena` / `codec` - node representation and block format
//! - [`compare`] - the injected key order
//!
//! # Residency
//! ```text
//!              root (always resident)
//!             /     \
//!        internal   [on disk]
//!        /     \
//!    leaf*    leaf*          * = terminal, evicted oldest first
//! ```
//! Children are materialized on demand and linked to their parent through
//! arena handles. Only terminal nodes are ever evicted, so a resident node's
//! ancestors are always resident.

mod arena;
mod codec;
pub mod compare;
mod delete;
mod insert;
mod node;
mod recovery;
mod tree;
mod txn;

pub use compare::{CodePointOrder, KeyComparator, INVARIANT_LOCALE};
pub use tree::BPlusTree;
