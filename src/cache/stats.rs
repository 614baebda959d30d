//! Tree I/O statistics tracking.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Counters maintained by a tree handle.
///
/// Fields are atomic so [`BPlusTree::stats`](crate::BPlusTree::stats) can
/// hand out a shared reference while the tree keeps counting.
/// `Ordering::Relaxed` everywhere: counters are independent.
///
/// # Example
/// ```
/// use shadowtree::TreeStats;
/// use std::sync::atomic::Ordering;
///
/// let stats = TreeStats::new();
/// stats.nodes_loaded.fetch_add(1, Ordering::Relaxed);
/// assert_eq!(stats.snapshot().nodes_loaded, 1);
/// ```
#[derive(Debug)]
pub struct TreeStats {
    /// Nodes decoded from a block.
    pub nodes_loaded: AtomicU64,

    /// Nodes encoded to a fresh block.
    pub nodes_written: AtomicU64,

    /// Terminal nodes dropped from memory to honor the footprint limit.
    pub evictions: AtomicU64,

    /// Blocks handed out by the allocator.
    pub blocks_allocated: AtomicU64,

    /// Blocks pushed onto the free list.
    pub blocks_freed: AtomicU64,
}

impl TreeStats {
    pub fn new() -> Self {
        Self {
            nodes_loaded: AtomicU64::new(0),
            nodes_written: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
            blocks_allocated: AtomicU64::new(0),
            blocks_freed: AtomicU64::new(0),
        }
    }

    #[inline]
    pub(crate) fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Get a snapshot of current statistics.
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            nodes_loaded: self.nodes_loaded.load(Ordering::Relaxed),
            nodes_written: self.nodes_written.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            blocks_allocated: self.blocks_allocated.load(Ordering::Relaxed),
            blocks_freed: self.blocks_freed.load(Ordering::Relaxed),
        }
    }

    /// Reset all counters to zero.
    pub fn reset(&self) {
        self.nodes_loaded.store(0, Ordering::Relaxed);
        self.nodes_written.store(0, Ordering::Relaxed);
        self.evictions.store(0, Ordering::Relaxed);
        self.blocks_allocated.store(0, Ordering::Relaxed);
        self.blocks_freed.store(0, Ordering::Relaxed);
    }
}

impl Default for TreeStats {
    fn default() -> Self {
        Self::new()
    }
}

/// A point-in-time copy of [`TreeStats`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub nodes_loaded: u64,
    pub nodes_written: u64,
    pub evictions: u64,
    pub blocks_allocated: u64,
    pub blocks_freed: u64,
}

impl fmt::Display for StatsSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Stats {{ loaded: {}, written: {}, evictions: {}, allocated: {}, freed: {} }}",
            self.nodes_loaded,
            self.nodes_written,
            self.evictions,
            self.blocks_allocated,
            self.blocks_freed
        )
    }
}
