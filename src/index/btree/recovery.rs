//! Consistency checking and leak repair.
//!
//! `recover` walks the whole tree from the root and then the free list.
//! Every block below the end of the store must turn up exactly once in one
//! of three places:
//!
//! - reachable from the root
//! - on the free list
//! - staged in `free_on_commit`
//!
//! Anything else leaked, typically because a commit was cut short after the
//! header switch. Strict mode reports the leaked blocks; corrective mode
//! returns them to the free list.

use std::cmp::Ordering;
use std::collections::HashSet;

use tracing::{debug, warn};

use super::codec::TAG_FREE;
use super::tree::BPlusTree;
use crate::common::{BlockId, Error, NodeId, Result};
use crate::storage::BlockStore;

/// Nodes and blocks seen during one traversal.
#[derive(Default)]
struct Visited {
    nodes: HashSet<NodeId>,
    blocks: HashSet<BlockId>,
}

impl<S: BlockStore> BPlusTree<S> {
    /// Verify the whole structure and account for every block.
    ///
    /// With `correct_errors` unset, leaked blocks are reported as
    /// `Error::Unreachable`. With it set they are pushed onto the free list,
    /// the new list head is written to the header, and the reclaimed blocks
    /// are returned.
    ///
    /// # Errors
    /// - `Error::Structural` for a broken tree or free list
    /// - `Error::Unreachable` for leaked blocks in strict mode
    /// - `Error::ReadOnly` for corrective mode on a read-only handle
    pub fn recover(&mut self, correct_errors: bool) -> Result<Vec<BlockId>> {
        if correct_errors {
            self.check_writable()?;
        }

        let mut visited = Visited::default();
        if let Some(root) = self.root {
            self.sanity_check(root, &mut visited)?;
        }

        let mut free = HashSet::new();
        let mut block = self.free_head;
        while block.is_valid() {
            if visited.blocks.contains(&block) {
                return Err(Error::structural(format!("{} is both in the tree and free", block)));
            }
            if !free.insert(block) {
                return Err(Error::structural(format!("free list loops at {}", block)));
            }
            block = self.read_free_link(block)?;
        }

        let end = self.store.next_block()?;
        let missing: Vec<BlockId> = (0..end.0)
            .map(BlockId::new)
            .filter(|b| !visited.blocks.contains(b) && !free.contains(b) && !self.free_on_commit.contains(b))
            .collect();
        debug!(
            reachable = visited.blocks.len(),
            free = free.len(),
            missing = missing.len(),
            "checked tree"
        );

        if !missing.is_empty() {
            if !correct_errors {
                return Err(Error::Unreachable { blocks: missing });
            }
            warn!(count = missing.len(), blocks = ?missing, "reclaiming unreachable blocks");
            for &block in missing.iter().rev() {
                self.link_free_block(block)?;
            }
            let mut header = self.read_header()?;
            header.free_head = self.free_head;
            self.store.write_preamble(&header.to_bytes())?;
            self.store.flush()?;
        }

        self.shrink_footprint()?;
        Ok(missing)
    }

    /// Cheap configuration checks, plus a full [`recover`](Self::recover)
    /// in strict mode when `strong` is set.
    pub fn check_integrity(&mut self, strong: bool) -> Result<()> {
        self.config.validate()?;
        if self.layout.block_size() != self.store.block_size() {
            return Err(Error::structural("node layout does not match the store block size"));
        }
        if !strong {
            return Ok(());
        }

        self.recover(false)?;
        let staged: Vec<BlockId> = self
            .free_on_commit
            .iter()
            .chain(self.free_on_abort.iter())
            .copied()
            .collect();
        for block in staged {
            let mut tag = [0u8; 1];
            self.store.read_block(block, &mut tag)?;
            if tag[0] == TAG_FREE {
                return Err(Error::structural(format!(
                    "{} is staged for release but already free",
                    block
                )));
            }
        }
        Ok(())
    }

    /// Check the subtree under `id`, loading all of it. Returns its least key.
    fn sanity_check(&mut self, id: NodeId, visited: &mut Visited) -> Result<Option<Vec<u8>>> {
        let order = self.config.order;
        let node = &self.arena[id];
        let block = node.block;
        if !visited.nodes.insert(id) {
            return Err(Error::structural(format!("node at {} reached twice", block)));
        }
        if block.is_valid() && !visited.blocks.insert(block) {
            return Err(Error::structural(format!("{} is referenced twice", block)));
        }

        if let Some((parent, index)) = node.parent {
            let parent = &self.arena[parent];
            if parent.is_leaf() {
                return Err(Error::structural(format!("parent of {} is a leaf", block)));
            }
            if parent.children().get(index).and_then(|c| c.node) != Some(id) {
                return Err(Error::structural(format!(
                    "{} is not child {} of its parent",
                    block, index
                )));
            }
            let min = if node.is_leaf() {
                (order / 2).saturating_sub(1)
            } else {
                order / 2
            };
            if node.len() < min {
                return Err(Error::structural(format!(
                    "{} holds {} keys, below the minimum of {}",
                    block,
                    node.len(),
                    min
                )));
            }
        }

        for pair in node.keys.windows(2) {
            if self.comparator.compare(&pair[0], &pair[1]) != Ordering::Less {
                return Err(Error::structural(format!("keys out of order in {}", block)));
            }
        }

        if node.is_leaf() {
            return Ok(node.keys.first().cloned());
        }
        if node.children().len() != node.len() + 1 {
            return Err(Error::structural(format!(
                "{} has {} keys but {} children",
                block,
                node.len(),
                node.children().len()
            )));
        }

        let mut least = None;
        for i in 0..self.arena[id].children().len() {
            let child = self.materialize(id, i)?;
            let child_least = self.sanity_check(child, visited)?;
            if i == 0 {
                least = child_least;
                continue;
            }
            let separator = &self.arena[id].keys[i - 1];
            match child_least {
                Some(k) if self.comparator.compare(&k, separator).is_eq() => {}
                Some(_) => {
                    return Err(Error::structural(format!(
                        "separator {} of {} is not the least key of its subtree",
                        i - 1,
                        block
                    )))
                }
                None => {
                    return Err(Error::structural(format!(
                        "child {} of {} is an empty subtree",
                        i, block
                    )))
                }
            }
        }
        Ok(least)
    }
}
