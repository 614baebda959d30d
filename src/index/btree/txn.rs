//! Shadow paging: block allocation, node write-back, eviction, and the
//! commit/abort protocol.
//!
//! A node that changes after a commit is never written over its committed
//! block. It goes to a fresh block and the old one is scheduled for release:
//!
//! | block state                         | tracked in       | on commit | on abort  |
//! |-------------------------------------|------------------|-----------|-----------|
//! | committed, superseded by a rewrite  | `free_on_commit` | freed     | kept      |
//! | allocated since the last commit     | `free_on_abort`  | kept      | freed     |
//!
//! A block allocated and superseded within the same transaction is freed on
//! the spot. The header is switched to the new root only after every node
//! write is flushed, and committed blocks join the free list only after
//! that, so a crash at any point leaves the last committed tree readable.

use tracing::{debug, trace};

use super::codec::{decode_free, encode_free, FREE_BLOCK_SIZE, TAG_FREE};
use super::tree::BPlusTree;
use crate::cache::TreeStats;
use crate::common::{BlockId, Error, NodeId, Result};
use crate::storage::{BlockStore, TreeHeader};

// ========================================================================
// Free list
// ========================================================================

impl<S: BlockStore> BPlusTree<S> {
    /// Take the head of the free list, or a new block at the end of the
    /// store when the list is empty.
    pub(super) fn allocate_block(&mut self) -> Result<BlockId> {
        let block = if self.free_head.is_valid() {
            let block = self.free_head;
            self.free_head = self.read_free_link(block)?;
            block
        } else {
            self.store.next_block()?
        };
        TreeStats::bump(&self.stats.blocks_allocated);
        trace!(%block, "allocated block");
        Ok(block)
    }

    /// Push `block` onto the free list.
    ///
    /// # Errors
    /// `Error::Structural` if the block is already tagged free.
    pub(super) fn deallocate_block(&mut self, block: BlockId) -> Result<()> {
        let mut tag = [0u8; 1];
        self.store.read_block(block, &mut tag)?;
        if tag[0] == TAG_FREE {
            return Err(Error::structural(format!("{} freed twice", block)));
        }
        self.link_free_block(block)
    }

    /// Push `block` onto the free list whatever it holds.
    pub(super) fn link_free_block(&mut self, block: BlockId) -> Result<()> {
        self.store.write_block(block, &encode_free(self.free_head))?;
        self.free_head = block;
        TreeStats::bump(&self.stats.blocks_freed);
        trace!(%block, "freed block");
        Ok(())
    }

    /// Successor of a block on the free list.
    pub(super) fn read_free_link(&mut self, block: BlockId) -> Result<BlockId> {
        let mut raw = [0u8; FREE_BLOCK_SIZE];
        self.store.read_block(block, &mut raw)?;
        decode_free(&raw)
            .ok_or_else(|| Error::structural(format!("{} is on the free list but not tagged free", block)))
    }

    /// Give up a block the tree no longer points at.
    ///
    /// Blocks from the current transaction are freed immediately. Committed
    /// blocks wait for the next commit.
    pub(super) fn release_block(&mut self, block: BlockId) -> Result<()> {
        if self.free_on_abort.remove(&block) {
            self.deallocate_block(block)
        } else {
            self.free_on_commit.insert(block);
            Ok(())
        }
    }
}

// ========================================================================
// Node write-back
// ========================================================================

impl<S: BlockStore> BPlusTree<S> {
    /// Write a node to a newly allocated block, releasing its previous one.
    /// Returns the new address.
    pub(super) fn dump_to_fresh_block(&mut self, id: NodeId) -> Result<BlockId> {
        let old = self.arena[id].block;
        let fresh = self.allocate_block()?;
        self.write_node(id, fresh)?;
        if old.is_valid() {
            self.release_block(old)?;
        }
        self.free_on_abort.insert(fresh);
        Ok(fresh)
    }

    /// Encode a node into `block` and point its parent slot there.
    fn write_node(&mut self, id: NodeId, block: BlockId) -> Result<()> {
        let mut buf = vec![0u8; self.layout.block_size()];
        let node = &self.arena[id];
        self.layout.encode(&node.keys, &node.body, &mut buf)?;
        self.store.write_block(block, &buf)?;
        TreeStats::bump(&self.stats.nodes_written);

        let node = &mut self.arena[id];
        node.dirty = false;
        node.block = block;
        let Some((parent, index)) = node.parent else {
            return Ok(());
        };

        let slot = self.arena[parent]
            .children_mut()?
            .get_mut(index)
            .ok_or_else(|| Error::structural(format!("parent has no slot {} for {}", index, block)))?;
        if slot.node != Some(id) {
            return Err(Error::structural(format!(
                "parent slot {} does not refer back to the node written to {}",
                index, block
            )));
        }
        if slot.block != block {
            slot.block = block;
            self.soil(parent);
        }
        Ok(())
    }

    /// Drop a node that is no longer part of the tree.
    pub(super) fn discard_node(&mut self, id: NodeId) -> Result<()> {
        let block = self.arena[id].block;
        if block.is_valid() {
            self.release_block(block)?;
        }
        self.terminals.forget(id);
        self.arena.remove(id);
        Ok(())
    }

    /// Write back a subtree and detach it from memory.
    ///
    /// Resident descendants are always written and dropped. The node itself
    /// is written if dirty, unlinked from its parent, and dropped only when
    /// `destroy` is set. Returns the node's block.
    pub(super) fn invalidate(&mut self, id: NodeId, destroy: bool) -> Result<BlockId> {
        for (index, child) in self.arena[id].resident_children() {
            let block = self.invalidate(child, true)?;
            self.arena[id].children_mut()?[index].block = block;
        }
        if self.arena[id].dirty {
            self.dump_to_fresh_block(id)?;
        }
        self.terminals.forget(id);

        let block = self.arena[id].block;
        if let Some((parent, index)) = self.arena[id].parent.take() {
            let slot = &mut self.arena[parent].children_mut()?[index];
            slot.node = None;
            slot.block = block;
            self.check_terminal(parent);
        }
        if destroy {
            self.arena.remove(id);
        }
        Ok(block)
    }

    /// Evict terminal nodes, oldest first, until at most the footprint limit
    /// remain resident.
    pub fn shrink_footprint(&mut self) -> Result<()> {
        while self.terminals.len() > self.config.footprint_limit {
            let Some(victim) = self.terminals.pop_oldest() else {
                break;
            };
            let Some(node) = self.arena.get(victim) else {
                continue;
            };
            let block = node.block;
            if !block.is_valid() {
                continue;
            }
            self.invalidate(victim, true)?;
            TreeStats::bump(&self.stats.evictions);
            trace!(node = %victim, %block, "evicted node");
        }
        Ok(())
    }
}

// ========================================================================
// Transactions
// ========================================================================

impl<S: BlockStore> BPlusTree<S> {
    /// Make every change since the last commit durable.
    ///
    /// All dirty nodes are written to fresh blocks and flushed, then the
    /// header is switched to the new root. Only then do superseded blocks
    /// join the free list. Afterwards only the root stays resident.
    ///
    /// # Errors
    /// `Error::ReadOnly` on a read-only handle. I/O and structural errors are
    /// fatal.
    pub fn commit(&mut self) -> Result<()> {
        self.check_writable()?;
        if let Some(root) = self.root {
            self.root_block = self.invalidate(root, false)?;
        }
        self.store.flush()?;
        self.write_header()?;
        self.store.flush()?;

        let released = std::mem::take(&mut self.free_on_commit);
        let freed = released.len();
        for block in released.into_iter().rev() {
            self.deallocate_block(block)?;
        }
        self.write_header()?;
        self.store.flush()?;

        self.free_on_abort.clear();
        self.terminals.clear();
        debug!(root = %self.root_block, freed, "committed");
        Ok(())
    }

    /// Drop every change since the last commit and reload the committed root.
    ///
    /// # Errors
    /// `Error::ReadOnly` on a read-only handle.
    pub fn abort(&mut self) -> Result<()> {
        self.check_writable()?;
        let allocated = std::mem::take(&mut self.free_on_abort);
        let freed = allocated.len();
        for block in allocated.into_iter().rev() {
            self.deallocate_block(block)?;
        }

        let header = self.read_header()?;
        self.arena.clear();
        self.root = None;
        self.free_on_commit.clear();
        self.terminals.clear();
        self.root_block = header.root;
        if header.root.is_valid() {
            self.root = Some(self.load_node(header.root, None)?);
        }
        self.write_header()?;
        self.store.flush()?;
        debug!(root = %self.root_block, freed, "aborted");
        Ok(())
    }

    pub(super) fn read_header(&mut self) -> Result<TreeHeader> {
        let mut raw = [0u8; TreeHeader::SIZE];
        self.store.read_preamble(&mut raw)?;
        TreeHeader::from_bytes(&raw)
    }

    /// Persist the current root address and free-list head.
    pub(super) fn write_header(&mut self) -> Result<()> {
        let mut header = TreeHeader::new(
            self.config.order as u32,
            self.config.max_key_length as u32,
            self.comparator.locale_id(),
        );
        header.root = self.root_block;
        header.free_head = self.free_head;
        self.store.write_preamble(&header.to_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::config::TreeConfig;
    use crate::storage::{BlockFile, MemoryMedium};

    fn empty_tree() -> BPlusTree<BlockFile<MemoryMedium>> {
        BPlusTree::create_on(MemoryMedium::new(), TreeConfig::new(8).with_order(4)).unwrap()
    }

    fn allocate_written(tree: &mut BPlusTree<BlockFile<MemoryMedium>>) -> BlockId {
        let block = tree.allocate_block().unwrap();
        tree.store.write_block(block, &[0u8; FREE_BLOCK_SIZE]).unwrap();
        block
    }

    fn small_order_tree() -> BPlusTree<BlockFile<MemoryMedium>> {
        BPlusTree::create_on(MemoryMedium::new(), TreeConfig::new(8).with_order(2)).unwrap()
    }

    /// Blocks on the free list, head first.
    fn free_list(tree: &mut BPlusTree<BlockFile<MemoryMedium>>) -> Vec<BlockId> {
        let mut blocks = Vec::new();
        let mut block = tree.free_head;
        while block.is_valid() {
            blocks.push(block);
            block = tree.read_free_link(block).unwrap();
        }
        blocks
    }

    fn assert_ascending(blocks: &[BlockId]) {
        assert!(
            blocks.windows(2).all(|pair| pair[0] < pair[1]),
            "free list not ascending: {:?}",
            blocks
        );
    }

    #[test]
    fn test_free_list_reuses_last_freed_first() {
        let mut tree = empty_tree();
        let a = allocate_written(&mut tree);
        let b = allocate_written(&mut tree);
        assert_eq!((a, b), (BlockId::new(0), BlockId::new(1)));

        tree.deallocate_block(a).unwrap();
        tree.deallocate_block(b).unwrap();
        assert_eq!(tree.free_head, b);

        assert_eq!(tree.allocate_block().unwrap(), b);
        assert_eq!(tree.allocate_block().unwrap(), a);
        assert!(!tree.free_head.is_valid());
        assert_eq!(tree.allocate_block().unwrap(), BlockId::new(2));
    }

    #[test]
    fn test_double_free_is_structural() {
        let mut tree = empty_tree();
        let a = allocate_written(&mut tree);
        tree.deallocate_block(a).unwrap();
        let err = tree.deallocate_block(a).unwrap_err();
        assert!(matches!(err, Error::Structural(_)));
        assert!(err.is_fatal());
    }

    #[test]
    fn test_rewrites_within_a_transaction_free_immediately() {
        let mut tree = empty_tree();
        tree.set("a", 1).unwrap();
        tree.commit().unwrap();
        let committed = tree.root_block;
        let root = tree.root.unwrap();

        let first = tree.dump_to_fresh_block(root).unwrap();
        assert!(tree.free_on_commit.contains(&committed));
        assert!(tree.free_on_abort.contains(&first));

        let second = tree.dump_to_fresh_block(root).unwrap();
        assert_ne!(first, second);
        assert_eq!(tree.free_head, first);
        assert!(!tree.free_on_abort.contains(&first));

        tree.abort().unwrap();
        assert_eq!(tree.root_block, committed);
        assert!(tree.free_on_abort.is_empty());
        assert!(tree.free_on_commit.is_empty());
        assert_eq!(tree.get("a").unwrap(), 1);
        assert!(tree.recover(false).unwrap().is_empty());
    }

    #[test]
    fn test_commit_frees_superseded_root() {
        let mut tree = empty_tree();
        tree.set("a", 1).unwrap();
        tree.commit().unwrap();
        let old_root = tree.root_block;

        tree.set("b", 2).unwrap();
        tree.commit().unwrap();
        assert_ne!(tree.root_block, old_root);
        assert_eq!(tree.free_head, old_root);
        assert_eq!(tree.read_header().unwrap().root, tree.root_block);
    }

    #[test]
    fn test_commit_releases_superseded_blocks_highest_first() {
        let mut tree = small_order_tree();
        for i in 0..20 {
            tree.set(format!("{:02}", i), i).unwrap();
        }
        tree.commit().unwrap();
        // Empty the list so it ends up holding only this commit's releases.
        while tree.free_head.is_valid() {
            tree.allocate_block().unwrap();
        }

        for i in (0..20).step_by(4) {
            tree.set(format!("{:02}", i), -i).unwrap();
        }
        tree.commit().unwrap();

        let freed = free_list(&mut tree);
        assert!(freed.len() >= 3, "only {} blocks released", freed.len());
        assert_ascending(&freed);
        assert_eq!(tree.read_header().unwrap().free_head, freed[0]);
    }

    #[test]
    fn test_abort_releases_allocations_highest_first() {
        let mut tree = small_order_tree();
        for i in 0..10 {
            tree.set(format!("{:02}", i), i).unwrap();
        }
        tree.commit().unwrap();

        for i in 10..30 {
            tree.set(format!("{:02}", i), i).unwrap();
        }
        let before = free_list(&mut tree);
        let allocated: Vec<BlockId> = tree.free_on_abort.iter().copied().collect();
        assert!(allocated.len() >= 3, "only {} blocks allocated", allocated.len());

        tree.abort().unwrap();
        let after = free_list(&mut tree);
        assert_eq!(after.len(), allocated.len() + before.len());
        let (pushed, rest) = after.split_at(allocated.len());
        assert_eq!(pushed, allocated.as_slice());
        assert_ascending(pushed);
        assert_eq!(rest, before.as_slice());
        assert!(tree.recover(false).unwrap().is_empty());
    }

    #[test]
    fn test_commit_leaves_only_root_resident() {
        let mut tree = empty_tree();
        for i in 0..100 {
            tree.set(format!("{:03}", i), i).unwrap();
        }
        assert!(tree.resident_nodes() > 1);
        tree.commit().unwrap();
        assert_eq!(tree.resident_nodes(), 1);
        assert_eq!(tree.resident_terminal_nodes(), 0);
        assert!(!tree.has_uncommitted_changes());
    }
}
