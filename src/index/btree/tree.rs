//! The tree handle: construction, lookups, and the public mutation API.

use std::collections::BTreeSet;
use std::fs::File;
use std::path::Path;

use tracing::info;

use super::arena::NodeArena;
use super::codec::NodeLayout;
use super::compare::{CodePointOrder, KeyComparator};
use super::node::Node;
use crate::cache::{TerminalRegistry, TreeStats};
use crate::common::config::{check_footprint_limit, OpenMode, TreeConfig};
use crate::common::{BlockId, Error, NodeId, Result};
use crate::storage::{BlockFile, BlockStore, Medium, TreeHeader};

/// A persistent B+tree mapping byte-string keys to `i64` values.
///
/// Every node lives in one block of the store. Mutations are shadow-paged:
/// a node that changes is written to a fresh block at the latest on
/// [`commit`](Self::commit), so the last committed tree stays intact on disk
/// until the header is switched over. [`abort`](Self::abort) drops all work
/// since the last commit.
///
/// Only part of the tree is resident. Terminal nodes (resident nodes with no
/// resident children) are evicted oldest first once there are more than
/// the footprint limit.
///
/// # Example
/// ```
/// use shadowtree::{BPlusTree, TreeConfig};
/// use shadowtree::storage::MemoryMedium;
///
/// let mut tree = BPlusTree::create_on(MemoryMedium::new(), TreeConfig::new(16)).unwrap();
/// tree.set("dog", 1).unwrap();
/// tree.commit().unwrap();
///
/// tree.remove_key("dog").unwrap();
/// tree.set("pig", 2).unwrap();
/// tree.abort().unwrap();
///
/// assert_eq!(tree.get("dog").unwrap(), 1);
/// assert!(tree.get("pig").is_err());
/// ```
pub struct BPlusTree<S: BlockStore> {
    pub(super) store: S,
    pub(super) config: TreeConfig,
    pub(super) layout: NodeLayout,
    pub(super) comparator: Box<dyn KeyComparator>,
    pub(super) mode: OpenMode,

    /// Owns every resident node.
    pub(super) arena: NodeArena,
    pub(super) root: Option<NodeId>,
    /// Root address as of the last commit, or the latest root write since.
    pub(super) root_block: BlockId,
    pub(super) free_head: BlockId,

    /// Committed blocks superseded since the last commit.
    pub(super) free_on_commit: BTreeSet<BlockId>,
    /// Blocks allocated since the last commit.
    pub(super) free_on_abort: BTreeSet<BlockId>,

    pub(super) terminals: TerminalRegistry,
    pub(super) stats: TreeStats,
}

// ========================================================================
// Construction
// ========================================================================

impl<S: BlockStore> BPlusTree<S> {
    /// Initialize a new, empty tree on a store that holds no blocks yet.
    ///
    /// # Errors
    /// - `Error::InvalidConfig` if the config is out of range, its block size
    ///   differs from the store's, or the store is not empty
    pub fn create(mut store: S, config: TreeConfig, comparator: Box<dyn KeyComparator>) -> Result<Self> {
        config.validate()?;
        if store.block_size() != config.block_size() {
            return Err(Error::InvalidConfig(format!(
                "store block size {} does not match tree block size {}",
                store.block_size(),
                config.block_size()
            )));
        }
        if store.next_block()? != BlockId::new(0) {
            return Err(Error::InvalidConfig(
                "cannot create a tree on a store that already has blocks".to_string(),
            ));
        }

        let header = TreeHeader::new(
            config.order as u32,
            config.max_key_length as u32,
            comparator.locale_id(),
        );
        store.write_preamble(&header.to_bytes())?;
        store.flush()?;

        info!(
            order = config.order,
            max_key_length = config.max_key_length,
            "created tree"
        );
        Ok(Self::assemble(store, config, comparator, OpenMode::ReadWrite))
    }

    /// Open an existing tree.
    ///
    /// # Errors
    /// - `Error::BadMagic` if the header is not a tree header
    /// - `Error::ComparatorMismatch` if `comparator` is not the one the store
    ///   was created with
    /// - `Error::Structural` if the header disagrees with the store geometry
    pub fn open(mut store: S, comparator: Box<dyn KeyComparator>, mode: OpenMode) -> Result<Self> {
        let mut raw = [0u8; TreeHeader::SIZE];
        store.read_preamble(&mut raw)?;
        let header = TreeHeader::from_bytes(&raw)?;

        if header.locale_id != comparator.locale_id() {
            return Err(Error::ComparatorMismatch {
                stored: header.locale_id,
                supplied: comparator.locale_id(),
            });
        }
        let config = TreeConfig::new(header.max_key_length as usize).with_order(header.order as usize);
        config.validate()?;
        if config.block_size() != store.block_size() {
            return Err(Error::structural(format!(
                "tree header implies block size {} but store has {}",
                config.block_size(),
                store.block_size()
            )));
        }

        let mut tree = Self::assemble(store, config, comparator, mode);
        tree.root_block = header.root;
        tree.free_head = header.free_head;
        if header.root.is_valid() {
            tree.root = Some(tree.load_node(header.root, None)?);
        }

        info!(
            order = config.order,
            max_key_length = config.max_key_length,
            root = %header.root,
            read_only = tree.is_read_only(),
            "opened tree"
        );
        Ok(tree)
    }

    fn assemble(store: S, config: TreeConfig, comparator: Box<dyn KeyComparator>, mode: OpenMode) -> Self {
        Self {
            store,
            layout: NodeLayout::new(&config),
            config,
            comparator,
            mode,
            arena: NodeArena::new(),
            root: None,
            root_block: BlockId::NONE,
            free_head: BlockId::NONE,
            free_on_commit: BTreeSet::new(),
            free_on_abort: BTreeSet::new(),
            terminals: TerminalRegistry::new(),
            stats: TreeStats::new(),
        }
    }
}

impl<M: Medium> BPlusTree<BlockFile<M>> {
    /// Create a tree with [`CodePointOrder`] on an empty medium.
    pub fn create_on(medium: M, config: TreeConfig) -> Result<Self> {
        config.validate()?;
        let store = BlockFile::create(medium, config.block_size(), TreeHeader::SIZE)?;
        Self::create(store, config, Box::new(CodePointOrder))
    }

    /// Open a [`CodePointOrder`] tree on a medium.
    pub fn open_on(medium: M, mode: OpenMode) -> Result<Self> {
        let store = BlockFile::open(medium, TreeHeader::SIZE)?;
        Self::open(store, Box::new(CodePointOrder), mode)
    }
}

impl BPlusTree<BlockFile<File>> {
    /// Create a new tree file. Fails if `path` exists.
    pub fn create_file<P: AsRef<Path>>(path: P, config: TreeConfig) -> Result<Self> {
        config.validate()?;
        let store = BlockFile::create_path(path, config.block_size(), TreeHeader::SIZE)?;
        Self::create(store, config, Box::new(CodePointOrder))
    }

    /// Open an existing tree file for reading and writing.
    pub fn open_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let store = BlockFile::open_path(path, TreeHeader::SIZE, false)?;
        Self::open(store, Box::new(CodePointOrder), OpenMode::ReadWrite)
    }

    /// Open an existing tree file without write access.
    pub fn open_file_read_only<P: AsRef<Path>>(path: P) -> Result<Self> {
        let store = BlockFile::open_path(path, TreeHeader::SIZE, true)?;
        Self::open(store, Box::new(CodePointOrder), OpenMode::ReadOnly)
    }
}

// ========================================================================
// Public API
// ========================================================================

impl<S: BlockStore> BPlusTree<S> {
    /// Value stored under `key`.
    ///
    /// # Errors
    /// `Error::KeyMissing` if the key is absent.
    pub fn get(&mut self, key: impl AsRef<[u8]>) -> Result<i64> {
        let key = key.as_ref();
        self.lookup(key)?.ok_or_else(|| Error::key_missing(key))
    }

    /// Value stored under `key`, or `default`.
    pub fn get_or(&mut self, key: impl AsRef<[u8]>, default: i64) -> Result<i64> {
        Ok(self.lookup(key)?.unwrap_or(default))
    }

    /// Value stored under `key`, or `None` if it is absent.
    pub fn lookup(&mut self, key: impl AsRef<[u8]>) -> Result<Option<i64>> {
        let result = self.find_value(key.as_ref());
        self.finish(result)
    }

    /// Whether `key` is in the tree.
    pub fn contains_key(&mut self, key: impl AsRef<[u8]>) -> Result<bool> {
        Ok(self.lookup(key)?.is_some())
    }

    /// Insert or overwrite `key`.
    ///
    /// # Errors
    /// - `Error::BadKey` if the key is longer than the configured maximum
    /// - `Error::ReadOnly` on a read-only handle
    pub fn set(&mut self, key: impl AsRef<[u8]>, value: i64) -> Result<()> {
        let key = key.as_ref();
        self.check_writable()?;
        if key.len() > self.config.max_key_length {
            return Err(Error::BadKey {
                len: key.len(),
                max: self.config.max_key_length,
            });
        }
        let result = self.insert(key, value);
        self.finish(result)
    }

    /// Delete `key`.
    ///
    /// # Errors
    /// `Error::KeyMissing` if the key is absent; the tree is unchanged.
    pub fn remove_key(&mut self, key: impl AsRef<[u8]>) -> Result<()> {
        self.check_writable()?;
        let result = self.remove(key.as_ref());
        self.finish(result)
    }

    /// Smallest key in the tree.
    pub fn first_key(&mut self) -> Result<Option<Vec<u8>>> {
        let result = match self.root {
            Some(root) => self.following_key(root, 0),
            None => Ok(None),
        };
        self.finish(result)
    }

    /// Smallest key strictly greater than `key`.
    pub fn next_key(&mut self, key: impl AsRef<[u8]>) -> Result<Option<Vec<u8>>> {
        let result = self.find_next_key(key.as_ref());
        self.finish(result)
    }

    /// Change the resident terminal node limit.
    ///
    /// # Errors
    /// `Error::InvalidConfig` if `limit` is below
    /// [`MIN_FOOTPRINT_LIMIT`](crate::common::config::MIN_FOOTPRINT_LIMIT).
    pub fn set_footprint_limit(&mut self, limit: usize) -> Result<()> {
        check_footprint_limit(limit)?;
        self.config.footprint_limit = limit;
        Ok(())
    }

    /// Number of registered terminal nodes.
    pub fn resident_terminal_nodes(&self) -> usize {
        self.terminals.len()
    }

    /// Number of resident nodes, root included.
    pub fn resident_nodes(&self) -> usize {
        self.arena.len()
    }

    /// Counters for this handle.
    pub fn stats(&self) -> &TreeStats {
        &self.stats
    }

    /// Configuration in effect. For an opened store the order and key
    /// length are the ones recorded in its header.
    pub fn config(&self) -> &TreeConfig {
        &self.config
    }

    /// Whether the handle was opened with [`OpenMode::ReadOnly`].
    pub fn is_read_only(&self) -> bool {
        self.mode == OpenMode::ReadOnly
    }

    /// Whether anything has changed since the last commit or abort.
    pub fn has_uncommitted_changes(&self) -> bool {
        !self.free_on_abort.is_empty()
            || !self.free_on_commit.is_empty()
            || self.root.is_some_and(|r| self.arena[r].dirty)
    }

    /// Close the handle.
    ///
    /// Uncommitted work is aborted first, which keeps the free list of the
    /// committed state valid; then the store is flushed.
    pub fn shutdown(mut self) -> Result<()> {
        if !self.is_read_only() && self.has_uncommitted_changes() {
            self.abort()?;
        }
        self.store.flush()?;
        info!("tree shut down");
        Ok(())
    }

    /// Give the store back without flushing or aborting.
    pub fn into_store(self) -> S {
        self.store
    }
}

// ========================================================================
// Internals: navigation
// ========================================================================

impl<S: BlockStore> BPlusTree<S> {
    pub(super) fn check_writable(&self) -> Result<()> {
        if self.is_read_only() {
            return Err(Error::ReadOnly);
        }
        Ok(())
    }

    /// Evict down to the footprint limit after a public operation, unless the
    /// operation left the tree in a state that must not be written.
    pub(super) fn finish<T>(&mut self, result: Result<T>) -> Result<T> {
        if !matches!(&result, Err(e) if e.is_fatal()) {
            self.shrink_footprint()?;
        }
        result
    }

    /// Read and decode `block` into a new resident node.
    pub(super) fn load_node(&mut self, block: BlockId, parent: Option<(NodeId, usize)>) -> Result<NodeId> {
        let mut buf = vec![0u8; self.layout.block_size()];
        self.store.read_block(block, &mut buf)?;
        let (keys, body) = self.layout.decode(&buf)?;

        let id = self.arena.insert(Node::loaded(keys, body, block, parent));
        TreeStats::bump(&self.stats.nodes_loaded);
        // Terminal until a child is materialized. The root is never tracked.
        if parent.is_some() {
            self.terminals.record(id);
        }
        Ok(id)
    }

    /// Resident handle for child `index` of `parent`, loading it if needed.
    pub(super) fn materialize(&mut self, parent: NodeId, index: usize) -> Result<NodeId> {
        let slot = self.arena[parent]
            .children()
            .get(index)
            .copied()
            .ok_or_else(|| {
                Error::structural(format!(
                    "no child {} in node at {}",
                    index, self.arena[parent].block
                ))
            })?;
        if let Some(id) = slot.node {
            return Ok(id);
        }
        if !slot.block.is_valid() {
            return Err(Error::structural(format!(
                "cannot descend into empty subtree at position {} in {}",
                index, self.arena[parent].block
            )));
        }

        let id = self.load_node(slot.block, Some((parent, index)))?;
        self.arena[parent].children_mut()?[index].node = Some(id);
        self.terminals.forget(parent);
        Ok(id)
    }

    /// Mark a node and all its ancestors dirty.
    pub(super) fn soil(&mut self, id: NodeId) {
        let mut current = Some(id);
        while let Some(id) = current {
            let node = &mut self.arena[id];
            if node.dirty {
                break;
            }
            node.dirty = true;
            current = node.parent.map(|(p, _)| p);
        }
    }

    pub(super) fn record_terminal(&mut self, id: NodeId) {
        if self.root != Some(id) {
            self.terminals.record(id);
        }
    }

    /// Register `id` as terminal if it has no resident children, else drop it.
    pub(super) fn check_terminal(&mut self, id: NodeId) {
        if self.arena[id].has_resident_children() {
            self.terminals.forget(id);
        } else {
            self.record_terminal(id);
        }
    }

    /// Point every resident child of `id` back at it and refresh the child
    /// addresses from them.
    pub(super) fn reparent_children(&mut self, id: NodeId) -> Result<()> {
        for (i, child) in self.arena[id].resident_children() {
            self.arena[child].parent = Some((id, i));
            let block = self.arena[child].block;
            self.arena[id].children_mut()?[i].block = block;
        }
        self.check_terminal(id);
        Ok(())
    }

    /// Descend to the leaf where `key` belongs.
    pub(super) fn find_leaf(&mut self, key: &[u8], past: bool) -> Result<Option<(NodeId, usize)>> {
        let Some(mut id) = self.root else {
            return Ok(None);
        };
        loop {
            let pos = self.arena[id].find_position(key, past, self.comparator.as_ref());
            if self.arena[id].is_leaf() {
                return Ok(Some((id, pos)));
            }
            id = self.materialize(id, pos)?;
        }
    }

    fn find_value(&mut self, key: &[u8]) -> Result<Option<i64>> {
        let Some((leaf, pos)) = self.find_leaf(key, false)? else {
            return Ok(None);
        };
        let node = &self.arena[leaf];
        match node.keys.get(pos) {
            Some(k) if self.comparator.compare(k, key).is_eq() => Ok(node.value_at(pos)),
            _ => Ok(None),
        }
    }

    fn find_next_key(&mut self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        let Some((leaf, pos)) = self.find_leaf(key, true)? else {
            return Ok(None);
        };
        if let Some(k) = self.arena[leaf].keys.get(pos) {
            return Ok(Some(k.clone()));
        }
        let len = self.arena[leaf].len();
        self.following_key(leaf, len)
    }

    /// First key at or after position `at` of `id`, climbing to the parent
    /// when this node is exhausted. Handles empty leaves.
    fn following_key(&mut self, mut id: NodeId, mut at: usize) -> Result<Option<Vec<u8>>> {
        loop {
            let node = &self.arena[id];
            let exhausted = if node.is_leaf() {
                at >= node.len()
            } else {
                at > node.len()
            };
            if exhausted {
                match node.parent {
                    Some((parent, index)) => {
                        id = parent;
                        at = index + 1;
                        continue;
                    }
                    None => return Ok(None),
                }
            }
            if node.is_leaf() {
                return Ok(Some(node.keys[at].clone()));
            }
            id = self.materialize(id, at)?;
            at = 0;
        }
    }

    /// Smallest key under `id`.
    pub(super) fn least_key(&mut self, mut id: NodeId) -> Result<Vec<u8>> {
        while !self.arena[id].is_leaf() {
            id = self.materialize(id, 0)?;
        }
        self.arena[id]
            .keys
            .first()
            .cloned()
            .ok_or_else(|| Error::structural("no key found"))
    }
}
