//! In-memory form of a tree node.

use super::compare::KeyComparator;
use crate::common::{BlockId, Error, NodeId, Result};

/// A child slot of an internal node.
///
/// `block` is always authoritative on disk. `node` is set while the child is
/// materialized in the arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct ChildRef {
    pub block: BlockId,
    pub node: Option<NodeId>,
}

impl ChildRef {
    pub fn on_disk(block: BlockId) -> Self {
        Self { block, node: None }
    }
}

/// What hangs off the keys.
///
/// - `Leaf`: one value per key
/// - `Internal`: one more child than keys; `children[i + 1]` holds the keys
///   `>= keys[i]`
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum NodeBody {
    Leaf { values: Vec<i64> },
    Internal { children: Vec<ChildRef> },
}

/// A materialized node.
///
/// Keys are packed and strictly increasing. A node may briefly hold
/// `order + 1` keys while it is being split.
#[derive(Debug)]
pub(crate) struct Node {
    pub keys: Vec<Vec<u8>>,
    pub body: NodeBody,
    /// Must be written to a fresh block before the next commit.
    pub dirty: bool,
    /// Where the node was last written, `BlockId::NONE` if never.
    pub block: BlockId,
    /// Back-reference used for soiling and address updates only.
    pub parent: Option<(NodeId, usize)>,
}

impl Node {
    pub fn new_leaf() -> Self {
        Self {
            keys: Vec::new(),
            body: NodeBody::Leaf { values: Vec::new() },
            dirty: true,
            block: BlockId::NONE,
            parent: None,
        }
    }

    pub fn new_internal(keys: Vec<Vec<u8>>, children: Vec<ChildRef>) -> Self {
        Self {
            keys,
            body: NodeBody::Internal { children },
            dirty: true,
            block: BlockId::NONE,
            parent: None,
        }
    }

    /// A node decoded from `block`.
    pub fn loaded(
        keys: Vec<Vec<u8>>,
        body: NodeBody,
        block: BlockId,
        parent: Option<(NodeId, usize)>,
    ) -> Self {
        Self {
            keys,
            body,
            dirty: false,
            block,
            parent,
        }
    }

    #[inline]
    pub fn is_leaf(&self) -> bool {
        matches!(self.body, NodeBody::Leaf { .. })
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    /// Child slots; empty for a leaf.
    pub fn children(&self) -> &[ChildRef] {
        match &self.body {
            NodeBody::Internal { children } => children,
            NodeBody::Leaf { .. } => &[],
        }
    }

    pub fn children_mut(&mut self) -> Result<&mut Vec<ChildRef>> {
        match &mut self.body {
            NodeBody::Internal { children } => Ok(children),
            NodeBody::Leaf { .. } => Err(Error::structural(format!(
                "leaf at {} has no children",
                self.block
            ))),
        }
    }

    pub fn values_mut(&mut self) -> Result<&mut Vec<i64>> {
        match &mut self.body {
            NodeBody::Leaf { values } => Ok(values),
            NodeBody::Internal { .. } => Err(Error::structural(format!(
                "internal node at {} has no values",
                self.block
            ))),
        }
    }

    /// Value of key `i` in a leaf.
    pub fn value_at(&self, i: usize) -> Option<i64> {
        match &self.body {
            NodeBody::Leaf { values } => values.get(i).copied(),
            NodeBody::Internal { .. } => None,
        }
    }

    /// Materialized children with their slot index.
    pub fn resident_children(&self) -> Vec<(usize, NodeId)> {
        self.children()
            .iter()
            .enumerate()
            .filter_map(|(i, c)| c.node.map(|n| (i, n)))
            .collect()
    }

    pub fn has_resident_children(&self) -> bool {
        self.children().iter().any(|c| c.node.is_some())
    }

    /// Position of `key` in this node.
    ///
    /// Leaves return the first key `>= key` unless `past` is set. Internal
    /// nodes, and leaves with `past`, return the first key `> key`. An
    /// internal result is the child to descend into.
    pub fn find_position(&self, key: &[u8], past: bool, cmp: &dyn KeyComparator) -> usize {
        let strict = past || !self.is_leaf();
        self.keys.partition_point(|k| match cmp.compare(k, key) {
            std::cmp::Ordering::Less => true,
            std::cmp::Ordering::Equal => strict,
            std::cmp::Ordering::Greater => false,
        })
    }
}
