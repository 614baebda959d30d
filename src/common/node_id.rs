//! Node handle type.

use std::fmt;

/// Identifies a materialized node in the tree's node arena.
///
/// Using `usize` because:
/// 1. Nodes are stored in a `Vec<Option<Node>>` slot arena
/// 2. Direct indexing without casting: `slots[node_id.0]`
///
/// A `NodeId` is only meaningful while the node is resident. Slots are
/// reused after eviction, so a handle must not be held across an operation
/// that can evict (every public tree operation ends with a footprint check).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(pub usize);

impl NodeId {
    /// Create a new NodeId.
    #[inline]
    pub fn new(id: usize) -> Self {
        NodeId(id)
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Node({})", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_id_equality() {
        assert_eq!(NodeId::new(5), NodeId::new(5));
        assert_ne!(NodeId::new(5), NodeId::new(6));
    }

    #[test]
    fn test_node_id_display() {
        assert_eq!(format!("{}", NodeId::new(42)), "Node(42)");
    }
}
