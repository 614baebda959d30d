//! Slot arena owning every materialized node.

use std::ops::{Index, IndexMut};

use super::node::Node;
use crate::common::NodeId;

/// Owns all resident nodes. Nodes refer to each other by [`NodeId`] only.
///
/// Freed slots are reused, most recently freed first.
#[derive(Debug, Default)]
pub(crate) struct NodeArena {
    slots: Vec<Option<Node>>,
    vacant: Vec<usize>,
}

impl NodeArena {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, node: Node) -> NodeId {
        match self.vacant.pop() {
            Some(slot) => {
                self.slots[slot] = Some(node);
                NodeId::new(slot)
            }
            None => {
                self.slots.push(Some(node));
                NodeId::new(self.slots.len() - 1)
            }
        }
    }

    pub fn remove(&mut self, id: NodeId) -> Option<Node> {
        let node = self.slots.get_mut(id.0)?.take()?;
        self.vacant.push(id.0);
        Some(node)
    }

    pub fn get(&self, id: NodeId) -> Option<&Node> {
        self.slots.get(id.0)?.as_ref()
    }

    /// Number of resident nodes.
    pub fn len(&self) -> usize {
        self.slots.len() - self.vacant.len()
    }

    pub fn clear(&mut self) {
        self.slots.clear();
        self.vacant.clear();
    }
}

/// # Panics
/// Panics on a handle whose node was removed, like indexing a slice out of
/// bounds. Handles never outlive the operation that produced them.
impl Index<NodeId> for NodeArena {
    type Output = Node;

    fn index(&self, id: NodeId) -> &Node {
        match self.slots.get(id.0) {
            Some(Some(node)) => node,
            _ => panic!("dangling node handle {}", id),
        }
    }
}

impl IndexMut<NodeId> for NodeArena {
    fn index_mut(&mut self, id: NodeId) -> &mut Node {
        match self.slots.get_mut(id.0) {
            Some(Some(node)) => node,
            _ => panic!("dangling node handle {}", id),
        }
    }
}
