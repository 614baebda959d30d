//! Terminal node registry.
//!
//! A terminal node is a materialized node with no materialized children.
//! Those are the only nodes that can be dropped from memory without first
//! dropping something else, so they are the eviction candidates. The
//! registry hands them out oldest first.

use std::collections::{HashMap, VecDeque};

use crate::common::NodeId;

/// FIFO registry of terminal nodes.
///
/// Each registration gets a fresh sequence number. Forgetting is lazy: the
/// queue entry stays behind and is skipped when it reaches the front,
/// because its sequence no longer matches the membership map. Arena slots
/// are reused, so a stale entry for a recycled `NodeId` is told apart by its
/// sequence number.
#[derive(Debug, Default)]
pub struct TerminalRegistry {
    /// (sequence, node) in registration order (front = oldest).
    queue: VecDeque<(u64, NodeId)>,

    /// Live registrations and their sequence numbers.
    members: HashMap<NodeId, u64>,

    next_seq: u64,
}

impl TerminalRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a node as terminal. Re-registering keeps its original place.
    pub fn record(&mut self, node: NodeId) {
        if self.members.contains_key(&node) {
            return;
        }
        let seq = self.next_seq;
        self.next_seq += 1;
        self.queue.push_back((seq, node));
        self.members.insert(node, seq);
    }

    /// Unregister a node. Unknown nodes are ignored.
    pub fn forget(&mut self, node: NodeId) {
        self.members.remove(&node);
        // Drop stale entries at the front eagerly so the queue stays short
        // when registrations churn.
        while let Some(&(seq, front)) = self.queue.front() {
            if self.members.get(&front) == Some(&seq) {
                break;
            }
            self.queue.pop_front();
        }
    }

    /// Remove and return the oldest registered node.
    pub fn pop_oldest(&mut self) -> Option<NodeId> {
        while let Some((seq, node)) = self.queue.pop_front() {
            if self.members.get(&node) == Some(&seq) {
                self.members.remove(&node);
                return Some(node);
            }
        }
        None
    }

    pub fn contains(&self, node: NodeId) -> bool {
        self.members.contains_key(&node)
    }

    /// Number of registered nodes.
    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn clear(&mut self) {
        self.queue.clear();
        self.members.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_fifo_order() {
        let mut registry = TerminalRegistry::new();
        registry.record(NodeId::new(0));
        registry.record(NodeId::new(1));
        registry.record(NodeId::new(2));
        assert_eq!(registry.len(), 3);

        assert_eq!(registry.pop_oldest(), Some(NodeId::new(0)));
        assert_eq!(registry.pop_oldest(), Some(NodeId::new(1)));
        assert_eq!(registry.pop_oldest(), Some(NodeId::new(2)));
        assert_eq!(registry.pop_oldest(), None);
        assert!(registry.is_empty());
    }

    #[test]
    fn test_registry_forget_skips_node() {
        let mut registry = TerminalRegistry::new();
        registry.record(NodeId::new(0));
        registry.record(NodeId::new(1));

        registry.forget(NodeId::new(0));
        assert!(!registry.contains(NodeId::new(0)));
        assert_eq!(registry.pop_oldest(), Some(NodeId::new(1)));
    }

    #[test]
    fn test_registry_rerecord_keeps_position() {
        let mut registry = TerminalRegistry::new();
        registry.record(NodeId::new(0));
        registry.record(NodeId::new(1));
        registry.record(NodeId::new(0));

        assert_eq!(registry.len(), 2);
        assert_eq!(registry.pop_oldest(), Some(NodeId::new(0)));
    }

    #[test]
    fn test_registry_forget_then_record_moves_to_back() {
        let mut registry = TerminalRegistry::new();
        registry.record(NodeId::new(0));
        registry.record(NodeId::new(1));
        registry.forget(NodeId::new(0));
        registry.record(NodeId::new(0));

        assert_eq!(registry.pop_oldest(), Some(NodeId::new(1)));
        assert_eq!(registry.pop_oldest(), Some(NodeId::new(0)));
        assert_eq!(registry.pop_oldest(), None);
    }

    #[test]
    fn test_registry_forget_unknown_is_noop() {
        let mut registry = TerminalRegistry::new();
        registry.forget(NodeId::new(9));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_registry_clear() {
        let mut registry = TerminalRegistry::new();
        registry.record(NodeId::new(3));
        registry.clear();
        assert_eq!(registry.pop_oldest(), None);
    }
}
