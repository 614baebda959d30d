//! Deletion, merging, and redistribution.

use tracing::debug;

use super::node::NodeBody;
use super::tree::BPlusTree;
use crate::common::{Error, NodeId, Result};
use crate::storage::BlockStore;

/// Result of deleting from a subtree.
struct Removed {
    /// New smallest key of the subtree, if it changed. An emptied leaf
    /// reports the deleted key itself.
    least: Option<Vec<u8>>,
    /// The subtree root fell below minimum occupancy.
    merge_me: bool,
}

/// Outcome of rebalancing two adjacent siblings.
struct Merged {
    /// Everything moved into the left node; the right one is now empty.
    delete_right: bool,
    /// New smallest key of the right node after a redistribution.
    right_least: Option<Vec<u8>>,
}

impl<S: BlockStore> BPlusTree<S> {
    /// Delete `key`, collapsing the root if it is left with a single child.
    pub(super) fn remove(&mut self, key: &[u8]) -> Result<()> {
        let Some(root) = self.root else {
            return Err(Error::key_missing(key));
        };
        let removed = self.delete_from(root, key)?;

        let root_node = &self.arena[root];
        if removed.merge_me && !root_node.is_leaf() && root_node.len() == 0 {
            let new_root = self.materialize(root, 0)?;
            let block = self.arena[new_root].block;
            if !block.is_valid() {
                return Err(Error::structural("only child of the root was never written"));
            }
            self.arena[new_root].parent = None;
            self.root = Some(new_root);
            self.root_block = block;
            self.terminals.forget(new_root);
            self.discard_node(root)?;
            debug!(root = %block, "tree lost a level");
        }
        Ok(())
    }

    fn delete_from(&mut self, id: NodeId, key: &[u8]) -> Result<Removed> {
        if self.arena[id].is_leaf() {
            self.delete_leaf(id, key)
        } else {
            self.delete_internal(id, key)
        }
    }

    fn delete_leaf(&mut self, id: NodeId, key: &[u8]) -> Result<Removed> {
        let pos = self.arena[id].find_position(key, false, self.comparator.as_ref());
        let found = self.arena[id]
            .keys
            .get(pos)
            .is_some_and(|k| self.comparator.compare(k, key).is_eq());
        if !found {
            return Err(Error::key_missing(key));
        }

        self.soil(id);
        let min = self.config.order / 2;
        let node = &mut self.arena[id];
        node.keys.remove(pos);
        node.values_mut()?.remove(pos);

        let least = (pos == 0).then(|| node.keys.first().cloned().unwrap_or_else(|| key.to_vec()));
        Ok(Removed {
            least,
            merge_me: node.len() < min,
        })
    }

    fn delete_internal(&mut self, id: NodeId, key: &[u8]) -> Result<Removed> {
        let order = self.config.order;
        let pos = self.arena[id].find_position(key, false, self.comparator.as_ref());
        let child = self.materialize(id, pos)?;
        let removed = self.delete_from(child, key)?;
        self.soil(id);

        if removed.least.as_deref() == Some(key) {
            return self.drop_empty_child(id, child, pos, key);
        }

        let mut least = None;
        if pos == 0 {
            least = removed.least;
        } else if let Some(child_least) = removed.least {
            self.arena[id].keys[pos - 1] = child_least;
        }

        if !removed.merge_me {
            return Ok(Removed {
                least,
                merge_me: false,
            });
        }
        if self.arena[id].children().len() < 2 {
            return Ok(Removed { least, merge_me: true });
        }

        let (left_index, right_index) = if pos == 0 { (0, 1) } else { (pos - 1, pos) };
        let left = self.materialize(id, left_index)?;
        let right = self.materialize(id, right_index)?;
        let key_between = self.arena[id].keys[left_index].clone();

        let merged = self.merge_nodes(left, key_between, right)?;
        if merged.delete_right {
            let node = &mut self.arena[id];
            node.keys.remove(right_index - 1);
            node.children_mut()?.remove(right_index);
            self.reparent_children(id)?;
            self.discard_node(right)?;
        } else if let Some(right_least) = merged.right_least {
            self.arena[id].keys[right_index - 1] = right_least;
        }

        Ok(Removed {
            least,
            merge_me: self.arena[id].len() < order / 2,
        })
    }

    /// Remove child `pos` of `id`, a leaf emptied by the last deletion.
    ///
    /// Leaves only run empty when the order is at most 3.
    fn drop_empty_child(&mut self, id: NodeId, child: NodeId, pos: usize, key: &[u8]) -> Result<Removed> {
        let order = self.config.order;
        if order > 3 {
            return Err(Error::structural(format!(
                "leaf emptied in a tree of order {}",
                order
            )));
        }

        let node = &mut self.arena[id];
        let mut least = None;
        if pos == 0 {
            if node.keys.is_empty() {
                return Err(Error::structural("internal node with a single empty leaf"));
            }
            least = Some(node.keys.remove(0));
            node.children_mut()?.remove(0);
        } else {
            node.keys.remove(pos - 1);
            node.children_mut()?.remove(pos);
        }

        self.discard_node(child)?;
        self.reparent_children(id)?;
        if least.as_deref() == Some(key) {
            least = Some(self.least_key(id)?);
        }
        Ok(Removed {
            least,
            merge_me: self.arena[id].len() < order / 2,
        })
    }

    /// Rebalance two adjacent siblings separated by `key_between`.
    ///
    /// If everything fits one node it all moves left; otherwise the entries
    /// are split evenly between the two.
    fn merge_nodes(&mut self, left: NodeId, key_between: Vec<u8>, right: NodeId) -> Result<Merged> {
        match (self.arena[left].is_leaf(), self.arena[right].is_leaf()) {
            (true, true) => self.merge_leaves(left, right),
            (false, false) => self.merge_internals(left, key_between, right),
            _ => Err(Error::structural(format!(
                "cannot merge a leaf with an internal node ({} and {})",
                self.arena[left].block, self.arena[right].block
            ))),
        }
    }

    fn merge_leaves(&mut self, left: NodeId, right: NodeId) -> Result<Merged> {
        let order = self.config.order;
        let mut keys = std::mem::take(&mut self.arena[left].keys);
        keys.append(&mut self.arena[right].keys);
        let mut values = std::mem::take(self.arena[left].values_mut()?);
        values.append(self.arena[right].values_mut()?);
        let total = keys.len();

        if total <= order {
            let node = &mut self.arena[left];
            node.keys = keys;
            node.body = NodeBody::Leaf { values };
            self.soil(left);
            return Ok(Merged {
                delete_right: true,
                right_least: None,
            });
        }

        let at = total - total / 2;
        let right_keys = keys.split_off(at);
        let right_values = values.split_off(at);
        let right_least = right_keys.first().cloned();

        let node = &mut self.arena[left];
        node.keys = keys;
        node.body = NodeBody::Leaf { values };
        let node = &mut self.arena[right];
        node.keys = right_keys;
        node.body = NodeBody::Leaf {
            values: right_values,
        };
        self.soil(left);
        self.soil(right);
        Ok(Merged {
            delete_right: false,
            right_least,
        })
    }

    fn merge_internals(&mut self, left: NodeId, key_between: Vec<u8>, right: NodeId) -> Result<Merged> {
        let order = self.config.order;
        if !self.arena[right]
            .children()
            .first()
            .is_some_and(|c| c.block.is_valid())
        {
            return Err(Error::structural(format!(
                "first child of internal node at {} is missing",
                self.arena[right].block
            )));
        }

        let mut keys = std::mem::take(&mut self.arena[left].keys);
        keys.push(key_between);
        keys.append(&mut self.arena[right].keys);
        let mut children = std::mem::take(self.arena[left].children_mut()?);
        children.append(self.arena[right].children_mut()?);
        let index = keys.len();

        if index <= order {
            let node = &mut self.arena[left];
            node.keys = keys;
            node.body = NodeBody::Internal { children };
            self.reparent_children(left)?;
            self.soil(left);
            return Ok(Merged {
                delete_right: true,
                right_least: None,
            });
        }

        let lc = index / 2;
        let right_children = children.split_off(lc + 1);
        let right_keys = keys.split_off(lc + 1);
        let right_least = keys.pop();

        let node = &mut self.arena[left];
        node.keys = keys;
        node.body = NodeBody::Internal { children };
        let node = &mut self.arena[right];
        node.keys = right_keys;
        node.body = NodeBody::Internal {
            children: right_children,
        };
        self.reparent_children(left)?;
        self.reparent_children(right)?;
        self.soil(left);
        self.soil(right);
        Ok(Merged {
            delete_right: false,
            right_least,
        })
    }
}

#[cfg(test)]
mod tests {
    use crate::common::config::TreeConfig;
    use crate::index::btree::BPlusTree;
    use crate::storage::MemoryMedium;

    #[test]
    fn test_emptied_leaf_collapses_root() {
        let config = TreeConfig::new(4).with_order(2);
        let mut tree = BPlusTree::create_on(MemoryMedium::new(), config).unwrap();
        for (i, k) in ["a", "b", "c"].into_iter().enumerate() {
            tree.set(k, i as i64).unwrap();
        }
        tree.commit().unwrap();

        tree.remove_key("b").unwrap();
        let root = tree.root.unwrap();
        assert_eq!(tree.arena[root].keys, vec![b"c".to_vec()]);

        tree.remove_key("c").unwrap();
        let root = tree.root.unwrap();
        assert!(tree.arena[root].is_leaf());
        assert_eq!(tree.arena[root].keys, vec![b"a".to_vec()]);
        assert_eq!(tree.arena[root].parent, None);

        tree.commit().unwrap();
        assert_eq!(tree.get("a").unwrap(), 0);
        assert!(tree.recover(false).unwrap().is_empty());
    }

    #[test]
    fn test_underfull_leaf_borrows_from_sibling() {
        let config = TreeConfig::new(4).with_order(4);
        let mut tree = BPlusTree::create_on(MemoryMedium::new(), config).unwrap();
        // Leaves [a b] [c d e] after the split.
        for k in ["a", "b", "c", "d", "e"] {
            tree.set(k, 0).unwrap();
        }
        tree.set("f", 0).unwrap();
        tree.remove_key("a").unwrap();

        // [b] + [c d e f] holds five keys: redistributed to [b c d] [e f].
        let root = tree.root.unwrap();
        assert_eq!(tree.arena[root].children().len(), 2);
        assert_eq!(tree.arena[root].keys, vec![b"e".to_vec()]);
        tree.commit().unwrap();
        assert!(tree.recover(false).unwrap().is_empty());
    }

    #[test]
    fn test_underfull_leaf_merges_into_sibling() {
        let config = TreeConfig::new(4).with_order(4);
        let mut tree = BPlusTree::create_on(MemoryMedium::new(), config).unwrap();
        for k in ["a", "b", "c", "d", "e"] {
            tree.set(k, 0).unwrap();
        }
        tree.remove_key("e").unwrap();
        tree.remove_key("a").unwrap();

        // [b] + [c d] fits one leaf, which becomes the root.
        let root = tree.root.unwrap();
        assert!(tree.arena[root].is_leaf());
        assert_eq!(tree.arena[root].len(), 3);
        tree.commit().unwrap();
        assert!(tree.recover(false).unwrap().is_empty());
    }
}
