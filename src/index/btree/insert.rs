//! Insertion and node splitting.

use tracing::debug;

use super::node::{ChildRef, Node, NodeBody};
use super::tree::BPlusTree;
use crate::common::{NodeId, Result};
use crate::storage::BlockStore;

/// Result of inserting into a subtree.
pub(super) struct Inserted {
    /// New smallest key of the subtree, if it changed.
    pub least: Option<Vec<u8>>,
    /// Right sibling split off the subtree root, with its smallest key.
    pub split: Option<(Vec<u8>, NodeId)>,
}

impl<S: BlockStore> BPlusTree<S> {
    /// Insert into the tree, growing a root if there is none and a new level
    /// if the root splits.
    pub(super) fn insert(&mut self, key: &[u8], value: i64) -> Result<()> {
        let mut root_init = false;
        let root = match self.root {
            Some(root) => root,
            None => {
                root_init = true;
                let root = self.arena.insert(Node::new_leaf());
                self.root = Some(root);
                root
            }
        };

        let inserted = self.insert_into(root, key, value)?;
        if let Some((split_key, right)) = inserted.split {
            root_init = true;
            self.binary_root(root, split_key, right)?;
        }
        if root_init {
            if let Some(root) = self.root {
                self.root_block = self.dump_to_fresh_block(root)?;
            }
        }
        Ok(())
    }

    fn insert_into(&mut self, id: NodeId, key: &[u8], value: i64) -> Result<Inserted> {
        if self.arena[id].is_leaf() {
            self.insert_leaf(id, key, value)
        } else {
            self.insert_internal(id, key, value)
        }
    }

    fn insert_leaf(&mut self, id: NodeId, key: &[u8], value: i64) -> Result<Inserted> {
        self.soil(id);
        let order = self.config.order;
        let pos = self.arena[id].find_position(key, false, self.comparator.as_ref());
        let least = (pos == 0).then(|| key.to_vec());

        let node = &mut self.arena[id];
        let exists = node
            .keys
            .get(pos)
            .is_some_and(|k| self.comparator.compare(k, key).is_eq());
        if exists {
            node.keys[pos] = key.to_vec();
            node.values_mut()?[pos] = value;
            return Ok(Inserted { least, split: None });
        }

        node.keys.insert(pos, key.to_vec());
        node.values_mut()?.insert(pos, value);
        if node.len() <= order {
            return Ok(Inserted { least, split: None });
        }

        // Overfull by one: the left half keeps the first (order + 1) / 2.
        let split_at = (order + 1) / 2;
        let right_keys = node.keys.split_off(split_at);
        let right_values = node.values_mut()?.split_off(split_at);
        let split_key = right_keys[0].clone();

        let mut right = Node::new_leaf();
        right.keys = right_keys;
        right.body = NodeBody::Leaf {
            values: right_values,
        };
        let right = self.arena.insert(right);

        // Written now so the parent can record a real address.
        self.dump_to_fresh_block(right)?;
        self.arena[right].dirty = true;
        self.record_terminal(right);
        debug!(right = %self.arena[right].block, "split leaf");

        Ok(Inserted {
            least,
            split: Some((split_key, right)),
        })
    }

    fn insert_internal(&mut self, id: NodeId, key: &[u8], value: i64) -> Result<Inserted> {
        let order = self.config.order;
        let pos = self.arena[id].find_position(key, false, self.comparator.as_ref());
        let child = self.materialize(id, pos)?;
        let inserted = self.insert_into(child, key, value)?;

        if pos > 0 {
            if let Some(least) = &inserted.least {
                self.arena[id].keys[pos - 1] = least.clone();
            }
        }

        let mut split = None;
        if let Some((child_key, child_split)) = inserted.split {
            self.soil(id);
            let block = self.arena[child_split].block;
            let node = &mut self.arena[id];
            node.keys.insert(pos, child_key);
            node.children_mut()?.insert(
                pos + 1,
                ChildRef {
                    block,
                    node: Some(child_split),
                },
            );

            if node.len() > order {
                split = Some(self.split_internal(id)?);
            }
            self.reparent_children(id)?;
        }

        Ok(Inserted {
            least: if pos == 0 { inserted.least } else { None },
            split,
        })
    }

    /// Split an internal node holding `order + 1` keys. The middle key moves
    /// up and is returned with the new right sibling.
    fn split_internal(&mut self, id: NodeId) -> Result<(Vec<u8>, NodeId)> {
        let split_at = (self.config.order + 2) / 2 - 1;
        let node = &mut self.arena[id];
        let right_keys = node.keys.split_off(split_at + 1);
        let split_key = node.keys.pop().unwrap_or_default();
        let right_children = node.children_mut()?.split_off(split_at + 1);

        let right = self.arena.insert(Node::new_internal(right_keys, right_children));
        self.reparent_children(right)?;
        self.dump_to_fresh_block(right)?;
        self.arena[right].dirty = true;
        self.check_terminal(right);
        self.check_terminal(id);

        debug!(
            left = %self.arena[id].block,
            right = %self.arena[right].block,
            "split internal node"
        );
        Ok((split_key, right))
    }

    /// Replace the root with a new internal node over `left` and `right`.
    fn binary_root(&mut self, left: NodeId, key: Vec<u8>, right: NodeId) -> Result<()> {
        let children = vec![
            ChildRef {
                block: self.arena[left].block,
                node: Some(left),
            },
            ChildRef {
                block: self.arena[right].block,
                node: Some(right),
            },
        ];
        let root = self.arena.insert(Node::new_internal(vec![key], children));
        self.root = Some(root);
        self.reparent_children(root)?;
        // The old root was exempt from eviction; as a child it no longer is.
        self.check_terminal(left);
        self.check_terminal(right);
        debug!("tree grew a level");
        Ok(())
    }
}
