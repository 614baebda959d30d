//! Node and free-block serialization.
//!
//! # Node block layout
//! ```text
//! ┌─────┬────────┬─────────────────────────────┬─────┬─────────────────────────────┐
//! │ tag │ slot 0 │ len 0 │ key 0 (padded) │ slot 1 │ ... │ len n-1 │ key n-1 │ slot n │
//! │ 1B  │  8B    │  2B   │ max_key_length │  8B    │     │                            │
//! └─────┴────────┴─────────────────────────────┴─────┴─────────────────────────────┘
//! ```
//! There are always `order` key entries. An absent key has length `-1` and
//! is followed only by absent keys. Leaf slot `j` is the value of key `j`;
//! internal slot `j` is the block of child `j`. Absent slots hold `-1`.
//!
//! # Free block layout
//! `TAG_FREE` followed by the next free block (`-1` at the end of the list).
//! Only these 9 bytes are written; the rest of a freed block is stale.

use super::node::{ChildRef, NodeBody};
use crate::common::config::TreeConfig;
use crate::common::{BlockId, Error, Result};

pub(crate) const TAG_INTERNAL: u8 = 0;
pub(crate) const TAG_LEAF: u8 = 1;
pub(crate) const TAG_FREE: u8 = 2;

/// Bytes written when a block is put on the free list.
pub(crate) const FREE_BLOCK_SIZE: usize = 1 + 8;

const ABSENT_KEY: i16 = -1;
const ABSENT_SLOT: i64 = -1;

/// Fixed geometry of node blocks for one tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct NodeLayout {
    pub order: usize,
    pub key_width: usize,
}

impl NodeLayout {
    pub fn new(config: &TreeConfig) -> Self {
        Self {
            order: config.order,
            key_width: config.max_key_length,
        }
    }

    #[inline]
    pub fn block_size(&self) -> usize {
        1 + 8 + self.order * self.entry_size()
    }

    #[inline]
    fn entry_size(&self) -> usize {
        2 + self.key_width + 8
    }

    #[inline]
    fn entry_offset(&self, i: usize) -> usize {
        1 + 8 + i * self.entry_size()
    }

    /// Serialize a node into `buf`, which must be exactly one block.
    pub fn encode(&self, keys: &[Vec<u8>], body: &NodeBody, buf: &mut [u8]) -> Result<()> {
        if buf.len() != self.block_size() {
            return Err(Error::structural(format!(
                "bad buffer size {} should be {}",
                buf.len(),
                self.block_size()
            )));
        }
        if keys.len() > self.order {
            return Err(Error::structural(format!(
                "{} keys do not fit a node of order {}",
                keys.len(),
                self.order
            )));
        }

        let slot = |j: usize| -> i64 {
            match body {
                NodeBody::Leaf { values } => values.get(j).copied().unwrap_or(ABSENT_SLOT),
                NodeBody::Internal { children } => children
                    .get(j)
                    .map(|c| c.block.0 as i64)
                    .unwrap_or(ABSENT_SLOT),
            }
        };

        match body {
            NodeBody::Leaf { values } if values.len() != keys.len() => {
                return Err(Error::structural(format!(
                    "leaf has {} keys but {} values",
                    keys.len(),
                    values.len()
                )));
            }
            NodeBody::Internal { children } if children.len() != keys.len() + 1 => {
                return Err(Error::structural(format!(
                    "internal node has {} keys but {} children",
                    keys.len(),
                    children.len()
                )));
            }
            _ => {}
        }

        buf[0] = if matches!(body, NodeBody::Leaf { .. }) {
            TAG_LEAF
        } else {
            TAG_INTERNAL
        };
        buf[1..9].copy_from_slice(&slot(0).to_le_bytes());

        for i in 0..self.order {
            let at = self.entry_offset(i);
            let payload = &mut buf[at + 2..at + 2 + self.key_width];
            match keys.get(i) {
                Some(key) => {
                    if key.len() > self.key_width {
                        return Err(Error::KeyTooLarge {
                            len: key.len(),
                            max: self.key_width,
                        });
                    }
                    payload[..key.len()].copy_from_slice(key);
                    payload[key.len()..].fill(0);
                    buf[at..at + 2].copy_from_slice(&(key.len() as i16).to_le_bytes());
                }
                None => {
                    payload.fill(0);
                    buf[at..at + 2].copy_from_slice(&ABSENT_KEY.to_le_bytes());
                }
            }
            let s = at + 2 + self.key_width;
            buf[s..s + 8].copy_from_slice(&slot(i + 1).to_le_bytes());
        }
        Ok(())
    }

    /// Parse one block into keys and body.
    pub fn decode(&self, buf: &[u8]) -> Result<(Vec<Vec<u8>>, NodeBody)> {
        if buf.len() != self.block_size() {
            return Err(Error::structural(format!(
                "bad buffer size {} should be {}",
                buf.len(),
                self.block_size()
            )));
        }
        let is_leaf = match buf[0] {
            TAG_LEAF => true,
            TAG_INTERNAL => false,
            TAG_FREE => return Err(Error::structural("block is on the free list")),
            other => {
                return Err(Error::structural(format!(
                    "bad indicator {}, not leaf or internal",
                    other
                )))
            }
        };

        let mut keys = Vec::new();
        let mut slots = vec![read_i64(buf, 1)];
        let mut ended = false;
        for i in 0..self.order {
            let at = self.entry_offset(i);
            let len = i16::from_le_bytes([buf[at], buf[at + 1]]);
            if len < ABSENT_KEY || len as i64 > self.key_width as i64 {
                return Err(Error::structural(format!(
                    "invalid key length {} in entry {}",
                    len, i
                )));
            }
            let slot = read_i64(buf, at + 2 + self.key_width);

            if len == ABSENT_KEY {
                ended = true;
                if !is_leaf && slot != ABSENT_SLOT {
                    return Err(Error::structural(format!(
                        "absent key followed by child address in entry {}",
                        i
                    )));
                }
                continue;
            }
            if ended {
                return Err(Error::structural(format!(
                    "absent key followed by present key in entry {}",
                    i
                )));
            }
            if !is_leaf && slot == ABSENT_SLOT {
                return Err(Error::structural(format!(
                    "key not followed by child address in entry {}",
                    i
                )));
            }
            let len = len as usize;
            keys.push(buf[at + 2..at + 2 + len].to_vec());
            slots.push(slot);
        }

        let body = if is_leaf {
            slots.truncate(keys.len());
            NodeBody::Leaf { values: slots }
        } else {
            NodeBody::Internal {
                children: slots
                    .into_iter()
                    .map(|s| ChildRef::on_disk(BlockId(s as u64)))
                    .collect(),
            }
        };
        Ok((keys, body))
    }
}

/// Contents written to a block when it joins the free list.
pub(crate) fn encode_free(next: BlockId) -> [u8; FREE_BLOCK_SIZE] {
    let mut out = [0u8; FREE_BLOCK_SIZE];
    out[0] = TAG_FREE;
    out[1..].copy_from_slice(&next.to_le_bytes());
    out
}

/// The free-list link in `buf`, or `None` if the block is not tagged free.
pub(crate) fn decode_free(buf: &[u8]) -> Option<BlockId> {
    if buf.len() < FREE_BLOCK_SIZE || buf[0] != TAG_FREE {
        return None;
    }
    let mut raw = [0u8; 8];
    raw.copy_from_slice(&buf[1..FREE_BLOCK_SIZE]);
    Some(BlockId::from_le_bytes(raw))
}

fn read_i64(buf: &[u8], at: usize) -> i64 {
    let mut raw = [0u8; 8];
    raw.copy_from_slice(&buf[at..at + 8]);
    i64::from_le_bytes(raw)
}
