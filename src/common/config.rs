//! Configuration constants and tree settings.

use super::{Error, Result};

/// Default maximum number of keys per node.
pub const DEFAULT_ORDER: usize = 32;

/// Smallest supported order.
///
/// Orders 2 and 3 are legal and exercise the empty-leaf delete path.
pub const MIN_ORDER: usize = 2;

/// Smallest supported key payload width in bytes.
pub const MIN_KEY_LENGTH: usize = 3;

/// Largest key payload width: the length prefix is a signed 16-bit integer.
pub const MAX_KEY_LENGTH: usize = i16::MAX as usize;

/// Default cap on resident terminal nodes.
pub const DEFAULT_FOOTPRINT_LIMIT: usize = 100;

/// Smallest accepted footprint limit.
pub const MIN_FOOTPRINT_LIMIT: usize = 5;

/// Whether a handle may mutate the store.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum OpenMode {
    #[default]
    ReadWrite,
    /// All mutating operations fail with [`Error::ReadOnly`].
    ReadOnly,
}

/// Shape of a tree: fixed when the store is created and persisted in its
/// header. The footprint limit is a per-handle runtime setting.
///
/// # Example
/// ```
/// use shadowtree::TreeConfig;
///
/// let config = TreeConfig::new(20).with_order(6);
/// assert!(config.validate().is_ok());
/// // tag + first slot + 6 × (length prefix + payload + slot)
/// assert_eq!(config.block_size(), 1 + 8 + 6 * (2 + 20 + 8));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TreeConfig {
    /// Maximum number of keys per node.
    pub order: usize,
    /// Maximum key length in bytes.
    pub max_key_length: usize,
    /// Maximum number of resident terminal nodes before eviction.
    pub footprint_limit: usize,
}

impl TreeConfig {
    /// Create a config for keys of at most `max_key_length` bytes with the
    /// default order and footprint limit.
    pub fn new(max_key_length: usize) -> Self {
        Self {
            order: DEFAULT_ORDER,
            max_key_length,
            footprint_limit: DEFAULT_FOOTPRINT_LIMIT,
        }
    }

    pub fn with_order(mut self, order: usize) -> Self {
        self.order = order;
        self
    }

    pub fn with_footprint_limit(mut self, limit: usize) -> Self {
        self.footprint_limit = limit;
        self
    }

    /// Size in bytes of one node block.
    ///
    /// Layout: tag byte, one slot, then `order` repetitions of
    /// {2-byte key length, key payload, 8-byte slot}.
    pub fn block_size(&self) -> usize {
        1 + 8 + self.order * (2 + self.max_key_length + 8)
    }

    /// Check all values are in range.
    pub fn validate(&self) -> Result<()> {
        if self.order < MIN_ORDER || self.order > i32::MAX as usize {
            return Err(Error::InvalidConfig(format!(
                "order must be at least {}, got {}",
                MIN_ORDER, self.order
            )));
        }
        if self.max_key_length < MIN_KEY_LENGTH || self.max_key_length > MAX_KEY_LENGTH {
            return Err(Error::InvalidConfig(format!(
                "max key length must be in {}..={}, got {}",
                MIN_KEY_LENGTH, MAX_KEY_LENGTH, self.max_key_length
            )));
        }
        check_footprint_limit(self.footprint_limit)
    }
}

pub(crate) fn check_footprint_limit(limit: usize) -> Result<()> {
    if limit < MIN_FOOTPRINT_LIMIT {
        return Err(Error::InvalidConfig(format!(
            "footprint limit must be at least {}, got {}",
            MIN_FOOTPRINT_LIMIT, limit
        )));
    }
    Ok(())
}
