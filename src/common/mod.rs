//! Common types and utilities shared across shadowtree.
//!
//! This module contains fundamental primitives used throughout the codebase:
//! - Configuration constants and [`TreeConfig`](config::TreeConfig)
//! - Error types
//! - Identifiers (BlockId, NodeId)

mod block_id;
pub mod config;
pub mod error;
mod node_id;

pub use block_id::BlockId;
pub use error::{Error, Result};
pub use node_id::NodeId;
