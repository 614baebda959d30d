//! Node residency bookkeeping.
//!
//! - [`TerminalRegistry`] - Oldest-first eviction candidates
//! - [`TreeStats`] - Load/write/eviction/allocation counters

mod stats;
mod terminal;

pub use stats::{StatsSnapshot, TreeStats};
pub use terminal::TerminalRegistry;
