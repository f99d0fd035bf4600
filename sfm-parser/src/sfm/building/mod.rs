//! The hierarchy builder: tokens in, nested entries out.
//!
//! This is the core state machine of the conversion. It consumes tokens in
//! input order, decides where each one belongs using the resolved mapping,
//! and maintains the set of currently-open nodes. Completed top-level
//! entries are handed to an [`EntrySink`] and evicted immediately, which
//! keeps memory bounded no matter how large the input file is.

pub mod arena;
pub mod builder;

pub use arena::{ImportNode, NodeArena, NodeContent, RenderedField};
pub use builder::HierarchyBuilder;

use crate::sfm::error::ConvertError;

/// Receives each completed top-level entry as soon as it closes.
///
/// The node and its whole subtree are still live in the arena during the
/// call and are evicted right after it returns.
pub trait EntrySink {
    fn emit_entry(&mut self, arena: &NodeArena, entry: usize) -> Result<(), ConvertError>;
}
