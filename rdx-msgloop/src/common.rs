//! Contains common, primitive types shared by the queue and the loop.
//!
//! Using distinct types for sequence numbers and item kinds keeps the ordering
//! key and the dispatch tag from being confused with plain integers.

use std::fmt;

/// Insertion sequence number of a work item within one queue.
///
/// Assigned under the queue lock, so it is strictly increasing per queue and
/// serves as the tie-break between items with equal due times.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Seq(pub u64);

impl Seq {
    pub(crate) fn next(self) -> Self {
        Seq(self.0.wrapping_add(1))
    }
}

/// What a work item carries and therefore how it is dispatched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ItemKind {
    /// A deferred closure, invoked directly.
    Task,
    /// A structured message, handed to the `on_handle` handler.
    Message,
}

impl fmt::Display for ItemKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ItemKind::Task => f.write_str("task"),
            ItemKind::Message => f.write_str("message"),
        }
    }
}
