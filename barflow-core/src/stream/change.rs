//! Change notifications and mutation outcomes.

use serde::{Deserialize, Serialize};

/// What happened to an upstream sequence, delivered to every subscriber.
///
/// Positions refer to the upstream sequence after the change was applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Change {
    /// A new item was appended at the tail position.
    Added(usize),
    /// The item at this position was replaced by a different value.
    Changed(usize),
    /// A late item was inserted at this position; later items shifted right.
    Inserted(usize),
    /// The item previously at this position was removed; later items shifted left.
    Removed(usize),
    /// The oldest `n` items are about to be dropped to honour the cache size
    /// limit. They are still readable while the notice is handled.
    Pruned(usize),
    /// The source is closed; no further changes will follow.
    Closed,
}

impl Change {
    /// First position whose result is no longer valid, if the change
    /// invalidates a suffix.
    pub fn invalidates_from(self) -> Option<usize> {
        match self {
            Change::Changed(p) | Change::Inserted(p) | Change::Removed(p) => Some(p),
            Change::Added(_) | Change::Pruned(_) | Change::Closed => None,
        }
    }

    /// The same kind of change at another position.
    pub(crate) fn at(self, position: usize) -> Change {
        match self {
            Change::Added(_) => Change::Added(position),
            Change::Changed(_) => Change::Changed(position),
            Change::Inserted(_) => Change::Inserted(position),
            Change::Removed(_) => Change::Removed(position),
            other => other,
        }
    }
}

/// Outcome of a provider mutation call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Act {
    /// Appended at the tail.
    Add,
    /// Inserted before the tail.
    Insert,
    /// Replaced a different bar at the same timestamp.
    Update,
    /// Removed a bar.
    Remove,
    /// Identical resend; nothing changed and nothing was notified.
    DoNothing,
}
