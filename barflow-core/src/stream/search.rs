//! Binary searches over timestamp-ordered series.

use crate::domain::{Series, Timestamp};

/// Position of the item with exactly this timestamp.
pub fn index_of<T: Series>(items: &[T], timestamp: Timestamp) -> Option<usize> {
    items
        .binary_search_by(|item| item.timestamp().cmp(&timestamp))
        .ok()
}

/// First position whose timestamp is `>= timestamp`; `items.len()` if none.
///
/// This is also the chronological insertion point for a new timestamp.
pub fn index_gte<T: Series>(items: &[T], timestamp: Timestamp) -> usize {
    items.partition_point(|item| item.timestamp() < timestamp)
}

/// True if timestamps strictly increase across `items`.
pub fn is_strictly_ordered<T: Series>(items: &[T]) -> bool {
    items
        .windows(2)
        .all(|pair| pair[0].timestamp() < pair[1].timestamp())
}
