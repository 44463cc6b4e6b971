//! Formula contract: the only place indicator math enters the core.
//!
//! A formula is a pure step function over a trailing window of upstream items
//! plus a carried state. Batch computation is a left fold of `step`, the
//! buffer calls `step` once per add, and a hub calls `step` on tail appends and
//! across every rebuilt suffix. Because all three paths run the same fold from
//! the same starting state, their outputs are identical, including the
//! undefined warm-up positions.

use std::fmt::Debug;

use crate::domain::Series;
use crate::error::{StreamError, StreamResult};

/// One indicator, parameterised and validated at construction.
///
/// Implementations must be deterministic: the output at position `i` may only
/// depend on the items at positions `..=i` (via the window and the carried
/// state), never on anything later.
pub trait Formula<I>: Clone + Send + Sync + 'static {
    /// One result per upstream item, carrying the item's timestamp.
    type Output: Series + Clone + PartialEq + Debug + Send + Sync + 'static;

    /// Running state carried from one position to the next.
    type State: Clone + Default + Debug + Send + Sync + 'static;

    /// Human-readable label (e.g., "SMA(20)", "ATR(14)").
    fn label(&self) -> String;

    /// Maximum number of trailing upstream items `step` reads, current item included.
    fn window(&self) -> usize;

    /// Compute the result for the last item of `window`.
    ///
    /// `window` ends at the current item and holds at most `window()` items;
    /// it is shorter only at the start of the series.
    fn step(&self, window: &[I], prev: &Self::State) -> (Self::Output, Self::State);

    /// Batch computation over a full sequence.
    fn compute_all(&self, items: &[I]) -> Vec<Self::Output> {
        let mut results = Vec::with_capacity(items.len());
        let mut state = Self::State::default();
        for index in 0..items.len() {
            let (result, next) = self.step(trailing(items, index, self.window()), &state);
            results.push(result);
            state = next;
        }
        results
    }
}

/// Trailing slice of at most `window` items ending at `index`.
pub fn trailing<I>(items: &[I], index: usize, window: usize) -> &[I] {
    let start = (index + 1).saturating_sub(window.max(1));
    &items[start..=index]
}

/// Validate a lookback-style parameter once, at construction.
pub fn require_period(param: &'static str, value: usize, min: usize) -> StreamResult<usize> {
    if value < min {
        return Err(StreamError::out_of_range(
            param,
            format!("must be at least {min}, got {value}"),
        ));
    }
    Ok(value)
}
