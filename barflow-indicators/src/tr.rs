//! True Range (TR).
//!
//! TR[t] = max(high[t]-low[t], |high[t]-close[t-1]|, |low[t]-close[t-1]|).
//! TR[0] is undefined: there is no previous close.

use barflow_core::domain::series::{finite, or_nan};
use barflow_core::{Formula, Ohlcv, Reusable, Series, Timestamp};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Tr;

impl Tr {
    pub fn new() -> Self {
        Tr
    }
}

/// True range of one bar given the previous close; NaN if any input is NaN.
pub fn true_range(high: f64, low: f64, prev_close: f64) -> f64 {
    // f64::max ignores NaN operands, so check up front.
    if high.is_nan() || low.is_nan() || prev_close.is_nan() {
        return f64::NAN;
    }
    (high - low)
        .max((high - prev_close).abs())
        .max((low - prev_close).abs())
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrResult {
    pub timestamp: Timestamp,
    pub tr: Option<f64>,
}

impl Series for TrResult {
    fn timestamp(&self) -> Timestamp {
        self.timestamp
    }
}

impl Reusable for TrResult {
    fn value(&self) -> f64 {
        or_nan(self.tr)
    }
}

impl<Q: Ohlcv> Formula<Q> for Tr {
    type Output = TrResult;
    type State = ();

    fn label(&self) -> String {
        "TR".to_string()
    }

    fn window(&self) -> usize {
        2
    }

    fn step(&self, window: &[Q], _: &()) -> (TrResult, ()) {
        let current = &window[window.len() - 1];
        let tr = match window {
            [prev, cur] => finite(true_range(cur.high(), cur.low(), prev.close())),
            _ => None,
        };
        (
            TrResult {
                timestamp: current.timestamp(),
                tr,
            },
            (),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{assert_approx, make_ohlc_bars, DEFAULT_EPSILON};
    use barflow_core::Bar;

    #[test]
    fn true_range_basic() {
        let bars = make_ohlc_bars(&[
            (100.0, 105.0, 95.0, 102.0),  // no previous close
            (102.0, 108.0, 100.0, 106.0), // TR = max(8, |108-102|, |100-102|) = 8
            (106.0, 107.0, 98.0, 99.0),   // TR = max(9, |107-106|, |98-106|) = 9
        ]);
        let tr = Formula::<Bar>::compute_all(&Tr::new(), &bars);
        assert_eq!(tr[0].tr, None);
        assert_approx(tr[1].tr.unwrap(), 8.0, DEFAULT_EPSILON);
        assert_approx(tr[2].tr.unwrap(), 9.0, DEFAULT_EPSILON);
    }

    #[test]
    fn true_range_gap_up() {
        // Gap up: prev close 100, current bar 110-115-108
        let bars = make_ohlc_bars(&[
            (98.0, 102.0, 97.0, 100.0),
            (110.0, 115.0, 108.0, 112.0), // TR = max(7, |115-100|, |108-100|) = 15
        ]);
        let tr = Formula::<Bar>::compute_all(&Tr::new(), &bars);
        assert_approx(tr[1].tr.unwrap(), 15.0, DEFAULT_EPSILON);
    }

    #[test]
    fn nan_input_is_undefined() {
        assert!(true_range(3.0, 1.0, f64::NAN).is_nan());
        let mut bars = make_ohlc_bars(&[(1.0, 2.0, 0.5, 1.5), (1.5, 2.5, 1.0, 2.0)]);
        bars[0].close = f64::NAN;
        let tr = Formula::<Bar>::compute_all(&Tr::new(), &bars);
        assert_eq!(tr[1].tr, None);
    }
}
