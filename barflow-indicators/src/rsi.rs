//! Relative Strength Index (RSI).
//!
//! Uses Wilder smoothing of average gains and average losses.
//! RSI = 100 - 100 / (1 + avg_gain / avg_loss)
//! First defined value at index period.
//! Edge cases: avg_loss == 0 → RSI = 100; avg_gain == 0 → RSI = 0.
//! After an undefined value the averages re-seed from the trailing window.

use barflow_core::domain::series::{finite, or_nan};
use barflow_core::formula::require_period;
use barflow_core::{Formula, Reusable, Series, StreamResult, Timestamp};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rsi {
    period: usize,
}

impl Rsi {
    pub fn new(period: usize) -> StreamResult<Self> {
        Ok(Self {
            period: require_period("lookback_periods", period, 1)?,
        })
    }

    pub fn period(&self) -> usize {
        self.period
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RsiResult {
    pub timestamp: Timestamp,
    pub rsi: Option<f64>,
}

impl Series for RsiResult {
    fn timestamp(&self) -> Timestamp {
        self.timestamp
    }
}

impl Reusable for RsiResult {
    fn value(&self) -> f64 {
        or_nan(self.rsi)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct RsiState {
    seen: usize,
    avg_gain: f64,
    avg_loss: f64,
}

impl Default for RsiState {
    fn default() -> Self {
        Self {
            seen: 0,
            avg_gain: f64::NAN,
            avg_loss: f64::NAN,
        }
    }
}

/// Gain and loss between two consecutive values; NaN if either is NaN.
fn gain_loss(prev: f64, value: f64) -> (f64, f64) {
    if prev.is_nan() || value.is_nan() {
        return (f64::NAN, f64::NAN);
    }
    let change = value - prev;
    (change.max(0.0), (-change).max(0.0))
}

fn compute_rsi(avg_gain: f64, avg_loss: f64) -> f64 {
    if avg_gain.is_nan() || avg_loss.is_nan() {
        return f64::NAN;
    }
    if avg_loss > 0.0 {
        100.0 - 100.0 / (1.0 + avg_gain / avg_loss)
    } else {
        100.0
    }
}

impl<T: Reusable> Formula<T> for Rsi {
    type Output = RsiResult;
    type State = RsiState;

    fn label(&self) -> String {
        format!("RSI({})", self.period)
    }

    fn window(&self) -> usize {
        self.period + 1
    }

    fn step(&self, window: &[T], prev: &RsiState) -> (RsiResult, RsiState) {
        let index = prev.seen;
        let timestamp = window[window.len() - 1].timestamp();
        let n = self.period as f64;

        let (avg_gain, avg_loss) = if index < self.period {
            (f64::NAN, f64::NAN)
        } else if prev.avg_gain.is_nan() || prev.avg_loss.is_nan() {
            // (Re)seed from the simple average over the window.
            let (sum_gain, sum_loss) = window.windows(2).fold((0.0, 0.0), |(g, l), pair| {
                let (gain, loss) = gain_loss(pair[0].value(), pair[1].value());
                (g + gain, l + loss)
            });
            (sum_gain / n, sum_loss / n)
        } else {
            let last = &window[window.len() - 2..];
            let (gain, loss) = gain_loss(last[0].value(), last[1].value());
            (
                (prev.avg_gain * (n - 1.0) + gain) / n,
                (prev.avg_loss * (n - 1.0) + loss) / n,
            )
        };

        (
            RsiResult {
                timestamp,
                rsi: finite(compute_rsi(avg_gain, avg_loss)),
            },
            RsiState {
                seen: index + 1,
                avg_gain,
                avg_loss,
            },
        )
    }
}
