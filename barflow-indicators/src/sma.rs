//! Simple Moving Average (SMA).
//!
//! Rolling mean of reusable values over a lookback window.
//! First defined value at index period-1; any NaN in the window is undefined.

use barflow_core::formula::require_period;
use barflow_core::{Formula, Reusable, Series, StreamResult, Timestamp};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sma {
    period: usize,
}

impl Sma {
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
pub struct SmaResult {
    pub timestamp: Timestamp,
    pub sma: Option<f64>,
}

impl Series for SmaResult {
    fn timestamp(&self) -> Timestamp {
        self.timestamp
    }
}

impl Reusable for SmaResult {
    fn value(&self) -> f64 {
        barflow_core::domain::series::or_nan(self.sma)
    }
}

impl<T: Reusable> Formula<T> for Sma {
    type Output = SmaResult;
    type State = ();

    fn label(&self) -> String {
        format!("SMA({})", self.period)
    }

    fn window(&self) -> usize {
        self.period
    }

    fn step(&self, window: &[T], _: &()) -> (SmaResult, ()) {
        let timestamp = window[window.len() - 1].timestamp();
        let sma = if window.len() < self.period {
            None
        } else {
            let sum: f64 = window.iter().map(|v| v.value()).sum();
            barflow_core::domain::series::finite(sum / self.period as f64)
        };
        (SmaResult { timestamp, sma }, ())
    }
}
