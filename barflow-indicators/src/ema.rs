//! Exponential Moving Average (EMA).
//!
//! Recursive: EMA[t] = EMA[t-1] + k * (value[t] - EMA[t-1]), k = 2 / (period + 1).
//! Seed: EMA[period-1] = SMA of the first `period` values. After an undefined
//! value the EMA re-seeds from the SMA of the trailing window.

use barflow_core::domain::series::{finite, or_nan};
use barflow_core::formula::require_period;
use barflow_core::{Formula, Reusable, Series, StreamResult, Timestamp};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq)]
pub struct Ema {
    period: usize,
    k: f64,
}

impl Ema {
    pub fn new(period: usize) -> StreamResult<Self> {
        let period = require_period("lookback_periods", period, 1)?;
        Ok(Self {
            period,
            k: 2.0 / (period as f64 + 1.0),
        })
    }

    pub fn period(&self) -> usize {
        self.period
    }

    /// Smoothing factor.
    pub fn k(&self) -> f64 {
        self.k
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EmaResult {
    pub timestamp: Timestamp,
    pub ema: Option<f64>,
}

impl Series for EmaResult {
    fn timestamp(&self) -> Timestamp {
        self.timestamp
    }
}

impl Reusable for EmaResult {
    fn value(&self) -> f64 {
        or_nan(self.ema)
    }
}

/// Last defined EMA, if any.
#[derive(Debug, Clone, Copy, Default)]
pub struct EmaState {
    last: Option<f64>,
}

impl<T: Reusable> Formula<T> for Ema {
    type Output = EmaResult;
    type State = EmaState;

    fn label(&self) -> String {
        format!("EMA({})", self.period)
    }

    fn window(&self) -> usize {
        self.period
    }

    fn step(&self, window: &[T], prev: &EmaState) -> (EmaResult, EmaState) {
        let current = &window[window.len() - 1];
        let ema = if window.len() < self.period {
            None
        } else {
            match prev.last {
                Some(last) => finite(last + self.k * (current.value() - last)),
                None => {
                    let sum: f64 = window.iter().map(|v| v.value()).sum();
                    finite(sum / self.period as f64)
                }
            }
        };
        (
            EmaResult {
                timestamp: current.timestamp(),
                ema,
            },
            EmaState { last: ema },
        )
    }
}
