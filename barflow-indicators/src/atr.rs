//! Average True Range (ATR).
//!
//! ATR uses Wilder smoothing: ATR[t] = (ATR[t-1] * (period-1) + TR[t]) / period.
//! Seed: ATR[period] = mean of TR[1..=period] (TR[0] has no previous close).
//! ATRP = ATR / close * 100 is the value forwarded to chained indicators.

use barflow_core::domain::series::{finite, or_nan};
use barflow_core::formula::require_period;
use barflow_core::{Formula, Ohlcv, Reusable, Series, StreamResult, Timestamp};
use serde::{Deserialize, Serialize};

use crate::tr::true_range;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Atr {
    period: usize,
}

impl Atr {
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
pub struct AtrResult {
    pub timestamp: Timestamp,
    pub tr: Option<f64>,
    pub atr: Option<f64>,
    /// ATR as a percentage of close.
    pub atrp: Option<f64>,
}

impl Series for AtrResult {
    fn timestamp(&self) -> Timestamp {
        self.timestamp
    }
}

impl Reusable for AtrResult {
    fn value(&self) -> f64 {
        or_nan(self.atrp)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct AtrState {
    /// Bars seen so far.
    seen: usize,
    /// Running TR sum during warm-up.
    sum_tr: f64,
    prev_atr: f64,
}

impl Default for AtrState {
    fn default() -> Self {
        Self {
            seen: 0,
            sum_tr: 0.0,
            prev_atr: f64::NAN,
        }
    }
}

impl<Q: Ohlcv> Formula<Q> for Atr {
    type Output = AtrResult;
    type State = AtrState;

    fn label(&self) -> String {
        format!("ATR({})", self.period)
    }

    fn window(&self) -> usize {
        2
    }

    fn step(&self, window: &[Q], prev: &AtrState) -> (AtrResult, AtrState) {
        let index = prev.seen;
        let current = &window[window.len() - 1];
        let timestamp = current.timestamp();

        let [before, _] = window else {
            let result = AtrResult {
                timestamp,
                tr: None,
                atr: None,
                atrp: None,
            };
            return (
                result,
                AtrState {
                    seen: index + 1,
                    ..AtrState::default()
                },
            );
        };

        let n = self.period as f64;
        let tr = true_range(current.high(), current.low(), before.close());
        let mut sum_tr = prev.sum_tr;
        let atr = if index > self.period {
            (prev.prev_atr * (n - 1.0) + tr) / n
        } else {
            sum_tr += tr;
            if index == self.period {
                sum_tr / n
            } else {
                f64::NAN
            }
        };
        let close = current.close();
        let atrp = if close == 0.0 { f64::NAN } else { atr / close * 100.0 };

        (
            AtrResult {
                timestamp,
                tr: finite(tr),
                atr: finite(atr),
                atrp: finite(atrp),
            },
            AtrState {
                seen: index + 1,
                sum_tr,
                prev_atr: atr,
            },
        )
    }
}
