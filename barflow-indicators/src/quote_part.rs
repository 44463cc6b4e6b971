//! Candle part projection: turns bars into a reusable value series.
//!
//! Attaching a `QuotePart` hub is how a chain consumes something other than
//! the close, e.g. an SMA of HL2.

use barflow_core::domain::series::{finite, or_nan};
use barflow_core::{CandlePart, Formula, Ohlcv, Reusable, Series, Timestamp};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuotePart {
    part: CandlePart,
}

impl QuotePart {
    pub fn new(part: CandlePart) -> Self {
        Self { part }
    }

    pub fn part(&self) -> CandlePart {
        self.part
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct QuotePartResult {
    pub timestamp: Timestamp,
    pub value: Option<f64>,
}

impl Series for QuotePartResult {
    fn timestamp(&self) -> Timestamp {
        self.timestamp
    }
}

impl Reusable for QuotePartResult {
    fn value(&self) -> f64 {
        or_nan(self.value)
    }
}

impl<Q: Ohlcv> Formula<Q> for QuotePart {
    type Output = QuotePartResult;
    type State = ();

    fn label(&self) -> String {
        format!("QUOTEPART({})", self.part.name().to_uppercase())
    }

    fn window(&self) -> usize {
        1
    }

    fn step(&self, window: &[Q], _: &()) -> (QuotePartResult, ()) {
        let q = &window[window.len() - 1];
        (
            QuotePartResult {
                timestamp: q.timestamp(),
                value: finite(self.part.of(q)),
            },
            (),
        )
    }
}
