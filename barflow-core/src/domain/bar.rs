//! Bar: the fundamental market data unit flowing through providers and hubs.

use serde::{Deserialize, Serialize};

use super::series::same_value;
use super::{Ohlcv, Reusable, Series, Timestamp};

/// OHLCV bar at a single timestamp.
///
/// Bars are values: a corrected bar at an existing timestamp is a new `Bar`
/// that replaces the old one, never an in-place edit. Equality is field-wise,
/// which is what duplicate-resend detection relies on; two NaN fields compare
/// equal so a resent void bar is still recognized as a duplicate.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Bar {
    pub timestamp: Timestamp,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl Bar {
    pub fn new(timestamp: Timestamp, open: f64, high: f64, low: f64, close: f64, volume: f64) -> Self {
        Self {
            timestamp,
            open,
            high,
            low,
            close,
            volume,
        }
    }

    /// Returns true if any OHLC field is NaN (void bar).
    pub fn is_void(&self) -> bool {
        self.open.is_nan() || self.high.is_nan() || self.low.is_nan() || self.close.is_nan()
    }

    /// Basic OHLC sanity check: high >= low, high >= open, high >= close, etc.
    pub fn is_sane(&self) -> bool {
        if self.is_void() {
            return false;
        }
        self.high >= self.low
            && self.high >= self.open
            && self.high >= self.close
            && self.low <= self.open
            && self.low <= self.close
            && self.volume >= 0.0
    }
}

impl PartialEq for Bar {
    fn eq(&self, other: &Self) -> bool {
        self.timestamp == other.timestamp
            && same_value(self.open, other.open)
            && same_value(self.high, other.high)
            && same_value(self.low, other.low)
            && same_value(self.close, other.close)
            && same_value(self.volume, other.volume)
    }
}

impl Series for Bar {
    fn timestamp(&self) -> Timestamp {
        self.timestamp
    }
}

impl Reusable for Bar {
    fn value(&self) -> f64 {
        self.close
    }
}

impl Ohlcv for Bar {
    fn open(&self) -> f64 {
        self.open
    }

    fn high(&self) -> f64 {
        self.high
    }

    fn low(&self) -> f64 {
        self.low
    }

    fn close(&self) -> f64 {
        self.close
    }

    fn volume(&self) -> f64 {
        self.volume
    }
}
