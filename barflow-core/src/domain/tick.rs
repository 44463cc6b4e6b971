//! Tick: a single trade print, the raw input of tick aggregation.

use serde::{Deserialize, Serialize};

use super::series::same_value;
use super::{Ohlcv, Reusable, Series, Timestamp};

/// One trade at a price and size.
///
/// As an `Ohlcv` item a tick is a flat candle: open, high, low and close all
/// read the price.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Tick {
    pub timestamp: Timestamp,
    pub price: f64,
    pub volume: f64,
}

impl Tick {
    pub fn new(timestamp: Timestamp, price: f64, volume: f64) -> Self {
        Self {
            timestamp,
            price,
            volume,
        }
    }
}

impl PartialEq for Tick {
    fn eq(&self, other: &Self) -> bool {
        self.timestamp == other.timestamp
            && same_value(self.price, other.price)
            && same_value(self.volume, other.volume)
    }
}

impl Series for Tick {
    fn timestamp(&self) -> Timestamp {
        self.timestamp
    }
}

impl Reusable for Tick {
    fn value(&self) -> f64 {
        self.price
    }
}

impl Ohlcv for Tick {
    fn open(&self) -> f64 {
        self.price
    }

    fn high(&self) -> f64 {
        self.price
    }

    fn low(&self) -> f64 {
        self.price
    }

    fn close(&self) -> f64 {
        self.price
    }

    fn volume(&self) -> f64 {
        self.volume
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::day;

    #[test]
    fn tick_reads_as_flat_candle() {
        let tick = Tick::new(day(0), 101.5, 20.0);
        assert_eq!(tick.open(), 101.5);
        assert_eq!(tick.high(), tick.low());
        assert_eq!(tick.close(), tick.value());
        assert_eq!(tick.volume(), 20.0);
    }

    #[test]
    fn nan_price_resend_is_equal() {
        let tick = Tick::new(day(0), f64::NAN, 1.0);
        assert_eq!(tick, tick);
        assert_ne!(tick, Tick::new(day(0), 1.0, 1.0));
    }
}
