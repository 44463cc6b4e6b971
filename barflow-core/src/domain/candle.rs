//! Candle part selection: which scalar of a bar a formula consumes.

use serde::{Deserialize, Serialize};

use super::Ohlcv;

/// A single scalar projection of an OHLCV candle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CandlePart {
    Open,
    High,
    Low,
    Close,
    Volume,
    /// (high + low) / 2
    Hl2,
    /// (high + low + close) / 3
    Hlc3,
    /// (open + close) / 2
    Oc2,
    /// (open + high + low) / 3
    Ohl3,
    /// (open + high + low + close) / 4
    Ohlc4,
}

impl CandlePart {
    pub fn of<Q: Ohlcv + ?Sized>(self, q: &Q) -> f64 {
        match self {
            CandlePart::Open => q.open(),
            CandlePart::High => q.high(),
            CandlePart::Low => q.low(),
            CandlePart::Close => q.close(),
            CandlePart::Volume => q.volume(),
            CandlePart::Hl2 => (q.high() + q.low()) / 2.0,
            CandlePart::Hlc3 => (q.high() + q.low() + q.close()) / 3.0,
            CandlePart::Oc2 => (q.open() + q.close()) / 2.0,
            CandlePart::Ohl3 => (q.open() + q.high() + q.low()) / 3.0,
            CandlePart::Ohlc4 => (q.open() + q.high() + q.low() + q.close()) / 4.0,
        }
    }

    /// Parse a lowercase name ("close", "hl2", ...).
    pub fn from_name(name: &str) -> Option<Self> {
        let part = match name.to_ascii_lowercase().as_str() {
            "open" => CandlePart::Open,
            "high" => CandlePart::High,
            "low" => CandlePart::Low,
            "close" => CandlePart::Close,
            "volume" => CandlePart::Volume,
            "hl2" => CandlePart::Hl2,
            "hlc3" => CandlePart::Hlc3,
            "oc2" => CandlePart::Oc2,
            "ohl3" => CandlePart::Ohl3,
            "ohlc4" => CandlePart::Ohlc4,
            _ => return None,
        };
        Some(part)
    }

    pub fn name(self) -> &'static str {
        match self {
            CandlePart::Open => "open",
            CandlePart::High => "high",
            CandlePart::Low => "low",
            CandlePart::Close => "close",
            CandlePart::Volume => "volume",
            CandlePart::Hl2 => "hl2",
            CandlePart::Hlc3 => "hlc3",
            CandlePart::Oc2 => "oc2",
            CandlePart::Ohl3 => "ohl3",
            CandlePart::Ohlc4 => "ohlc4",
        }
    }
}
