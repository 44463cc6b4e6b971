//! Capability traits the core is generic over.
//!
//! The core never names a concrete bar type. Providers need `Series`,
//! reusable-value formulas need `Reusable`, candle formulas need `Ohlcv`.

use super::Timestamp;

/// Anything positioned on the timeline.
pub trait Series {
    fn timestamp(&self) -> Timestamp;
}

/// A series item that forwards one designated scalar downstream.
///
/// This is the value a hub exposes to chained hubs. An undefined value
/// (warm-up, missing input) is `f64::NAN`.
pub trait Reusable: Series {
    fn value(&self) -> f64;
}

/// Open/high/low/close/volume fields of a candle.
pub trait Ohlcv: Series {
    fn open(&self) -> f64;
    fn high(&self) -> f64;
    fn low(&self) -> f64;
    fn close(&self) -> f64;
    fn volume(&self) -> f64;
}

/// Bound shared by everything a provider or buffer can hold.
///
/// Providers compare items with `PartialEq` to recognize identical resends.
/// Float fields that can be NaN should compare NaN to NaN as equal, as
/// [`Bar`](super::Bar) does, or a resent void item counts as a correction.
pub trait StreamItem: Series + Clone + PartialEq + Send + Sync + 'static {}

impl<T: Series + Clone + PartialEq + Send + Sync + 'static> StreamItem for T {}

/// Float equality for resend detection: NaN matches NaN.
pub(crate) fn same_value(a: f64, b: f64) -> bool {
    a == b || (a.is_nan() && b.is_nan())
}

/// Convert an optional computed field to its reusable representation.
pub fn or_nan(value: Option<f64>) -> f64 {
    value.unwrap_or(f64::NAN)
}

/// Convert a raw scalar into an optional field; NaN and infinities are undefined.
pub fn finite(value: f64) -> Option<f64> {
    value.is_finite().then_some(value)
}
