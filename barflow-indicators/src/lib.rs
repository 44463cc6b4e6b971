//! Reference indicator formulas for the barflow core.
//!
//! Every indicator is a `Formula`: batch (`compute_all`), buffer
//! (`BufferList::new`) and stream (`provider.attach`) all run the same step,
//! so the three shapes agree exactly. Results carry `Option<f64>` fields;
//! `None` marks warm-up or undefined input, and the reusable value forwarded
//! to chained hubs maps it to NaN.
//!
//! The `catalog` module exposes the same indicators behind string ids and
//! dynamic parameters.

pub mod atr;
pub mod catalog;
pub mod ema;
pub mod quote_part;
pub mod rsi;
pub mod sma;
pub mod tr;

pub use atr::{Atr, AtrResult};
pub use ema::{Ema, EmaResult};
pub use quote_part::{QuotePart, QuotePartResult};
pub use rsi::{Rsi, RsiResult};
pub use sma::{Sma, SmaResult};
pub use tr::{Tr, TrResult};

/// Create synthetic bars from close prices for testing.
///
/// Generates plausible OHLV: open = prev_close (or close for first bar),
/// high = max(open,close) + 1.0, low = min(open,close) - 1.0, volume = 1000.
#[cfg(test)]
pub fn make_bars(closes: &[f64]) -> Vec<barflow_core::Bar> {
    use barflow_core::Bar;
    let base = chrono::NaiveDate::from_ymd_opt(2024, 1, 2)
        .unwrap()
        .and_hms_opt(0, 0, 0)
        .unwrap();
    closes
        .iter()
        .enumerate()
        .map(|(i, &close)| {
            let open = if i == 0 { close } else { closes[i - 1] };
            Bar::new(
                base + chrono::Duration::days(i as i64),
                open,
                open.max(close) + 1.0,
                open.min(close) - 1.0,
                close,
                1000.0,
            )
        })
        .collect()
}

/// Create bars from explicit (open, high, low, close) tuples.
#[cfg(test)]
pub fn make_ohlc_bars(data: &[(f64, f64, f64, f64)]) -> Vec<barflow_core::Bar> {
    let mut bars = make_bars(&vec![0.0; data.len()]);
    for (bar, &(open, high, low, close)) in bars.iter_mut().zip(data) {
        bar.open = open;
        bar.high = high;
        bar.low = low;
        bar.close = close;
    }
    bars
}

/// Assert two f64 values are approximately equal (within epsilon).
#[cfg(test)]
pub fn assert_approx(actual: f64, expected: f64, epsilon: f64) {
    assert!(
        (actual - expected).abs() < epsilon,
        "assert_approx failed: actual={actual}, expected={expected}, diff={}, epsilon={epsilon}",
        (actual - expected).abs()
    );
}

/// Default epsilon for indicator tests.
#[cfg(test)]
pub const DEFAULT_EPSILON: f64 = 1e-10;
