//! Test helpers: synthetic bars and a small formula with carried state.

use chrono::NaiveDate;

use crate::domain::{Bar, Reusable, Series, Timestamp};
use crate::error::StreamResult;
use crate::formula::{require_period, Formula};

/// Timestamp for day `i` after 2024-01-02.
pub fn day(i: i64) -> Timestamp {
    NaiveDate::from_ymd_opt(2024, 1, 2)
        .unwrap()
        .and_hms_opt(0, 0, 0)
        .unwrap()
        + chrono::Duration::days(i)
}

/// Create synthetic bars from close prices.
///
/// open = prev_close (or close for first bar), high = max(open,close) + 1.0,
/// low = min(open,close) - 1.0, volume = 1000.
pub fn make_bars(closes: &[f64]) -> Vec<Bar> {
    closes
        .iter()
        .enumerate()
        .map(|(i, &close)| {
            let open = if i == 0 { close } else { closes[i - 1] };
            Bar::new(
                day(i as i64),
                open,
                open.max(close) + 1.0,
                open.min(close) - 1.0,
                close,
                1000.0,
            )
        })
        .collect()
}

/// Rolling mean of reusable values plus a running total carried as state.
#[derive(Debug, Clone)]
pub struct WindowMean {
    period: usize,
}

impl WindowMean {
    pub fn new(period: usize) -> StreamResult<Self> {
        Ok(Self {
            period: require_period("period", period, 1)?,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MeanResult {
    pub timestamp: Timestamp,
    pub mean: Option<f64>,
    pub total: f64,
}

impl Series for MeanResult {
    fn timestamp(&self) -> Timestamp {
        self.timestamp
    }
}

impl Reusable for MeanResult {
    fn value(&self) -> f64 {
        self.mean.unwrap_or(f64::NAN)
    }
}

#[derive(Debug, Clone, Default)]
pub struct MeanState {
    pub total: f64,
}

impl<T: Reusable> Formula<T> for WindowMean {
    type Output = MeanResult;
    type State = MeanState;

    fn label(&self) -> String {
        format!("MEAN({})", self.period)
    }

    fn window(&self) -> usize {
        self.period
    }

    fn step(&self, window: &[T], prev: &MeanState) -> (MeanResult, MeanState) {
        let current = &window[window.len() - 1];
        let value = current.value();
        let total = if value.is_nan() { prev.total } else { prev.total + value };
        let mean = if window.len() < self.period {
            None
        } else {
            let sum: f64 = window.iter().map(|w| w.value()).sum();
            let mean = sum / self.period as f64;
            (!mean.is_nan()).then_some(mean)
        };
        (
            MeanResult {
                timestamp: current.timestamp(),
                mean,
                total,
            },
            MeanState { total },
        )
    }
}

/// Observer that records every change it receives.
#[derive(Default)]
pub struct Recorder {
    pub seen: parking_lot::Mutex<Vec<crate::stream::Change>>,
}

impl Recorder {
    pub fn changes(&self) -> Vec<crate::stream::Change> {
        self.seen.lock().clone()
    }
}

impl crate::stream::Observer for Recorder {
    fn on_change(&self, change: crate::stream::Change) {
        self.seen.lock().push(change);
    }
}
