//! Domain types for barflow

pub mod bar;
pub mod candle;
pub mod series;
pub mod tick;

pub use bar::Bar;
pub use candle::CandlePart;
pub use series::{Ohlcv, Reusable, Series, StreamItem};
pub use tick::Tick;

/// Timestamp type used for every series item.
pub type Timestamp = chrono::NaiveDateTime;
