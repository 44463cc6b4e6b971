//! barflow core: incremental indicator machinery over ordered price bars.
//!
//! This crate contains the streaming half of the indicator library:
//! - Domain traits (`Series`, `Reusable`, `Ohlcv`) and the concrete `Bar`
//! - The `Formula` contract every indicator implements once
//! - `QuoteProvider`: owner of the bar sequence and source of change notifications
//! - `Hub`: a subscriber whose results always equal a fresh batch computation
//! - Chains: hubs acting as providers for further hubs
//! - `Aggregator`: fixed-period bars rolled up from finer bars or ticks
//! - `BufferList`: append-only incremental container without subscriptions
//!
//! Batch, buffer and hub all drive the same `Formula::step`, so the three
//! execution modes agree bit-for-bit on identical input.

pub mod buffer;
pub mod config;
pub mod domain;
pub mod error;
pub mod fingerprint;
pub mod formula;
pub mod sample;
pub mod stream;

pub use buffer::BufferList;
pub use config::StreamSettings;
pub use domain::{Bar, CandlePart, Ohlcv, Reusable, Series, StreamItem, Tick, Timestamp};
pub use error::{StreamError, StreamResult};
pub use formula::Formula;
pub use stream::{
    aggregate, Act, Aggregator, ChainProvider, Change, Hub, HubStatus, Observable, Observer,
    PeriodSize, QuoteProvider,
};

#[cfg(test)]
pub(crate) mod testing;
