//! Structured error type for every fallible stream operation.

use thiserror::Error;

use crate::domain::Timestamp;

/// Errors raised by providers, hubs, buffers and formula construction.
///
/// Warm-up is never an error: insufficient history shows up as undefined
/// result fields instead.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum StreamError {
    #[error("{param} is out of range: {message}")]
    OutOfRange { param: &'static str, message: String },

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("bar at {timestamp} is older than the last bar at {last}; use insert for late arrivals")]
    OutOfOrder {
        timestamp: Timestamp,
        last: Timestamp,
    },

    #[error("invalid operation: provider is closed")]
    Closed,

    #[error("invalid operation: hub is unsubscribed")]
    Unsubscribed,

    #[error("no bar found at {0}")]
    NotFound(Timestamp),

    #[error("index {index} is out of bounds for length {len}")]
    IndexOutOfBounds { index: usize, len: usize },

    #[error("repeated resend exceeded the {threshold} attempt threshold; check for circular chains")]
    Overflow { threshold: u32 },

    #[error("provider is faulted; call reset_fault() before further mutation")]
    Faulted,

    #[error("invalid settings: {0}")]
    Config(String),
}

pub type StreamResult<T> = Result<T, StreamError>;

impl StreamError {
    pub fn out_of_range(param: &'static str, message: impl Into<String>) -> Self {
        StreamError::OutOfRange {
            param,
            message: message.into(),
        }
    }
}
