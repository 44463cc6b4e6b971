//! Serializable provider settings.

use serde::{Deserialize, Serialize};

use crate::error::{StreamError, StreamResult};

/// Default number of consecutive identical resends tolerated before a
/// provider faults.
pub const DEFAULT_OVERFLOW_THRESHOLD: u32 = 100;

/// Settings applied to a provider when it is created and inherited by every
/// hub attached to it.
///
/// ```toml
/// max_cache_size = 5000
/// overflow_threshold = 100
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamSettings {
    /// Keep at most this many bars; the oldest are pruned on append.
    /// `None` keeps the full history.
    pub max_cache_size: Option<usize>,

    /// Consecutive identical resends allowed before the provider faults.
    pub overflow_threshold: u32,
}

impl Default for StreamSettings {
    fn default() -> Self {
        Self {
            max_cache_size: None,
            overflow_threshold: DEFAULT_OVERFLOW_THRESHOLD,
        }
    }
}

impl StreamSettings {
    pub fn with_max_cache_size(max_cache_size: usize) -> StreamResult<Self> {
        Self {
            max_cache_size: Some(max_cache_size),
            ..Self::default()
        }
        .validated()
    }

    /// Parse and validate settings from TOML text.
    pub fn from_toml_str(text: &str) -> StreamResult<Self> {
        let settings: StreamSettings =
            toml::from_str(text).map_err(|e| StreamError::Config(e.to_string()))?;
        settings.validated()
    }

    /// Check value ranges; every constructor funnels through here.
    pub fn validated(self) -> StreamResult<Self> {
        if self.max_cache_size == Some(0) {
            return Err(StreamError::Config(
                "max_cache_size must be at least 1".into(),
            ));
        }
        Ok(self)
    }
}
