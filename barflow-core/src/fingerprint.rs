//! Content fingerprints for result series.
//!
//! Two series with the same fingerprint serialized to the same bytes, so
//! comparing fingerprints is a compact way to assert that two execution
//! modes produced identical output, undefined positions included.

use std::fmt;

use serde::Serialize;

use crate::error::{StreamError, StreamResult};

/// BLAKE3 hash of a series' canonical JSON form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SeriesHash([u8; 32]);

impl SeriesHash {
    pub fn of<T: Serialize>(items: &[T]) -> StreamResult<Self> {
        let canonical =
            serde_json::to_vec(items).map_err(|e| StreamError::InvalidArgument(e.to_string()))?;
        Ok(Self(*blake3::hash(&canonical).as_bytes()))
    }

    pub fn to_hex(&self) -> String {
        blake3::Hash::from(self.0).to_hex().to_string()
    }
}

impl fmt::Display for SeriesHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::make_bars;

    #[test]
    fn identical_series_hash_equal() {
        let a = SeriesHash::of(&make_bars(&[1.0, 2.0, 3.0])).unwrap();
        let b = SeriesHash::of(&make_bars(&[1.0, 2.0, 3.0])).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.to_hex().len(), 64);
    }

    #[test]
    fn any_field_change_shows() {
        let bars = make_bars(&[1.0, 2.0, 3.0]);
        let mut changed = bars.clone();
        changed[1].volume += 1.0;
        assert_ne!(
            SeriesHash::of(&bars).unwrap(),
            SeriesHash::of(&changed).unwrap()
        );
    }

    #[test]
    fn undefined_fields_are_part_of_the_hash() {
        let defined = [Some(1.0), None];
        let undefined = [None::<f64>, None];
        assert_ne!(
            SeriesHash::of(&defined).unwrap(),
            SeriesHash::of(&undefined).unwrap()
        );
    }
}
