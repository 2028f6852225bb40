//! Preset rectangle sizes used for scroll and middle-drag snapping
//!
//! Each entry is compared through its combined metric `width + height / 100000`,
//! so the table must be strictly ascending by that metric for the scans in
//! [`crate::snapping`] to be meaningful.

use crate::constants::metric;
use crate::types::PresetEntry;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum PresetError {
    #[error("Preset table is empty")]
    Empty,

    #[error("Preset {index} ({width}x{height}) is not larger than the preset before it")]
    NotAscending { index: usize, width: i32, height: i32 },

    #[error("Preset {index} has a height of {height}, which the metric encoding cannot hold")]
    HeightOutOfRange { index: usize, height: i32 },
}

/// Encode two integers as `a + b / 100000`
pub fn encode_pair(a: i32, b: i32) -> f64 {
    f64::from(a) + f64::from(b) / metric::SCALE
}

/// Integer part of an encoded pair (width or x)
pub fn width_of(value: f64) -> i32 {
    value.floor() as i32
}

/// Fractional part of an encoded pair scaled back up (height or y)
pub fn height_of(value: f64) -> i32 {
    ((value - value.floor()) * metric::SCALE).round() as i32
}

/// Both components of an encoded pair
pub fn decode_pair(value: f64) -> (i32, i32) {
    (width_of(value), height_of(value))
}

/// Ordered, non-empty list of preset sizes
#[derive(Debug, Clone, PartialEq)]
pub struct PresetTable {
    entries: Vec<PresetEntry>,
}

impl PresetTable {
    pub fn new(entries: Vec<PresetEntry>) -> Result<Self, PresetError> {
        if entries.is_empty() {
            return Err(PresetError::Empty);
        }
        for (index, entry) in entries.iter().enumerate() {
            if entry.height < 0 || entry.height >= metric::MAX_SECONDARY {
                return Err(PresetError::HeightOutOfRange { index, height: entry.height });
            }
        }
        for (index, pair) in entries.windows(2).enumerate() {
            if encode_pair(pair[1].width, pair[1].height) <= encode_pair(pair[0].width, pair[0].height) {
                return Err(PresetError::NotAscending {
                    index: index + 1,
                    width: pair[1].width,
                    height: pair[1].height,
                });
            }
        }
        Ok(Self { entries })
    }

    /// Rebuild a table from persisted metric values
    pub fn from_metrics(values: &[f64]) -> Result<Self, PresetError> {
        Self::new(
            values
                .iter()
                .map(|&value| PresetEntry::new(width_of(value), height_of(value)))
                .collect(),
        )
    }

    /// Built-in table: 16:9 sizes from 160x90 up to 2560x1440
    pub fn builtin() -> Self {
        const SIZES: [(i32, i32); 16] = [
            (160, 90),
            (240, 135),
            (320, 180),
            (400, 225),
            (480, 270),
            (560, 315),
            (640, 360),
            (720, 405),
            (800, 450),
            (960, 540),
            (1024, 576),
            (1280, 720),
            (1366, 768),
            (1600, 900),
            (1920, 1080),
            (2560, 1440),
        ];
        Self {
            entries: SIZES.iter().map(|&(w, h)| PresetEntry::new(w, h)).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[PresetEntry] {
        &self.entries
    }

    pub fn get(&self, index: usize) -> Option<PresetEntry> {
        self.entries.get(index).copied()
    }

    /// Combined metric of entry `index`
    pub fn metric(&self, index: usize) -> f64 {
        let entry = self.entries[index];
        encode_pair(entry.width, entry.height)
    }

    pub fn metrics(&self) -> Vec<f64> {
        (0..self.len()).map(|i| self.metric(i)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_table_is_ascending() {
        let table = PresetTable::builtin();
        assert_eq!(table.len(), 16);
        assert!(PresetTable::new(table.entries().to_vec()).is_ok());
        assert_eq!(table.get(0), Some(PresetEntry::new(160, 90)));
        assert_eq!(table.get(15), Some(PresetEntry::new(2560, 1440)));
    }

    #[test]
    fn test_new_rejects_out_of_order() {
        let result = PresetTable::new(vec![PresetEntry::new(320, 180), PresetEntry::new(160, 90)]);
        assert_eq!(
            result,
            Err(PresetError::NotAscending { index: 1, width: 160, height: 90 })
        );
    }

    #[test]
    fn test_new_rejects_duplicates_and_empty() {
        assert_eq!(PresetTable::new(Vec::new()), Err(PresetError::Empty));
        let dup = PresetTable::new(vec![PresetEntry::new(320, 180), PresetEntry::new(320, 180)]);
        assert!(matches!(dup, Err(PresetError::NotAscending { index: 1, .. })));
    }

    #[test]
    fn test_same_width_orders_by_height() {
        let table = PresetTable::new(vec![PresetEntry::new(640, 360), PresetEntry::new(640, 480)]);
        assert!(table.is_ok());
    }

    #[test]
    fn test_accessors_recover_components() {
        let value = encode_pair(1920, 1080);
        assert_eq!(width_of(value), 1920);
        assert_eq!(height_of(value), 1080);
        assert_eq!(decode_pair(encode_pair(0, 99_999)), (0, 99_999));
        assert_eq!(decode_pair(encode_pair(7, 0)), (7, 0));
    }

    #[test]
    fn test_from_metrics_matches_entries() {
        let table = PresetTable::builtin();
        let rebuilt = PresetTable::from_metrics(&table.metrics()).unwrap();
        assert_eq!(rebuilt, table);
    }
}
