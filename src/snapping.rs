use crate::presets::{encode_pair, PresetTable};
use crate::types::ScrollDirection;

/// Scan the table from the top down and stop at the first preset whose metric
/// is strictly below `metric`. Falls through to index 0 when none is.
pub fn largest_below(presets: &PresetTable, metric: f64) -> usize {
    let mut i = presets.len().saturating_sub(1);
    while i > 0 && !(presets.metric(i) < metric) {
        i -= 1;
    }
    i
}

/// Scan the table from the bottom up and stop at the first preset whose metric
/// is strictly above `metric`. Falls through to the last index when none is.
pub fn smallest_above(presets: &PresetTable, metric: f64) -> usize {
    let last = presets.len().saturating_sub(1);
    let mut i = 0;
    while i < last && !(presets.metric(i) > metric) {
        i += 1;
    }
    i
}

/// Preset index to use for a wheel step from the current size.
/// Returns None for horizontal scrolling or an empty table.
pub fn scroll_target(
    presets: &PresetTable,
    direction: ScrollDirection,
    width: i32,
    height: i32,
) -> Option<usize> {
    if presets.is_empty() {
        return None;
    }
    let metric = encode_pair(width, height);
    match direction {
        ScrollDirection::Up => Some(largest_below(presets, metric)),
        ScrollDirection::Down => Some(smallest_above(presets, metric)),
        ScrollDirection::Left | ScrollDirection::Right => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::PresetEntry;

    fn small_table() -> PresetTable {
        PresetTable::new(vec![
            PresetEntry::new(160, 90),
            PresetEntry::new(320, 180),
            PresetEntry::new(640, 360),
        ])
        .unwrap()
    }

    #[test]
    fn test_largest_below_skips_equal() {
        let presets = small_table();
        assert_eq!(largest_below(&presets, encode_pair(320, 180)), 0);
        assert_eq!(largest_below(&presets, encode_pair(321, 0)), 1);
    }

    #[test]
    fn test_largest_below_bottoms_out_at_zero() {
        let presets = small_table();
        assert_eq!(largest_below(&presets, encode_pair(10, 10)), 0);
    }

    #[test]
    fn test_smallest_above_skips_equal() {
        let presets = small_table();
        assert_eq!(smallest_above(&presets, encode_pair(320, 180)), 2);
        assert_eq!(smallest_above(&presets, encode_pair(320, 179)), 1);
    }

    #[test]
    fn test_smallest_above_tops_out_at_last() {
        let presets = small_table();
        assert_eq!(smallest_above(&presets, encode_pair(5000, 5000)), 2);
    }

    #[test]
    fn test_horizontal_scroll_has_no_target() {
        let presets = small_table();
        assert_eq!(scroll_target(&presets, ScrollDirection::Left, 320, 180), None);
        assert_eq!(scroll_target(&presets, ScrollDirection::Right, 320, 180), None);
        assert_eq!(scroll_target(&presets, ScrollDirection::Up, 320, 180), Some(0));
    }

    #[test]
    fn test_single_entry_table() {
        let presets = PresetTable::new(vec![PresetEntry::new(200, 100)]).unwrap();
        assert_eq!(scroll_target(&presets, ScrollDirection::Up, 10, 10), Some(0));
        assert_eq!(scroll_target(&presets, ScrollDirection::Down, 900, 900), Some(0));
    }
}
