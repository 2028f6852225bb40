use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::constants::{geometry::DEFAULT_PREVIOUS, metric};
use crate::presets::{decode_pair, encode_pair, PresetError, PresetTable};
use crate::types::Rect;

/// Why a persisted record could not be used
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum CodecError {
    #[error("Malformed record: expected {expected} lines, found {found}")]
    MalformedRecord { expected: usize, found: usize },

    #[error("Malformed record: line {line} ('{value}') is not a number")]
    InvalidNumber { line: usize, value: String },

    #[error("Malformed record: {0}")]
    Presets(#[from] PresetError),

    #[error("Malformed record: previous rectangle {rect:?} is outside 0..{limit}")]
    RectangleOutOfRange { rect: Rect, limit: i32 },
}

/// Preset table plus the rectangle of the last session.
/// Read once at startup, written once when the overlay closes.
#[derive(Debug, Clone, PartialEq)]
pub struct PersistedState {
    pub presets: PresetTable,
    pub previous: Rect,
}

impl PersistedState {
    pub fn builtin() -> Self {
        let (x, y, width, height) = DEFAULT_PREVIOUS;
        Self {
            presets: PresetTable::builtin(),
            previous: Rect::new(x, y, width, height),
        }
    }

    /// Previous rectangle as the `(position, size)` metric pair
    pub fn previous_encoded(&self) -> (f64, f64) {
        encode_rectangle(self.previous)
    }
}

/// `(x + y/100000, width + height/100000)`
pub fn encode_rectangle(rect: Rect) -> (f64, f64) {
    (encode_pair(rect.x, rect.y), encode_pair(rect.width, rect.height))
}

/// Inverse of [`encode_rectangle`]; exact while `y` and `height` stay below 100000
pub fn decode_rectangle(position: f64, size: f64) -> Rect {
    let (x, y) = decode_pair(position);
    let (width, height) = decode_pair(size);
    Rect::new(x, y, width, height)
}

/// One fixed-precision value per line: the preset metrics, then position, then size
pub fn serialize(presets: &PresetTable, previous: Rect) -> String {
    let (position, size) = encode_rectangle(previous);
    presets
        .metrics()
        .into_iter()
        .chain([position, size])
        .map(|value| format!("{value:.6}"))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Parse a record written by [`serialize`] for a table of `preset_count` entries
pub fn deserialize(text: &str, preset_count: usize) -> Result<PersistedState, CodecError> {
    let lines: Vec<&str> = text.lines().collect();
    let expected = preset_count + 2;
    if lines.len() != expected {
        return Err(CodecError::MalformedRecord { expected, found: lines.len() });
    }

    let values = lines
        .iter()
        .enumerate()
        .map(|(index, line)| {
            line.trim()
                .parse::<f64>()
                .ok()
                .filter(|value| value.is_finite())
                .ok_or_else(|| CodecError::InvalidNumber {
                    line: index + 1,
                    value: line.to_string(),
                })
        })
        .collect::<Result<Vec<f64>, CodecError>>()?;

    let presets = PresetTable::from_metrics(&values[..preset_count])?;
    let previous = decode_rectangle(values[preset_count], values[preset_count + 1]);
    let in_range = |v: i32| (0..metric::MAX_SECONDARY).contains(&v);
    if ![previous.x, previous.y, previous.width, previous.height].into_iter().all(in_range) {
        return Err(CodecError::RectangleOutOfRange { rect: previous, limit: metric::MAX_SECONDARY });
    }
    Ok(PersistedState { presets, previous })
}

/// Default state file location under the XDG config dir
pub fn state_path() -> PathBuf {
    let mut path = dirs::config_dir().unwrap_or_else(|| PathBuf::from("."));
    path.push(crate::constants::config::APP_DIR);
    path.push(crate::constants::config::STATE_FILENAME);
    path
}

/// Read the persisted state, falling back to `defaults` when the file is
/// missing or malformed. Never fails.
pub fn load_state(path: &Path, defaults: PersistedState) -> PersistedState {
    let contents = match fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(e) => {
            info!(path = %path.display(), error = %e, "No persisted selection state, using defaults");
            return defaults;
        }
    };

    match deserialize(&contents, defaults.presets.len()) {
        Ok(state) => {
            info!(
                path = %path.display(),
                presets = state.presets.len(),
                previous = ?state.previous,
                "Loaded persisted selection state"
            );
            state
        }
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Ignoring persisted selection state");
            defaults
        }
    }
}

/// Write the state next to its final location, then rename it into place
pub fn save_state(path: &Path, presets: &PresetTable, previous: Rect) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .context(format!("Failed to create state directory: {}", parent.display()))?;
    }
    let tmp_path = path.with_extension("tmp");
    fs::write(&tmp_path, serialize(presets, previous))
        .context(format!("Failed to write state file {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path)
        .context(format!("Failed to move state file into place at {}", path.display()))?;
    info!(path = %path.display(), previous = ?previous, "Saved selection state");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::PresetEntry;

    fn temp_state_path(name: &str) -> PathBuf {
        std::env::temp_dir()
            .join(format!("regioncast-test-{}-{}", std::process::id(), name))
            .join("presets")
    }

    #[test]
    fn test_encode_decode_rectangle() {
        let cases = [
            Rect::new(0, 0, 0, 0),
            Rect::new(130, 130, 260, 260),
            Rect::new(1919, 99_999, 1, 99_999),
            Rect::new(3840, 2160, 7680, 4320),
            Rect::new(-6, 12, 16, 16),
        ];
        for rect in cases {
            let (position, size) = encode_rectangle(rect);
            assert_eq!(decode_rectangle(position, size), rect);
        }
    }

    #[test]
    fn test_serialize_layout() {
        let presets = PresetTable::new(vec![PresetEntry::new(160, 90), PresetEntry::new(320, 180)]).unwrap();
        let text = serialize(&presets, Rect::new(12, 34, 560, 315));
        assert_eq!(text, "160.000900\n320.001800\n12.000340\n560.003150");
    }

    #[test]
    fn test_deserialize_round_trip_through_text() {
        let presets = PresetTable::builtin();
        let previous = Rect::new(1024, 768, 1366, 99_998);
        let state = deserialize(&serialize(&presets, previous), presets.len()).unwrap();
        assert_eq!(state.presets, presets);
        assert_eq!(state.previous, previous);
    }

    #[test]
    fn test_deserialize_accepts_trailing_newline() {
        let text = "160.000900\n10.000200\n300.000400\n";
        let state = deserialize(text, 1).unwrap();
        assert_eq!(state.previous, Rect::new(10, 20, 300, 40));
    }

    #[test]
    fn test_deserialize_wrong_line_count() {
        let result = deserialize("1.0\n2.0", 3);
        assert_eq!(result, Err(CodecError::MalformedRecord { expected: 5, found: 2 }));
    }

    #[test]
    fn test_deserialize_invalid_number() {
        let result = deserialize("160.0009\nabc\n1.0", 1);
        assert_eq!(
            result,
            Err(CodecError::InvalidNumber { line: 2, value: "abc".to_string() })
        );
    }

    #[test]
    fn test_deserialize_rejects_unordered_presets() {
        let result = deserialize("320.0018\n160.0009\n1.0\n1.0", 2);
        assert!(matches!(result, Err(CodecError::Presets(PresetError::NotAscending { .. }))));
    }

    #[test]
    fn test_deserialize_rejects_huge_rectangle() {
        let text = "160.000900\n320.001800\n640.003600\n3000000000.000000\n3000000000.000000";
        assert!(matches!(
            deserialize(text, 3),
            Err(CodecError::RectangleOutOfRange { .. })
        ));
    }

    #[test]
    fn test_deserialize_rejects_negative_size() {
        let result = deserialize("160.000900\n10.000200\n-300.000400", 1);
        assert_eq!(
            result,
            Err(CodecError::RectangleOutOfRange {
                rect: Rect::new(10, 20, -301, 99_960),
                limit: 100_000,
            })
        );
    }

    #[test]
    fn test_load_state_out_of_range_rectangle_uses_defaults() {
        let path = temp_state_path("out-of-range");
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        let mut text = serialize(&PresetTable::builtin(), Rect::new(0, 0, 1, 1));
        text = text.rsplitn(3, '\n').last().unwrap().to_string();
        text.push_str("\n3000000000.000000\n3000000000.000000");
        fs::write(&path, text).unwrap();
        let state = load_state(&path, PersistedState::builtin());
        assert_eq!(state, PersistedState::builtin());
        let _ = fs::remove_dir_all(path.parent().unwrap());
    }

    #[test]
    fn test_load_state_missing_file_uses_defaults() {
        let path = temp_state_path("missing");
        let state = load_state(&path, PersistedState::builtin());
        assert_eq!(state, PersistedState::builtin());
    }

    #[test]
    fn test_load_state_malformed_file_uses_defaults() {
        let path = temp_state_path("malformed");
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, "1.0\n2.0\n3.0").unwrap();
        let state = load_state(&path, PersistedState::builtin());
        assert_eq!(state, PersistedState::builtin());
        let _ = fs::remove_dir_all(path.parent().unwrap());
    }

    #[test]
    fn test_save_then_load() {
        let path = temp_state_path("save");
        let presets = PresetTable::builtin();
        let previous = Rect::new(50, 60, 640, 360);
        save_state(&path, &presets, previous).unwrap();
        assert!(!path.with_extension("tmp").exists());

        let state = load_state(&path, PersistedState::builtin());
        assert_eq!(state.previous, previous);
        assert_eq!(state.presets, presets);
        let _ = fs::remove_dir_all(path.parent().unwrap());
    }

    #[test]
    fn test_previous_encoded_matches_codec() {
        let state = PersistedState::builtin();
        assert_eq!(decode_rectangle(state.previous_encoded().0, state.previous_encoded().1), state.previous);
    }
}
