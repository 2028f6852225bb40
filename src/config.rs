//! User configuration (JSON under the XDG config dir)
//!
//! Missing keys fall back to per-field defaults, a few environment variables
//! override the file, and every value is clamped to a usable range before use.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{error, info, warn};

use crate::constants::{self, validation::*};
use crate::presets::PresetTable;
use crate::types::{PresetEntry, SelectionMode};

/// Which artifacts to produce from a raw recording
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Outputs {
    /// Encode movies straight from temp.mkv instead of the PNG frames
    #[serde(default = "default_true")]
    pub anims_from_temp: bool,
    #[serde(default = "default_true")]
    pub gif: bool,
    /// Keep the extracted PNG frames
    #[serde(default)]
    pub pngs: bool,
    #[serde(default)]
    pub webm: bool,
    #[serde(default)]
    pub mp4: bool,
}

impl Default for Outputs {
    fn default() -> Self {
        Self {
            anims_from_temp: true,
            gif: true,
            pngs: false,
            webm: false,
            mp4: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Recordings go to `<working_dir>/regioncast`
    #[serde(default = "default_working_dir")]
    pub working_dir: PathBuf,

    /// Initial placement: interior, entire, center or previous
    #[serde(default = "default_area")]
    pub area: String,

    /// Capture frame rate
    #[serde(default = "default_fps")]
    pub fps: u32,

    /// Encoder binary
    #[serde(default = "default_encoder")]
    pub encoder: String,

    #[serde(default)]
    pub outputs: Outputs,

    /// Custom preset sizes as `[width, height]` pairs, ascending
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub presets: Option<Vec<[i32; 2]>>,

    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_true() -> bool {
    true
}

fn default_working_dir() -> PathBuf {
    dirs::home_dir().unwrap_or_else(|| PathBuf::from("."))
}

fn default_area() -> String {
    SelectionMode::Entire.as_str().to_string()
}

fn default_fps() -> u32 {
    8
}

fn default_encoder() -> String {
    constants::encoder::DEFAULT_BINARY.to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            working_dir: default_working_dir(),
            area: default_area(),
            fps: default_fps(),
            encoder: default_encoder(),
            outputs: Outputs::default(),
            presets: None,
            log_level: default_log_level(),
        }
    }
}

impl Config {
    pub fn path() -> PathBuf {
        let mut path = dirs::config_dir().unwrap_or_else(|| PathBuf::from("."));
        path.push(constants::config::APP_DIR);
        path.push(constants::config::FILENAME);
        path
    }

    /// Load from `path`, writing a default file on first run.
    /// A broken file is reported and left alone; defaults are used instead.
    pub fn load(path: &Path) -> Self {
        let mut config = match fs::read_to_string(path) {
            Ok(contents) => match serde_json::from_str::<Config>(&contents) {
                Ok(config) => {
                    info!(path = %path.display(), "Loaded config");
                    config
                }
                Err(e) => {
                    error!(path = %path.display(), error = %e, "Failed to parse config file, using defaults");
                    error!(path = %path.display(), "The file has been preserved - fix the syntax error and restart.");
                    Config::default()
                }
            },
            Err(_) => {
                let config = Config::default();
                match config.save(path) {
                    Ok(()) => info!(path = %path.display(), "Generated default config file"),
                    Err(e) => warn!(path = %path.display(), error = ?e, "Failed to write default config"),
                }
                config
            }
        };
        config.apply_env_overrides();
        config.validate_and_clamp();
        config
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .context(format!("Failed to create config directory: {}", parent.display()))?;
        }
        let contents = serde_json::to_string_pretty(self)
            .context("Failed to serialize config to JSON")?;
        fs::write(path, contents)
            .context(format!("Failed to write config file to {}", path.display()))?;
        Ok(())
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(dir) = env::var("REGIONCAST_WORKING_DIR") {
            info!(working_dir = %dir, "Working directory overridden from environment");
            self.working_dir = PathBuf::from(dir);
        }
        if let Ok(area) = env::var("REGIONCAST_AREA") {
            self.area = area;
        }
        if let Ok(fps) = env::var("REGIONCAST_FPS") {
            match fps.trim().parse::<u32>() {
                Ok(fps) => self.fps = fps,
                Err(e) => warn!(value = %fps, error = %e, "Ignoring invalid REGIONCAST_FPS"),
            }
        }
    }

    fn validate_and_clamp(&mut self) {
        if self.fps < MIN_FPS {
            warn!(fps = self.fps, min = MIN_FPS, "fps below minimum, clamping");
            self.fps = MIN_FPS;
        } else if self.fps > MAX_FPS {
            warn!(fps = self.fps, max = MAX_FPS, "fps exceeds maximum, clamping");
            self.fps = MAX_FPS;
        }

        if self.encoder.trim().is_empty() {
            warn!(using = %default_encoder(), "encoder is empty, using default");
            self.encoder = default_encoder();
        }

        if let Some(presets) = &self.presets
            && let Err(e) = Self::build_presets(presets)
        {
            warn!(error = %e, "Invalid custom presets, using built-in table");
            self.presets = None;
        }
    }

    fn build_presets(pairs: &[[i32; 2]]) -> Result<PresetTable, crate::presets::PresetError> {
        PresetTable::new(pairs.iter().map(|&[w, h]| PresetEntry::new(w, h)).collect())
    }

    pub fn selection_mode(&self) -> SelectionMode {
        SelectionMode::parse(&self.area)
    }

    /// Configured preset table, if one was given and is valid
    pub fn preset_table(&self) -> Option<PresetTable> {
        self.presets.as_deref().and_then(|pairs| Self::build_presets(pairs).ok())
    }

    /// `<working_dir>/regioncast`
    pub fn recording_dir(&self) -> PathBuf {
        self.working_dir.join(constants::encoder::RECORDING_SUBDIR)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_keys_get_defaults() {
        let config: Config = serde_json::from_str(r#"{ "fps": 12 }"#).unwrap();
        assert_eq!(config.fps, 12);
        assert_eq!(config.area, "entire");
        assert_eq!(config.encoder, "/usr/bin/ffmpeg");
        assert_eq!(config.outputs, Outputs::default());
        assert!(config.presets.is_none());
    }

    #[test]
    fn test_partial_outputs_table() {
        let config: Config = serde_json::from_str(r#"{ "outputs": { "mp4": true } }"#).unwrap();
        assert!(config.outputs.mp4);
        assert!(config.outputs.gif);
        assert!(config.outputs.anims_from_temp);
        assert!(!config.outputs.pngs);
    }

    #[test]
    fn test_validate_clamps_fps() {
        let mut config = Config { fps: 0, ..Config::default() };
        config.validate_and_clamp();
        assert_eq!(config.fps, MIN_FPS);

        let mut config = Config { fps: 500, ..Config::default() };
        config.validate_and_clamp();
        assert_eq!(config.fps, MAX_FPS);
    }

    #[test]
    fn test_validate_drops_unordered_presets() {
        let mut config = Config {
            presets: Some(vec![[640, 360], [320, 180]]),
            ..Config::default()
        };
        config.validate_and_clamp();
        assert!(config.presets.is_none());
        assert!(config.preset_table().is_none());
    }

    #[test]
    fn test_custom_presets_table() {
        let config = Config {
            presets: Some(vec![[100, 100], [200, 100], [300, 150]]),
            ..Config::default()
        };
        let table = config.preset_table().unwrap();
        assert_eq!(table.len(), 3);
        assert_eq!(table.get(2), Some(PresetEntry::new(300, 150)));
    }

    #[test]
    fn test_recording_dir_and_mode() {
        let config = Config {
            working_dir: PathBuf::from("/tmp/casts"),
            area: "c".to_string(),
            ..Config::default()
        };
        assert_eq!(config.recording_dir(), PathBuf::from("/tmp/casts/regioncast"));
        assert_eq!(config.selection_mode(), SelectionMode::Center);
    }

    #[test]
    fn test_save_and_load_round_trip() {
        let dir = std::env::temp_dir().join(format!("regioncast-config-test-{}", std::process::id()));
        let path = dir.join("config.json");
        let config = Config {
            fps: 15,
            area: "center".to_string(),
            ..Config::default()
        };
        config.save(&path).unwrap();
        let contents = fs::read_to_string(&path).unwrap();
        let loaded: Config = serde_json::from_str(&contents).unwrap();
        assert_eq!(loaded, config);
        let _ = fs::remove_dir_all(dir);
    }
}
