//! Persisted application settings.
//!
//! A single JSON file (`braille_config.json` by default) holds the timing
//! and device-mode settings the pipeline consumes at submit time. A missing
//! file is created with defaults; a corrupt file is logged and replaced by
//! defaults in memory rather than failing startup. Save failures are
//! propagated to the caller.

use crate::error::{AppResult, BrailleError};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Default settings file name, created next to the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "braille_config.json";

/// Timing and device-mode settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Wait between group sends, in milliseconds.
    pub char_delay: u64,
    /// Actuator settle time, in milliseconds.
    pub servo_delay: u64,
    /// Whether both actuators realize a cell (one per 3-bit half).
    pub dual_servo_mode: bool,
    /// Verbose logging in the binary.
    pub debug_mode: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            char_delay: 3000,
            servo_delay: 750,
            dual_servo_mode: true,
            debug_mode: false,
        }
    }
}

impl Settings {
    /// Applies a `key=value` update from the CLI.
    ///
    /// Unknown keys and unparsable values are semantic configuration
    /// errors, not file faults.
    pub fn set_key(&mut self, key: &str, value: &str) -> AppResult<()> {
        match key {
            "char_delay" => self.char_delay = parse_ms(key, value)?,
            "servo_delay" => self.servo_delay = parse_ms(key, value)?,
            "dual_servo_mode" => self.dual_servo_mode = parse_bool(key, value)?,
            "debug_mode" => self.debug_mode = parse_bool(key, value)?,
            _ => {
                return Err(BrailleError::Configuration(format!(
                    "unknown configuration key '{key}'"
                )))
            }
        }
        debug!("Configuration updated: {} = {}", key, value);
        Ok(())
    }
}

fn parse_ms(key: &str, value: &str) -> AppResult<u64> {
    value.parse().map_err(|_| {
        BrailleError::Configuration(format!("'{key}' expects a non-negative integer, got '{value}'"))
    })
}

fn parse_bool(key: &str, value: &str) -> AppResult<bool> {
    match value {
        "true" | "1" => Ok(true),
        "false" | "0" => Ok(false),
        _ => Err(BrailleError::Configuration(format!(
            "'{key}' expects true/false, got '{value}'"
        ))),
    }
}

/// File-backed settings store.
#[derive(Debug)]
pub struct ConfigStore {
    path: PathBuf,
    /// The in-memory settings; callers mutate and [`ConfigStore::save`].
    pub settings: Settings,
}

impl ConfigStore {
    /// Loads the store at `path`, creating it with defaults if missing.
    pub fn open(path: impl Into<PathBuf>) -> AppResult<Self> {
        let path = path.into();
        let settings = if path.exists() {
            load_settings(&path)
        } else {
            let store = ConfigStore {
                path: path.clone(),
                settings: Settings::default(),
            };
            store.save()?;
            info!("Created new configuration file with defaults");
            return Ok(store);
        };
        Ok(ConfigStore { path, settings })
    }

    /// Writes the current settings back to disk.
    pub fn save(&self) -> AppResult<()> {
        let json = serde_json::to_string_pretty(&self.settings)?;
        fs::write(&self.path, json)?;
        debug!("Configuration saved to {}", self.path.display());
        Ok(())
    }

    /// Restores and persists the default settings.
    pub fn reset_to_defaults(&mut self) -> AppResult<()> {
        self.settings = Settings::default();
        self.save()?;
        info!("Configuration reset to defaults");
        Ok(())
    }
}

fn load_settings(path: &Path) -> Settings {
    match fs::read_to_string(path).map_err(BrailleError::from).and_then(|json| {
        serde_json::from_str::<Settings>(&json).map_err(BrailleError::from)
    }) {
        Ok(settings) => {
            debug!("Configuration loaded from {}", path.display());
            settings
        }
        Err(e) => {
            warn!(
                "Error loading configuration from {}: {}; using defaults",
                path.display(),
                e
            );
            Settings::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_missing_file_creates_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(DEFAULT_CONFIG_FILE);

        let store = ConfigStore::open(&path).unwrap();
        assert_eq!(store.settings, Settings::default());
        assert!(path.exists());
    }

    #[test]
    fn test_save_and_reload_round_trip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(DEFAULT_CONFIG_FILE);

        let mut store = ConfigStore::open(&path).unwrap();
        store.settings.char_delay = 1500;
        store.settings.dual_servo_mode = false;
        store.save().unwrap();

        let reloaded = ConfigStore::open(&path).unwrap();
        assert_eq!(reloaded.settings.char_delay, 1500);
        assert!(!reloaded.settings.dual_servo_mode);
        assert_eq!(reloaded.settings.servo_delay, 750);
    }

    #[test]
    fn test_corrupt_file_falls_back_to_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(DEFAULT_CONFIG_FILE);
        fs::write(&path, "{not json").unwrap();

        let store = ConfigStore::open(&path).unwrap();
        assert_eq!(store.settings, Settings::default());
    }

    #[test]
    fn test_partial_file_fills_missing_keys() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(DEFAULT_CONFIG_FILE);
        fs::write(&path, r#"{"char_delay": 100}"#).unwrap();

        let store = ConfigStore::open(&path).unwrap();
        assert_eq!(store.settings.char_delay, 100);
        assert_eq!(store.settings.servo_delay, 750);
    }

    #[test]
    fn test_set_key_updates_typed_fields() {
        let mut settings = Settings::default();
        settings.set_key("char_delay", "250").unwrap();
        settings.set_key("dual_servo_mode", "false").unwrap();
        assert_eq!(settings.char_delay, 250);
        assert!(!settings.dual_servo_mode);
    }

    #[test]
    fn test_set_key_rejects_unknown_key() {
        let mut settings = Settings::default();
        assert!(matches!(
            settings.set_key("theme", "dark"),
            Err(BrailleError::Configuration(_))
        ));
    }

    #[test]
    fn test_set_key_rejects_bad_values() {
        let mut settings = Settings::default();
        assert!(settings.set_key("char_delay", "-5").is_err());
        assert!(settings.set_key("debug_mode", "maybe").is_err());
    }

    #[test]
    fn test_reset_to_defaults_persists() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(DEFAULT_CONFIG_FILE);

        let mut store = ConfigStore::open(&path).unwrap();
        store.settings.servo_delay = 1;
        store.save().unwrap();
        store.reset_to_defaults().unwrap();

        let reloaded = ConfigStore::open(&path).unwrap();
        assert_eq!(reloaded.settings, Settings::default());
    }
}
