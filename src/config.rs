//! Harness configuration.
//!
//! Read from `config.json` in the platform config directory
//! (`~/.config/usbhil/` on Linux). Every field has a default, so a missing
//! or partial file is fine.

use std::fs;
use std::path::{Path, PathBuf};

use directories::ProjectDirs;
use log::{debug, warn};
use serde::{Deserialize, Serialize};

use crate::hil::validator::DEFAULT_TIMING_TOLERANCE;
use crate::scenario::synthesizer::{ConversionOptions, DEFAULT_REDACTION_THRESHOLD_HEX};

pub const CONFIG_FILE_NAME: &str = "config.json";
const REGISTRY_DIR_NAME: &str = "hil_registry";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HilConfig {
    pub registry_dir: PathBuf,
    pub timing_tolerance: f64,
    pub redact_user_data: bool,
    pub redaction_threshold_hex: usize,
    pub device_name: String,
}

impl Default for HilConfig {
    fn default() -> Self {
        HilConfig {
            registry_dir: default_registry_dir(),
            timing_tolerance: DEFAULT_TIMING_TOLERANCE,
            redact_user_data: true,
            redaction_threshold_hex: DEFAULT_REDACTION_THRESHOLD_HEX,
            device_name: "CapturedDevice".to_string(),
        }
    }
}

impl HilConfig {
    /// Load from the platform config file, or defaults if there is none.
    pub fn load() -> Self {
        match default_config_path() {
            Some(path) => Self::load_from(&path),
            None => Self::default(),
        }
    }

    /// Load from `path`. Missing or malformed files give the defaults.
    pub fn load_from(path: &Path) -> Self {
        let json = match fs::read_to_string(path) {
            Ok(json) => json,
            Err(_) => {
                debug!("No config at {}, using defaults", path.display());
                return Self::default();
            }
        };
        match serde_json::from_str(&json) {
            Ok(config) => {
                debug!("Loaded config from {}", path.display());
                config
            }
            Err(e) => {
                warn!("Ignoring malformed config {}: {}", path.display(), e);
                Self::default()
            }
        }
    }

    pub fn conversion_options(&self) -> ConversionOptions {
        ConversionOptions {
            redact_user_data: self.redact_user_data,
            redaction_threshold_hex: self.redaction_threshold_hex,
            device_name: self.device_name.clone(),
        }
    }
}

fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("", "", "usbhil")
}

pub fn default_config_path() -> Option<PathBuf> {
    project_dirs().map(|dirs| dirs.config_dir().join(CONFIG_FILE_NAME))
}

/// `<data_dir>/hil_registry`, or `./hil_registry` without a home directory.
pub fn default_registry_dir() -> PathBuf {
    project_dirs()
        .map(|dirs| dirs.data_dir().join(REGISTRY_DIR_NAME))
        .unwrap_or_else(|| PathBuf::from(REGISTRY_DIR_NAME))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn missing_file_gives_defaults() {
        let dir = tempdir().unwrap();
        let config = HilConfig::load_from(&dir.path().join(CONFIG_FILE_NAME));
        assert_eq!(config, HilConfig::default());
        assert_eq!(config.timing_tolerance, 0.2);
        assert!(config.redact_user_data);
        assert_eq!(config.redaction_threshold_hex, 1024);
        assert!(config.registry_dir.ends_with("hil_registry"));
    }

    #[test]
    fn partial_file_keeps_remaining_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);
        fs::write(&path, r#"{ "timing_tolerance": 0.5, "device_name": "Pixel" }"#).unwrap();
        let config = HilConfig::load_from(&path);
        assert_eq!(config.timing_tolerance, 0.5);
        assert_eq!(config.device_name, "Pixel");
        assert!(config.redact_user_data);

        let options = config.conversion_options();
        assert_eq!(options.device_name, "Pixel");
        assert_eq!(options.redaction_threshold_hex, 1024);
    }

    #[test]
    fn malformed_file_gives_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);
        fs::write(&path, "timing_tolerance = 0.5").unwrap();
        assert_eq!(HilConfig::load_from(&path), HilConfig::default());
    }
}
