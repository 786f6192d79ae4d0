use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

pub const REGISTRY_VERSION: u32 = 1;

/// A device whose recorded scenarios are the known-good reference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GoldenDeviceInfo {
    pub device_id: String,
    #[serde(default)]
    pub manufacturer: String,
    #[serde(default)]
    pub model: String,
    #[serde(default)]
    pub firmware_version: String,
    #[serde(default)]
    pub chipset: Option<String>,
    /// Protocol tag -> scenario file path.
    #[serde(default)]
    pub scenarios: BTreeMap<String, String>,
    #[serde(with = "time::serde::rfc3339")]
    pub registered_at: OffsetDateTime,
}

impl GoldenDeviceInfo {
    pub fn new(device_id: impl Into<String>, model: impl Into<String>) -> Self {
        GoldenDeviceInfo {
            device_id: device_id.into(),
            manufacturer: String::new(),
            model: model.into(),
            firmware_version: String::new(),
            chipset: None,
            scenarios: BTreeMap::new(),
            registered_at: OffsetDateTime::UNIX_EPOCH,
        }
    }

    pub fn with_scenario(mut self, protocol: impl Into<String>, path: impl Into<String>) -> Self {
        self.scenarios.insert(protocol.into(), path.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GoldenRegistryRoot {
    #[serde(default)]
    pub devices: Vec<GoldenDeviceInfo>,
    #[serde(default = "default_version")]
    pub version: u32,
}

impl Default for GoldenRegistryRoot {
    fn default() -> Self {
        GoldenRegistryRoot {
            devices: Vec::new(),
            version: REGISTRY_VERSION,
        }
    }
}

fn default_version() -> u32 {
    REGISTRY_VERSION
}
