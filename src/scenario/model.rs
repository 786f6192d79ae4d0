use std::path::Path;

use log::debug;
use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString};

use crate::error::{HilError, Result};
use crate::usb::packet_types::UsbDirection;

/// What a step does besides (or instead of) exchanging its payload.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
pub enum StepAction {
    #[default]
    Normal,
    /// Fail the pipe as if the device had been unplugged.
    Disconnect,
    /// Report a timeout without consuming the step.
    Timeout,
}

/// One directional transfer within a scenario.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScenarioStep {
    pub direction: UsbDirection,
    #[serde(default)]
    pub label: String,
    /// Canonical payload as uppercase hex.
    #[serde(default)]
    pub data_hex: String,
    #[serde(default)]
    pub delay_ms: u32,
    #[serde(default)]
    pub action: StepAction,
}

impl ScenarioStep {
    pub fn new(direction: UsbDirection, label: impl Into<String>, payload: &[u8]) -> Self {
        ScenarioStep {
            direction,
            label: label.into(),
            data_hex: hex::encode_upper(payload),
            delay_ms: 0,
            action: StepAction::Normal,
        }
    }

    pub fn with_delay(mut self, delay_ms: u32) -> Self {
        self.delay_ms = delay_ms;
        self
    }

    pub fn with_action(mut self, action: StepAction) -> Self {
        self.action = action;
        self
    }

    /// Decode the payload bytes.
    pub fn payload(&self) -> std::result::Result<Vec<u8>, hex::FromHexError> {
        hex::decode(&self.data_hex)
    }
}

/// A named, ordered script of protocol steps.
///
/// Step order is the replay order; nothing in the crate reorders steps.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProtocolScenario {
    pub name: String,
    pub protocol: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub steps: Vec<ScenarioStep>,
}

impl ProtocolScenario {
    pub fn new(name: impl Into<String>, protocol: impl Into<String>) -> Self {
        ProtocolScenario {
            name: name.into(),
            protocol: protocol.into(),
            description: String::new(),
            steps: Vec::new(),
        }
    }

    pub fn with_step(mut self, step: ScenarioStep) -> Self {
        self.steps.push(step);
        self
    }

    /// Check every step's payload hex and normalise it to uppercase.
    pub fn normalize(&mut self) -> Result<()> {
        for (index, step) in self.steps.iter_mut().enumerate() {
            if step.data_hex.len() % 2 != 0 {
                return Err(HilError::InvalidHex {
                    index,
                    reason: format!("odd length {}", step.data_hex.len()),
                });
            }
            if let Some(bad) = step.data_hex.chars().find(|c| !c.is_ascii_hexdigit()) {
                return Err(HilError::InvalidHex {
                    index,
                    reason: format!("non-hex character {:?}", bad),
                });
            }
            step.data_hex.make_ascii_uppercase();
        }
        Ok(())
    }

    /// Decode all payloads in step order.
    pub fn payloads(&self) -> Result<Vec<Vec<u8>>> {
        self.steps
            .iter()
            .enumerate()
            .map(|(index, step)| {
                step.payload().map_err(|e| HilError::InvalidHex {
                    index,
                    reason: e.to_string(),
                })
            })
            .collect()
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let mut scenario: ProtocolScenario = serde_json::from_str(json)?;
        scenario.normalize()?;
        Ok(scenario)
    }

    pub fn to_json_pretty(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|e| HilError::io(path, e))?;
        let scenario = Self::from_json(&json)?;
        debug!(
            "Loaded scenario '{}' ({}, {} steps) from {}",
            scenario.name,
            scenario.protocol,
            scenario.steps.len(),
            path.display()
        );
        Ok(scenario)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let json = self.to_json_pretty()?;
        std::fs::write(path, json).map_err(|e| HilError::io(path, e))
    }
}
