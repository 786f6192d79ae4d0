//! Turns ingested packets into a replayable [`ProtocolScenario`].

use log::{debug, info};
use serde::{Deserialize, Serialize};
use time::macros::format_description;
use time::OffsetDateTime;

use crate::scenario::hints::LabelRegistry;
use crate::scenario::model::{ProtocolScenario, ScenarioStep, StepAction};
use crate::usb::packet_types::UsbPacket;

/// Hex length above which redaction zeroes a payload.
pub const DEFAULT_REDACTION_THRESHOLD_HEX: usize = 1024;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversionOptions {
    pub redact_user_data: bool,
    pub redaction_threshold_hex: usize,
    pub device_name: String,
}

impl Default for ConversionOptions {
    fn default() -> Self {
        ConversionOptions {
            redact_user_data: true,
            redaction_threshold_hex: DEFAULT_REDACTION_THRESHOLD_HEX,
            device_name: "CapturedDevice".to_string(),
        }
    }
}

pub struct ScenarioSynthesizer {
    hints: LabelRegistry,
}

impl ScenarioSynthesizer {
    pub fn new(hints: LabelRegistry) -> Self {
        ScenarioSynthesizer { hints }
    }

    pub fn hints(&self) -> &LabelRegistry {
        &self.hints
    }

    pub fn synthesize(&self, packets: &[UsbPacket], protocol: &str, options: &ConversionOptions) -> ProtocolScenario {
        let mut scenario = ProtocolScenario {
            name: format!("{}_{}_{}", options.device_name, protocol, today()),
            protocol: protocol.to_string(),
            description: format!("Auto-captured {} scenario from real hardware.", protocol),
            steps: Vec::with_capacity(packets.len()),
        };

        let mut previous_us: Option<i64> = None;
        let mut redacted = 0usize;
        for packet in packets {
            let delay_ms = match previous_us {
                Some(previous) => delay_between(previous, packet.timestamp_us),
                None => 0,
            };
            previous_us = Some(packet.timestamp_us);

            let label = match &packet.label {
                Some(label) => label.clone(),
                None => self.hints.label(protocol, &packet.payload),
            };

            let mut data_hex = hex::encode_upper(&packet.payload);
            if options.redact_user_data && data_hex.len() > options.redaction_threshold_hex {
                data_hex = redact(&data_hex);
                redacted += 1;
            }

            scenario.steps.push(ScenarioStep {
                direction: packet.direction,
                label,
                data_hex,
                delay_ms,
                action: StepAction::Normal,
            });
        }

        if redacted > 0 {
            debug!("Redacted {} oversized payloads", redacted);
        }
        info!("Synthesized scenario '{}' with {} steps", scenario.name, scenario.steps.len());
        scenario
    }
}

impl Default for ScenarioSynthesizer {
    fn default() -> Self {
        Self::new(LabelRegistry::builtin())
    }
}

/// Whole milliseconds between two capture timestamps. Out-of-order
/// timestamps clamp to zero.
fn delay_between(previous_us: i64, current_us: i64) -> u32 {
    let delta_ms = current_us.saturating_sub(previous_us) / 1000;
    delta_ms.clamp(0, u32::MAX as i64) as u32
}

/// Same length, no content.
fn redact(hex: &str) -> String {
    "0".repeat(hex.len())
}

fn today() -> String {
    let now = OffsetDateTime::now_local().unwrap_or_else(|_| OffsetDateTime::now_utc());
    now.format(format_description!("[year][month][day]"))
        .unwrap_or_else(|_| now.date().to_string())
}
