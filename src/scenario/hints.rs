//! Protocol label hints.
//!
//! Labels are diagnostic hints attached to scenario steps, not protocol
//! decoders. Each protocol tag maps to one [`LabelHeuristic`]; the table is
//! assembled explicitly at startup and only read afterwards.

use std::collections::HashMap;

use byteorder::{ByteOrder, LittleEndian};
use rand::Rng;

use crate::data::firehose_tags::{get_firehose_xml_label, FIREHOSE_BLOCK_SIZES};
use crate::data::sahara_commands::get_sahara_command_label;

/// Names a payload for a specific protocol.
pub trait LabelHeuristic: Send + Sync {
    /// Returns `None` when the heuristic has nothing to say about the payload.
    fn label(&self, payload: &[u8]) -> Option<String>;
}

/// Qualcomm Sahara: first little-endian dword is the command code.
pub struct SaharaHints;

impl LabelHeuristic for SaharaHints {
    fn label(&self, payload: &[u8]) -> Option<String> {
        if payload.len() < 4 {
            return Some("Sahara_Fragment".to_string());
        }
        let command = LittleEndian::read_u32(&payload[0..4]);
        Some(match get_sahara_command_label(command) {
            Some(label) => label.to_string(),
            None => format!("Sahara_Cmd_0x{:02X}", command),
        })
    }
}

/// Qualcomm Firehose: XML commands and raw data blocks.
pub struct FirehoseHints;

impl LabelHeuristic for FirehoseHints {
    fn label(&self, payload: &[u8]) -> Option<String> {
        let is_block = FIREHOSE_BLOCK_SIZES.contains(&payload.len());
        let label = match std::str::from_utf8(payload) {
            Ok(text) if text.trim().starts_with("<?xml") => {
                get_firehose_xml_label(text).unwrap_or("Firehose_Xml")
            }
            _ if is_block => "Firehose_DataPayload",
            Ok(_) => "Firehose_RawData",
            Err(_) => "Firehose_Binary",
        };
        Some(label.to_string())
    }
}

/// Lookup table from protocol tag (case-insensitive) to heuristic.
pub struct LabelRegistry {
    heuristics: HashMap<String, Box<dyn LabelHeuristic>>,
}

impl LabelRegistry {
    pub fn empty() -> Self {
        LabelRegistry {
            heuristics: HashMap::new(),
        }
    }

    /// Registry with the built-in `sahara` and `firehose` heuristics.
    pub fn builtin() -> Self {
        let mut registry = Self::empty();
        registry.register("sahara", SaharaHints);
        registry.register("firehose", FirehoseHints);
        registry
    }

    pub fn register(&mut self, protocol: &str, heuristic: impl LabelHeuristic + 'static) {
        self.heuristics
            .insert(protocol.to_ascii_lowercase(), Box::new(heuristic));
    }

    pub fn supports(&self, protocol: &str) -> bool {
        self.heuristics.contains_key(&protocol.to_ascii_lowercase())
    }

    pub fn protocols(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.heuristics.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Label a payload, falling back to a random `Step_xxxx` identifier.
    pub fn label(&self, protocol: &str, payload: &[u8]) -> String {
        self.heuristics
            .get(&protocol.to_ascii_lowercase())
            .and_then(|heuristic| heuristic.label(payload))
            .unwrap_or_else(fallback_label)
    }
}

impl Default for LabelRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

fn fallback_label() -> String {
    format!("Step_{:04x}", rand::thread_rng().gen::<u16>())
}
