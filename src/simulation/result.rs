use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString};

/// Why a replay session stopped early.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
pub enum FailureReason {
    /// The host read when the script expected a write, or the reverse.
    ProtocolMismatch,
    LengthMismatch,
    DataMismatch,
    Disconnected,
    /// Released with steps still pending.
    PrematureEnd,
}

/// Where a replay session stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplayState {
    Active { step_index: usize },
    Succeeded,
    Failed(FailureReason),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplayLogEntry {
    /// Milliseconds since the session was created.
    pub elapsed_ms: u64,
    pub step_index: usize,
    /// Label of the step at `step_index`, or `END` once past the last step.
    pub label: String,
    pub message: String,
    pub is_error: bool,
}

/// Outcome of one replay session. Written only by the endpoint that owns it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScenarioReplayResult {
    pub is_successful: bool,
    pub is_error: bool,
    pub logs: Vec<ReplayLogEntry>,
    pub error_message: String,
    pub failure_reason: Option<FailureReason>,
    pub last_step_index: usize,
}

impl ScenarioReplayResult {
    pub fn errors(&self) -> impl Iterator<Item = &ReplayLogEntry> {
        self.logs.iter().filter(|entry| entry.is_error)
    }
}
