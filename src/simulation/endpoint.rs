//! Scripted device side of a USB pipe.
//!
//! A [`ScenarioUsbDevice`] plays a [`ProtocolScenario`] step by step: reads
//! are served from device-to-host steps, writes are checked byte for byte
//! against host-to-device steps. The first deviation from the script ends
//! the session and is recorded on its [`ScenarioReplayResult`]; from then on
//! the pipe reports [`TransferError::Halted`].
//!
//! All transfer methods take `&mut self`, so one device can only be driven
//! from one place at a time.

use std::sync::Arc;
use std::time::{Duration, Instant};

use humantime::format_duration;
use log::{debug, trace, warn};

use crate::diagnostics::ProtocolCoverage;
use crate::error::{Result, TransferError};
use crate::scenario::model::{ProtocolScenario, StepAction};
use crate::simulation::result::{FailureReason, ReplayLogEntry, ReplayState, ScenarioReplayResult};
use crate::usb::packet_types::UsbDirection;

const END_LABEL: &str = "END";

/// Transform applied to device-to-host payloads before the host sees them.
///
/// Installed once when the device is built. Returning `None` leaves the
/// payload untouched.
pub trait PayloadMutator: Send + Sync {
    fn mutate(&self, step_index: usize, payload: &[u8]) -> Option<Vec<u8>>;
}

pub struct ScenarioUsbDevice {
    scenario: ProtocolScenario,
    payloads: Vec<Vec<u8>>,
    current: usize,
    result: ScenarioReplayResult,
    mutator: Option<Arc<dyn PayloadMutator>>,
    coverage: Arc<ProtocolCoverage>,
    started: Instant,
    released: bool,
}

impl ScenarioUsbDevice {
    /// Build a device for `scenario`. Fails only if a step's hex is invalid.
    pub fn new(scenario: ProtocolScenario) -> Result<Self> {
        let payloads = scenario.payloads()?;
        debug!(
            "Simulated device ready: '{}' ({}, {} steps)",
            scenario.name,
            scenario.protocol,
            scenario.steps.len()
        );
        Ok(ScenarioUsbDevice {
            scenario,
            payloads,
            current: 0,
            result: ScenarioReplayResult::default(),
            mutator: None,
            coverage: ProtocolCoverage::global(),
            started: Instant::now(),
            released: false,
        })
    }

    /// Build a device whose reads pass through `mutator`.
    pub fn with_mutator(scenario: ProtocolScenario, mutator: Arc<dyn PayloadMutator>) -> Result<Self> {
        let mut device = Self::new(scenario)?;
        device.mutator = Some(mutator);
        Ok(device)
    }

    /// Record coverage into `coverage` instead of the process-wide counters.
    pub fn with_coverage(mut self, coverage: Arc<ProtocolCoverage>) -> Self {
        self.coverage = coverage;
        self
    }

    pub fn scenario(&self) -> &ProtocolScenario {
        &self.scenario
    }

    pub fn result(&self) -> &ScenarioReplayResult {
        &self.result
    }

    pub fn current_step(&self) -> usize {
        self.current
    }

    pub fn state(&self) -> ReplayState {
        if let Some(reason) = self.result.failure_reason {
            ReplayState::Failed(reason)
        } else if self.result.is_successful {
            ReplayState::Succeeded
        } else {
            ReplayState::Active {
                step_index: self.current,
            }
        }
    }

    /// Serve the next device-to-host step into `buf`.
    ///
    /// A zero `timeout` waits as long as the step's scripted delay. A
    /// non-zero timeout shorter than that delay blocks for the timeout and
    /// returns [`TransferError::Timeout`] without consuming the step.
    pub fn read(&mut self, buf: &mut [u8], timeout: Duration) -> std::result::Result<usize, TransferError> {
        if self.result.is_error || self.released {
            return Err(TransferError::Halted);
        }

        let index = self.current;
        let (direction, action, delay_ms, label) = match self.scenario.steps.get(index) {
            Some(step) => (step.direction, step.action, step.delay_ms, step.label.clone()),
            None => {
                self.fail(FailureReason::ProtocolMismatch, "Read called but no more steps in scenario".to_string());
                return Ok(0);
            }
        };

        if direction != UsbDirection::DeviceToHost {
            self.fail(
                FailureReason::ProtocolMismatch,
                format!("Unexpected read: current step expects {}", direction),
            );
            return Ok(0);
        }

        match action {
            StepAction::Disconnect => {
                self.fail(FailureReason::Disconnected, "Simulated disconnect in reader".to_string());
                return Err(TransferError::NoDevice);
            }
            StepAction::Timeout => {
                self.coverage.hit("replay.read.scripted_timeout");
                self.log("Simulated timeout in reader".to_string(), false);
                return Err(TransferError::Timeout);
            }
            StepAction::Normal => {}
        }

        if !self.wait(delay_ms, timeout) {
            self.coverage.hit("replay.read.caller_timeout");
            self.log(
                format!("Caller timeout of {} elapsed before scripted delay", format_duration(timeout)),
                false,
            );
            return Err(TransferError::Timeout);
        }

        let mutated = self
            .mutator
            .as_ref()
            .and_then(|mutator| mutator.mutate(index, &self.payloads[index]));
        let is_mutated = mutated.is_some();
        let data = mutated.as_deref().unwrap_or(&self.payloads[index]);

        let bytes_read = data.len().min(buf.len());
        buf[..bytes_read].copy_from_slice(&data[..bytes_read]);

        self.coverage.hit(if is_mutated { "replay.read.mutated" } else { "replay.read.ok" });
        let message = if bytes_read > 0 {
            format!(
                "Read {} bytes from device simulation: {} (mutated: {})",
                bytes_read, label, is_mutated
            )
        } else {
            format!("Simulated silence: {} (mutated: {})", label, is_mutated)
        };
        self.log(message, false);
        self.current += 1;
        Ok(bytes_read)
    }

    /// Check `data` against the next host-to-device step.
    pub fn write(&mut self, data: &[u8]) -> std::result::Result<usize, TransferError> {
        if self.result.is_error || self.released {
            return Err(TransferError::Halted);
        }

        let index = self.current;
        let (direction, action, label) = match self.scenario.steps.get(index) {
            Some(step) => (step.direction, step.action, step.label.clone()),
            None => {
                self.fail(FailureReason::ProtocolMismatch, "Write called but no more steps in scenario".to_string());
                return Ok(0);
            }
        };

        if direction != UsbDirection::HostToDevice {
            self.fail(
                FailureReason::ProtocolMismatch,
                format!("Unexpected write: current step expects {}", direction),
            );
            return Ok(0);
        }

        match action {
            StepAction::Disconnect => {
                self.fail(FailureReason::Disconnected, "Simulated disconnect in writer".to_string());
                return Err(TransferError::NoDevice);
            }
            StepAction::Timeout => {
                self.coverage.hit("replay.write.scripted_timeout");
                self.log("Simulated timeout in writer".to_string(), false);
                return Err(TransferError::Timeout);
            }
            StepAction::Normal => {}
        }

        let expected = &self.payloads[index];
        if expected.len() != data.len() {
            let message = format!(
                "Length mismatch in step {}. Expected {} bytes, got {} bytes",
                label,
                expected.len(),
                data.len()
            );
            self.fail(FailureReason::LengthMismatch, message);
            return Ok(0);
        }
        if expected.as_slice() != data {
            let message = format!(
                "Data mismatch in step {}. Expected {}, got {}",
                label,
                hex::encode_upper(expected),
                hex::encode_upper(data)
            );
            self.fail(FailureReason::DataMismatch, message);
            return Ok(0);
        }

        self.coverage.hit("replay.write.ok");
        self.log(format!("Validated write matching step: {}", label), false);
        self.current += 1;
        Ok(data.len())
    }

    /// Close the session. Pending steps with no earlier failure finalize it
    /// as [`FailureReason::PrematureEnd`]; otherwise it finalizes as a
    /// success. Calling this more than once has no further effect.
    pub fn release(&mut self) -> &ScenarioReplayResult {
        if self.released {
            return &self.result;
        }

        let total = self.scenario.steps.len();
        if self.current < total && !self.result.is_error {
            let missing = self.scenario.steps[self.current].label.clone();
            self.fail(
                FailureReason::PrematureEnd,
                format!(
                    "Scenario ended prematurely at step {}/{}. Missing expected step: {}",
                    self.current, total, missing
                ),
            );
        } else if !self.result.is_error {
            self.result.is_successful = true;
            self.result.last_step_index = self.current;
            self.coverage.hit("replay.release.success");
            self.log(format!("Scenario completed: {} steps replayed", total), false);
        }

        self.released = true;
        &self.result
    }

    /// Release and hand back the final result.
    pub fn finish(mut self) -> ScenarioReplayResult {
        self.release();
        std::mem::take(&mut self.result)
    }

    fn wait(&self, delay_ms: u32, timeout: Duration) -> bool {
        if delay_ms == 0 {
            return true;
        }
        let delay = Duration::from_millis(delay_ms as u64);
        if !timeout.is_zero() && delay > timeout {
            std::thread::sleep(timeout);
            return false;
        }
        trace!("Holding step {} for {}", self.current, format_duration(delay));
        std::thread::sleep(delay);
        true
    }

    fn fail(&mut self, reason: FailureReason, message: String) {
        warn!("Replay of '{}' failed at step {}: {}", self.scenario.name, self.current, message);
        self.coverage.hit(&format!("replay.fail.{}", reason));
        self.log(message.clone(), true);
        self.result.is_error = true;
        self.result.error_message = message;
        self.result.failure_reason = Some(reason);
        self.result.last_step_index = self.current;
    }

    fn log(&mut self, message: String, is_error: bool) {
        let label = self
            .scenario
            .steps
            .get(self.current)
            .map(|step| step.label.clone())
            .unwrap_or_else(|| END_LABEL.to_string());
        debug!("[step {} {}] {}", self.current, label, message);
        self.result.logs.push(ReplayLogEntry {
            elapsed_ms: self.started.elapsed().as_millis() as u64,
            step_index: self.current,
            label,
            message,
            is_error,
        });
    }
}

impl Drop for ScenarioUsbDevice {
    fn drop(&mut self) {
        if !self.released {
            let result = self.release();
            if result.failure_reason == Some(FailureReason::PrematureEnd) {
                warn!("Simulated device dropped before the scenario finished: {}", result.error_message);
            }
        }
    }
}
