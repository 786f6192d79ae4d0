//! Safety-gated fault injection for replay sessions.
//!
//! The injector hands out a [`PayloadMutator`] hook which is installed into a
//! [`ScenarioUsbDevice`](crate::simulation::ScenarioUsbDevice) when it is
//! built. Arming a fault afterwards only changes what that hook does.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use humantime::format_duration;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString};

use crate::error::{HilError, Result};
use crate::hil::safety::FaultInjectionSafety;
use crate::simulation::PayloadMutator;

/// Delay used by [`FaultType::PacketDelay`] when no parameter is given.
pub const DEFAULT_FAULT_DELAY_MS: u64 = 1000;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
pub enum FaultType {
    #[default]
    None,
    PacketDrop,
    PacketDelay,
    PacketCorruption,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FaultSpec {
    pub fault_type: FaultType,
    /// Step index the fault applies to. Negative never matches.
    pub target_step_index: i32,
    /// Delay in milliseconds for [`FaultType::PacketDelay`].
    pub parameter: Option<u64>,
}

impl FaultSpec {
    pub fn new(fault_type: FaultType, target_step_index: i32) -> Self {
        FaultSpec {
            fault_type,
            target_step_index,
            parameter: None,
        }
    }

    pub fn with_parameter(mut self, parameter: u64) -> Self {
        self.parameter = Some(parameter);
        self
    }

    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.parameter.unwrap_or(DEFAULT_FAULT_DELAY_MS))
    }

    fn targets(&self, step_index: usize) -> bool {
        usize::try_from(self.target_step_index).map_or(false, |target| target == step_index)
    }
}

struct FaultHook {
    device_id: String,
    safety: Arc<FaultInjectionSafety>,
    active: Arc<Mutex<Option<FaultSpec>>>,
}

impl PayloadMutator for FaultHook {
    fn mutate(&self, step_index: usize, payload: &[u8]) -> Option<Vec<u8>> {
        let spec = self.active.lock().ok()?.clone()?;
        if !spec.targets(step_index) {
            return None;
        }
        // Re-checked on every read so an emergency stop lands immediately.
        if !self.safety.is_approved(&self.device_id) {
            debug!("Skipping {} at step {}: device {} no longer approved", spec.fault_type, step_index, self.device_id);
            return None;
        }

        match spec.fault_type {
            FaultType::None => None,
            FaultType::PacketDrop => {
                info!("Injected fault: dropped step {} ({} bytes)", step_index, payload.len());
                Some(Vec::new())
            }
            FaultType::PacketDelay => {
                let delay = spec.delay();
                info!("Injected fault: delaying step {} by {}", step_index, format_duration(delay));
                std::thread::sleep(delay);
                Some(payload.to_vec())
            }
            FaultType::PacketCorruption => {
                let mut corrupted = payload.to_vec();
                if let Some(first) = corrupted.first_mut() {
                    *first ^= 0xFF;
                }
                info!("Injected fault: corrupted first byte of step {}", step_index);
                Some(corrupted)
            }
        }
    }
}

/// Arms and clears faults for one approved device.
pub struct HardwareFaultInjector {
    device_id: String,
    safety: Arc<FaultInjectionSafety>,
    active: Arc<Mutex<Option<FaultSpec>>>,
}

impl HardwareFaultInjector {
    pub fn new(device_id: impl Into<String>, safety: Arc<FaultInjectionSafety>) -> Self {
        HardwareFaultInjector {
            device_id: device_id.into(),
            safety,
            active: Arc::new(Mutex::new(None)),
        }
    }

    pub fn device_id(&self) -> &str {
        &self.device_id
    }

    /// Mutation hook to pass to
    /// [`ScenarioUsbDevice::with_mutator`](crate::simulation::ScenarioUsbDevice::with_mutator).
    pub fn hook(&self) -> Arc<dyn PayloadMutator> {
        Arc::new(FaultHook {
            device_id: self.device_id.clone(),
            safety: self.safety.clone(),
            active: self.active.clone(),
        })
    }

    /// Arm `spec`. Refused without touching the current fault when the device
    /// is not approved or the emergency stop is active.
    pub fn set_fault(&self, spec: FaultSpec) -> Result<()> {
        if !self.safety.is_approved(&self.device_id) {
            let reason = if self.safety.is_emergency_stop_active() {
                "emergency stop is active"
            } else {
                "device is not approved for fault injection"
            };
            warn!("Refused to arm {} on {}: {}", spec.fault_type, self.device_id, reason);
            return Err(HilError::OperationNotPermitted {
                device_id: self.device_id.clone(),
                reason: reason.to_string(),
            });
        }

        info!(
            "Armed {} on {} at step {}",
            spec.fault_type, self.device_id, spec.target_step_index
        );
        let mut active = self.active.lock().map_err(|_| HilError::OperationNotPermitted {
            device_id: self.device_id.clone(),
            reason: "fault state is poisoned".to_string(),
        })?;
        *active = Some(spec);
        Ok(())
    }

    pub fn clear_fault(&self) {
        if let Ok(mut active) = self.active.lock() {
            if active.take().is_some() {
                info!("Cleared fault on {}", self.device_id);
            }
        }
    }

    pub fn is_armed(&self) -> bool {
        self.active_fault()
            .map_or(false, |spec| spec.fault_type != FaultType::None)
    }

    pub fn active_fault(&self) -> Option<FaultSpec> {
        self.active.lock().ok().and_then(|active| active.clone())
    }
}
