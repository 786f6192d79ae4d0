//! Approval gate for fault injection.
//!
//! A device id must be approved before any fault can be armed against it.
//! The emergency stop overrides every approval until it is reset.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use lazy_static::lazy_static;
use log::{info, warn};

lazy_static! {
    static ref GLOBAL_SAFETY: Arc<FaultInjectionSafety> = Arc::new(FaultInjectionSafety::new());
}

#[derive(Debug, Default)]
pub struct FaultInjectionSafety {
    approved: Mutex<HashSet<String>>,
    emergency_stop: AtomicBool,
}

impl FaultInjectionSafety {
    pub fn new() -> Self {
        Self::default()
    }

    /// Process-wide gate shared by operator tooling and replay threads.
    pub fn global() -> Arc<FaultInjectionSafety> {
        GLOBAL_SAFETY.clone()
    }

    pub fn approve(&self, device_id: &str) {
        if let Ok(mut approved) = self.approved.lock() {
            if approved.insert(device_id.to_string()) {
                info!("Device {} approved for fault injection", device_id);
            }
        }
    }

    pub fn is_approved(&self, device_id: &str) -> bool {
        if self.is_emergency_stop_active() {
            return false;
        }
        self.approved
            .lock()
            .map(|approved| approved.contains(device_id))
            .unwrap_or(false)
    }

    pub fn trigger_emergency_stop(&self) {
        warn!("Fault injection emergency stop triggered");
        self.emergency_stop.store(true, Ordering::SeqCst);
    }

    pub fn reset_emergency_stop(&self) {
        info!("Fault injection emergency stop reset");
        self.emergency_stop.store(false, Ordering::SeqCst);
    }

    pub fn is_emergency_stop_active(&self) -> bool {
        self.emergency_stop.load(Ordering::SeqCst)
    }

    /// Approval check that also refuses targets with factory reset
    /// protection enabled.
    pub fn is_safety_check_passed(&self, device_id: &str, frp_enabled: bool) -> bool {
        !frp_enabled && self.is_approved(device_id)
    }
}
