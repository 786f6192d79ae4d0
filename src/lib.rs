//! Hardware-in-the-loop harness for USB bootloader protocols.
//!
//! A bus capture is ingested into [`UsbPacket`]s, synthesized into a
//! [`ProtocolScenario`], and then either replayed by a
//! [`ScenarioUsbDevice`] against a real protocol client or compared with a
//! golden scenario by [`hil::validate`].

pub mod config;
pub mod data;
pub mod diagnostics;
pub mod error;
pub mod hil;
pub mod ops;
pub mod scenario;
pub mod simulation;
pub mod usb;

pub use crate::config::HilConfig;
pub use crate::error::{HilError, Result, TransferError};
pub use crate::scenario::{ConversionOptions, ProtocolScenario, ScenarioStep, ScenarioSynthesizer, StepAction};
pub use crate::simulation::{FailureReason, PayloadMutator, ScenarioReplayResult, ScenarioUsbDevice};
pub use crate::usb::{UsbDirection, UsbPacket};
