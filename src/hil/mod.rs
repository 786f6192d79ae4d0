//! Golden-reference tooling: fault injection, validation, the golden device
//! registry and HTML reporting.

pub mod fault_injector;
pub mod models;
pub mod registry;
pub mod reporter;
pub mod safety;
pub mod validator;

pub use self::fault_injector::{FaultSpec, FaultType, HardwareFaultInjector};
pub use self::models::{GoldenDeviceInfo, GoldenRegistryRoot};
pub use self::registry::GoldenDeviceRegistry;
pub use self::safety::FaultInjectionSafety;
pub use self::validator::{validate, DifferenceType, PacketDiff, ValidationResult};
