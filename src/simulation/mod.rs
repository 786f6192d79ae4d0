pub mod endpoint;
pub mod result;

pub use self::endpoint::{PayloadMutator, ScenarioUsbDevice};
pub use self::result::{FailureReason, ReplayLogEntry, ReplayState, ScenarioReplayResult};
