//! Error types shared across the harness.

use std::path::PathBuf;
use thiserror::Error;

/// Errors raised by the library surface.
///
/// Replay failures are not in here: they are recorded on the
/// [`ScenarioReplayResult`](crate::simulation::ScenarioReplayResult) of the
/// session that hit them.
#[derive(Error, Debug)]
pub enum HilError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed scenario JSON: {0}")]
    ScenarioJson(#[from] serde_json::Error),

    #[error("invalid payload hex at step {index}: {reason}")]
    InvalidHex { index: usize, reason: String },

    #[error("operation not permitted for device {device_id}: {reason}")]
    OperationNotPermitted { device_id: String, reason: String },
}

impl HilError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        HilError::Io {
            path: path.into(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, HilError>;

/// Outcome of a single simulated transfer that did not complete normally.
///
/// Names follow the libusb error codes a real pipe would surface.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferError {
    #[error("operation timed out")]
    Timeout,

    #[error("no such device (it may have been disconnected)")]
    NoDevice,

    #[error("endpoint halted after a replay failure")]
    Halted,
}
