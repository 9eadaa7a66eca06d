use nvpm_power::PowerError;
use nvpm_x86::DecodeError;
use thiserror::Error;

use crate::DeviceError;

/// Power manager errors. Each one degrades a single controller.
#[derive(Error, Debug)]
pub enum Error {
    #[error("decode error: {0}")]
    Decode(#[from] DecodeError),
    /// A required field was never located, or the device lacks the feature.
    #[error("capability unavailable: {0}")]
    CapabilityUnavailable(String),
    /// Identify data the policy cannot use.
    #[error("invalid capability: {0}")]
    InvalidCapability(String),
    #[error("device command failed: {0}")]
    DeviceCommandFailure(#[from] DeviceError),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<PowerError> for Error {
    fn from(err: PowerError) -> Self {
        Self::InvalidCapability(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
