use thiserror::Error;

/// Errors from identify parsing and power model construction.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PowerError {
    #[error("identify data too short: {len} bytes, need at least {need}")]
    TooShort { len: usize, need: usize },

    #[error("invalid power capability: {0}")]
    InvalidCapability(String),
}

pub type Result<T> = std::result::Result<T, PowerError>;
