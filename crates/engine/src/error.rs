//! Engine error type shared by every calculation module.

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum EngineError {
    /// A caller-supplied value is outside its legal range.
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    /// The channel configuration cannot drive a calculation (e.g. the
    /// channel is not in automatic mode, or references no plant).
    #[error("configuration error: {0}")]
    ConfigurationError(String),

    /// Internal data is missing or inconsistent (unknown catalog index,
    /// unknown channel id).
    #[error("invalid data: {0}")]
    InvalidData(String),

    /// A sensor or peripheral reported a fault.
    #[error("hardware failure: {0}")]
    HardwareFailure(String),

    /// An operation did not complete in time.
    #[error("timeout: {0}")]
    Timeout(String),
}

pub type Result<T> = std::result::Result<T, EngineError>;

// ===========================================================================
// Tests
// ===========================================================================
