//! Shared error type

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RfError {
    #[error("invalid parameter: {0}")]
    InvalidParam(String),

    #[error("unsupported sample rate: {0} Hz")]
    InvalidSampleRate(u32),

    #[error("serialization failed: {0}")]
    Serialization(String),
}

pub type RfResult<T> = Result<T, RfError>;
