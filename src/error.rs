//! Error types for xCAT response decoding and stat lookups.

use thiserror::Error;

/// Errors surfaced by the parsers, the xCAT client and the inspector.
#[derive(Debug, Error)]
pub enum ZvmError {
    /// The payload did not have the expected shape (bad JSON, short line set,
    /// non-numeric counter, missing keyword).
    #[error("Invalid xCAT response data: {0}")]
    MalformedResponse(String),

    /// No record exists for the instance even after a targeted refresh.
    #[error("Can not get vm info for {0}")]
    InstanceNotFound(String),

    /// The instance is powered off, so performance data is unavailable.
    #[error("Can not get vm info in shutdown state for {0}")]
    InstanceShutOff(String),

    /// The remote call failed or returned nothing usable.
    #[error("No data from xCAT: {0}")]
    NoData(String),

    /// Configuration is missing a required value.
    #[error("Invalid configuration: {0}")]
    Config(String),
}

impl ZvmError {
    pub fn malformed(msg: impl Into<String>) -> Self {
        ZvmError::MalformedResponse(msg.into())
    }

    pub fn no_data(msg: impl Into<String>) -> Self {
        ZvmError::NoData(msg.into())
    }
}

/// Convenience alias used throughout the library.
pub type Result<T> = std::result::Result<T, ZvmError>;
