//! Errors of the transaction tier.

use thiserror::Error;

use crate::protocol::constants::{
    DEVICE_ERROR_FUNCTION_NOT_SUPPORTED, DEVICE_ERROR_INVALID_PARAMETER,
};
use crate::transport::TransportError;

pub type Result<T> = std::result::Result<T, Error>;

/// Error code a peripheral put into a response header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceError {
    InvalidParameter,
    FunctionNotSupported,
    /// Any code outside the known table.
    Unknown(u8),
}

impl DeviceError {
    /// Map a non-zero response error code.
    pub fn from_code(code: u8) -> Self {
        match code {
            DEVICE_ERROR_INVALID_PARAMETER => DeviceError::InvalidParameter,
            DEVICE_ERROR_FUNCTION_NOT_SUPPORTED => DeviceError::FunctionNotSupported,
            other => DeviceError::Unknown(other),
        }
    }
}

impl std::fmt::Display for DeviceError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DeviceError::InvalidParameter => write!(f, "invalid parameter"),
            DeviceError::FunctionNotSupported => write!(f, "function not supported"),
            DeviceError::Unknown(code) => write!(f, "unknown error code {}", code),
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    #[error("Required handle or output is absent")]
    Null,

    #[error("Device handle is not initialized")]
    NotInitialized,

    #[error("Endpoint is locked by callback dispatch")]
    Locked,

    #[error("Transaction timed out")]
    Timeout,

    #[error("Wrong response length: expected {expected}, got {actual}")]
    WrongResponseLength { expected: usize, actual: usize },

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("Wrong device type: expected {expected}, found {actual}")]
    WrongDeviceType { expected: u16, actual: u16 },

    #[error("Stream out of sync: expected offset {expected}, got {actual}")]
    StreamOutOfSync { expected: u64, actual: u64 },

    #[error("Device reported {0}")]
    Device(DeviceError),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),
}

impl Error {
    /// Stable numeric code. 0 is reserved for success, device-reported
    /// errors occupy -101..=-103.
    pub fn code(&self) -> i32 {
        match self {
            Error::Timeout => -1,
            Error::Null => -2,
            Error::NotInitialized => -3,
            Error::Locked => -4,
            Error::WrongResponseLength { .. } => -5,
            Error::InvalidParameter(_) => -6,
            Error::WrongDeviceType { .. } => -7,
            Error::StreamOutOfSync { .. } => -8,
            Error::Transport(TransportError::Code(code)) => *code,
            Error::Transport(_) => -20,
            Error::Device(DeviceError::InvalidParameter) => -101,
            Error::Device(DeviceError::FunctionNotSupported) => -102,
            Error::Device(DeviceError::Unknown(_)) => -103,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_device_error_table() {
        use crate::protocol::constants::DEVICE_ERROR_UNKNOWN;

        assert_eq!(DeviceError::from_code(1), DeviceError::InvalidParameter);
        assert_eq!(DeviceError::from_code(2), DeviceError::FunctionNotSupported);
        assert_eq!(
            DeviceError::from_code(DEVICE_ERROR_UNKNOWN),
            DeviceError::Unknown(DEVICE_ERROR_UNKNOWN)
        );
        assert_eq!(DeviceError::from_code(77), DeviceError::Unknown(77));
    }

    #[test]
    fn test_codes_are_distinct() {
        let errors = [
            Error::Null,
            Error::NotInitialized,
            Error::Locked,
            Error::Timeout,
            Error::WrongResponseLength {
                expected: 4,
                actual: 2,
            },
            Error::InvalidParameter("x".into()),
            Error::WrongDeviceType {
                expected: 1,
                actual: 2,
            },
            Error::StreamOutOfSync {
                expected: 0,
                actual: 15,
            },
            Error::Device(DeviceError::InvalidParameter),
            Error::Device(DeviceError::FunctionNotSupported),
            Error::Device(DeviceError::Unknown(9)),
        ];
        let mut codes: Vec<i32> = errors.iter().map(Error::code).collect();
        assert!(codes.iter().all(|&c| c < 0));
        codes.sort_unstable();
        codes.dedup();
        assert_eq!(codes.len(), errors.len());
    }

    #[test]
    fn test_transport_code_passes_through() {
        let err: Error = TransportError::Code(-42).into();
        assert_eq!(err.code(), -42);
    }
}
