//! Protocol constants for the peripheral packet channel.

// ============================================================================
// Device handles
// ============================================================================

/// Validity tag stamped into every live device handle.
pub const DEVICE_MAGIC: u16 = 0x5446;

/// Default per-transaction deadline (100ms).
pub const DEFAULT_TIMEOUT_US: u64 = 100_000;

/// Largest request or response payload a single packet can carry.
pub const MAX_PAYLOAD_LEN: usize = 64;

// ============================================================================
// Transport tick bits
// ============================================================================

/// Deadline passed before the exchange completed.
pub const TICK_TIMEOUT: u8 = 0x01;

/// A response packet is waiting in the receive buffer.
pub const TICK_PACKET_RECEIVED: u8 = 0x02;

// ============================================================================
// Device-reported error codes (response header)
// ============================================================================

pub const DEVICE_ERROR_OK: u8 = 0;
pub const DEVICE_ERROR_INVALID_PARAMETER: u8 = 1;
pub const DEVICE_ERROR_FUNCTION_NOT_SUPPORTED: u8 = 2;
pub const DEVICE_ERROR_UNKNOWN: u8 = 3;

// ============================================================================
// Common function IDs (present on every peripheral)
// ============================================================================

pub const FUNCTION_SET_WRITE_FIRMWARE_POINTER: u8 = 237;
pub const FUNCTION_SET_STATUS_LED_CONFIG: u8 = 239;
pub const FUNCTION_RESET: u8 = 243;
pub const FUNCTION_WRITE_UID: u8 = 248;
pub const FUNCTION_READ_UID: u8 = 249;
pub const FUNCTION_GET_IDENTITY: u8 = 255;

/// Response length of `GET_IDENTITY`: uid(8) + connected uid(8) + position(1)
/// + hardware version(3) + firmware version(3) + device identifier(2).
pub const IDENTITY_RESPONSE_LEN: usize = 25;

/// Width of the NUL-padded uid strings inside `GET_IDENTITY`.
pub const UID_FIELD_LEN: usize = 8;
