//! Functions every peripheral implements.

use super::{Device, Result};
use crate::protocol::constants::{
    FUNCTION_GET_IDENTITY, FUNCTION_READ_UID, FUNCTION_RESET, IDENTITY_RESPONSE_LEN, UID_FIELD_LEN,
};
use crate::protocol::PayloadReader;
use crate::transport::Transport;

/// Answer to `GET_IDENTITY`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceIdentity {
    pub uid: String,
    pub connected_uid: String,
    pub position: char,
    pub hardware_version: [u8; 3],
    pub firmware_version: [u8; 3],
    pub device_identifier: u16,
}

impl DeviceIdentity {
    pub fn parse(payload: &[u8]) -> Result<Self> {
        let mut reader = PayloadReader::new(payload);
        Ok(Self {
            uid: reader.read_str::<UID_FIELD_LEN>()?,
            connected_uid: reader.read_str::<UID_FIELD_LEN>()?,
            position: reader.read_char()?,
            hardware_version: reader.read_array::<3>()?,
            firmware_version: reader.read_array::<3>()?,
            device_identifier: reader.read_u16()?,
        })
    }

    /// Firmware version as `major.minor.patch`.
    pub fn firmware_version_string(&self) -> String {
        let [major, minor, patch] = self.firmware_version;
        format!("{}.{}.{}", major, minor, patch)
    }
}

impl<T: Transport> Device<T> {
    pub fn get_identity(&mut self) -> Result<DeviceIdentity> {
        let payload = self.call(FUNCTION_GET_IDENTITY, &[], IDENTITY_RESPONSE_LEN)?;
        DeviceIdentity::parse(&payload)
    }

    pub fn read_uid(&mut self) -> Result<u32> {
        let payload = self.call(FUNCTION_READ_UID, &[], 4)?;
        PayloadReader::new(&payload).read_u32()
    }

    /// Restart the peripheral. Handlers stay registered.
    pub fn reset(&mut self) -> Result<()> {
        self.call(FUNCTION_RESET, &[], 0)?;
        Ok(())
    }
}
