//! EVSE charge controller, second revision.

use super::{getter, setter};
use crate::device::{Device, DeviceSpec, FunctionSpec, Result};
use crate::protocol::PayloadReader;
use crate::protocol::constants::*;
use crate::stream::{Chunk, StreamStatus, stream_out};
use crate::transport::Transport;

pub const DEVICE_IDENTIFIER: u16 = 2167;
pub const DEVICE_DISPLAY_NAME: &str = "EVSE Bricklet 2.0";

pub const FUNCTION_GET_STATE: u8 = 1;
pub const FUNCTION_SET_MAX_CHARGING_CURRENT: u8 = 4;
pub const FUNCTION_GET_MAX_CHARGING_CURRENT: u8 = 5;
pub const FUNCTION_START_CHARGING: u8 = 6;
pub const FUNCTION_STOP_CHARGING: u8 = 7;
pub const FUNCTION_SET_CHARGING_AUTOSTART: u8 = 8;
pub const FUNCTION_GET_CHARGING_AUTOSTART: u8 = 9;
pub const FUNCTION_GET_ENERGY_METER_VALUES: u8 = 10;
pub const FUNCTION_GET_ENERGY_METER_DETAILED_VALUES_LOW_LEVEL: u8 = 11;
pub const FUNCTION_RESET_ENERGY_METER: u8 = 13;
pub const FUNCTION_RESET_DC_FAULT_CURRENT: u8 = 15;
pub const FUNCTION_SET_GPIO_CONFIGURATION: u8 = 16;
pub const FUNCTION_SET_MANAGED: u8 = 20;
pub const FUNCTION_SET_MANAGED_CURRENT: u8 = 21;
pub const FUNCTION_SET_DATA_STORAGE: u8 = 23;
pub const FUNCTION_SET_BUTTON_CONFIGURATION: u8 = 26;
pub const FUNCTION_SET_CONTROL_PILOT_CONFIGURATION: u8 = 30;

/// Element count of the detailed energy meter stream.
pub const DETAILED_VALUES_LENGTH: usize = 85;

/// Floats carried by one low-level chunk.
pub const DETAILED_VALUES_CHUNK_LEN: usize = 15;

static FUNCTIONS: &[FunctionSpec] = &[
    getter(FUNCTION_GET_STATE, "get_state"),
    setter(FUNCTION_SET_MAX_CHARGING_CURRENT, "set_max_charging_current", 0, false),
    getter(FUNCTION_GET_MAX_CHARGING_CURRENT, "get_max_charging_current"),
    setter(FUNCTION_START_CHARGING, "start_charging", 1, false),
    setter(FUNCTION_STOP_CHARGING, "stop_charging", 2, false),
    setter(FUNCTION_SET_CHARGING_AUTOSTART, "set_charging_autostart", 3, false),
    getter(FUNCTION_GET_CHARGING_AUTOSTART, "get_charging_autostart"),
    getter(FUNCTION_GET_ENERGY_METER_VALUES, "get_energy_meter_values"),
    getter(
        FUNCTION_GET_ENERGY_METER_DETAILED_VALUES_LOW_LEVEL,
        "get_energy_meter_detailed_values_low_level",
    ),
    setter(FUNCTION_RESET_ENERGY_METER, "reset_energy_meter", 4, false),
    setter(FUNCTION_RESET_DC_FAULT_CURRENT, "reset_dc_fault_current", 5, true),
    setter(FUNCTION_SET_GPIO_CONFIGURATION, "set_gpio_configuration", 6, false),
    setter(FUNCTION_SET_MANAGED, "set_managed", 7, true),
    setter(FUNCTION_SET_MANAGED_CURRENT, "set_managed_current", 8, false),
    setter(FUNCTION_SET_DATA_STORAGE, "set_data_storage", 9, false),
    setter(FUNCTION_SET_BUTTON_CONFIGURATION, "set_button_configuration", 10, false),
    setter(
        FUNCTION_SET_CONTROL_PILOT_CONFIGURATION,
        "set_control_pilot_configuration",
        11,
        false,
    ),
    setter(FUNCTION_SET_WRITE_FIRMWARE_POINTER, "set_write_firmware_pointer", 12, false),
    setter(FUNCTION_SET_STATUS_LED_CONFIG, "set_status_led_config", 13, false),
    setter(FUNCTION_RESET, "reset", 14, false),
    setter(FUNCTION_WRITE_UID, "write_uid", 15, false),
    getter(FUNCTION_READ_UID, "read_uid"),
    getter(FUNCTION_GET_IDENTITY, "get_identity"),
];

pub static SPEC: DeviceSpec = DeviceSpec {
    device_identifier: DEVICE_IDENTIFIER,
    display_name: DEVICE_DISPLAY_NAME,
    functions: FUNCTIONS,
    callbacks: &[],
};

/// Power and energy counters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EnergyMeterValues {
    /// W
    pub power: f32,
    /// kWh
    pub energy_relative: f32,
    /// kWh
    pub energy_absolute: f32,
    pub phases_active: [bool; 3],
    pub phases_connected: [bool; 3],
}

/// Typed handle for an EVSE Bricklet 2.0.
#[derive(Debug)]
pub struct EvseV2<T: Transport> {
    device: Device<T>,
}

impl<T: Transport> EvseV2<T> {
    pub fn attach(transport: T) -> Result<Self> {
        Ok(Self {
            device: Device::attach(transport, &SPEC)?,
        })
    }

    pub fn attach_with_timeout(transport: T, timeout_us: u64) -> Result<Self> {
        Ok(Self {
            device: Device::attach_with_timeout(transport, &SPEC, timeout_us)?,
        })
    }

    pub fn device(&self) -> &Device<T> {
        &self.device
    }

    pub fn device_mut(&mut self) -> &mut Device<T> {
        &mut self.device
    }

    /// Maximum charging current in mA.
    pub fn set_max_charging_current(&mut self, current_ma: u16) -> Result<()> {
        self.device
            .call(FUNCTION_SET_MAX_CHARGING_CURRENT, &current_ma.to_le_bytes(), 0)?;
        Ok(())
    }

    pub fn start_charging(&mut self) -> Result<()> {
        self.device.call(FUNCTION_START_CHARGING, &[], 0)?;
        Ok(())
    }

    pub fn stop_charging(&mut self) -> Result<()> {
        self.device.call(FUNCTION_STOP_CHARGING, &[], 0)?;
        Ok(())
    }

    pub fn get_energy_meter_values(&mut self) -> Result<EnergyMeterValues> {
        let payload = self
            .device
            .call(FUNCTION_GET_ENERGY_METER_VALUES, &[], 14)?;
        let mut reader = PayloadReader::new(&payload);
        let power = reader.read_f32()?;
        let energy_relative = reader.read_f32()?;
        let energy_absolute = reader.read_f32()?;
        // Two bit fields of three phases each.
        let active = reader.read_u8()?;
        let connected = reader.read_u8()?;
        Ok(EnergyMeterValues {
            power,
            energy_relative,
            energy_absolute,
            phases_active: [0, 1, 2].map(|i| active & (1 << i) != 0),
            phases_connected: [0, 1, 2].map(|i| connected & (1 << i) != 0),
        })
    }

    /// One chunk of the detailed values stream.
    pub fn get_energy_meter_detailed_values_low_level(&mut self) -> Result<Chunk<u16, f32>> {
        let payload = self.device.call(
            FUNCTION_GET_ENERGY_METER_DETAILED_VALUES_LOW_LEVEL,
            &[],
            2 + DETAILED_VALUES_CHUNK_LEN * 4,
        )?;
        let mut reader = PayloadReader::new(&payload);
        let offset = reader.read_u16()?;
        let data = (0..DETAILED_VALUES_CHUNK_LEN)
            .map(|_| reader.read_f32())
            .collect::<Result<Vec<_>>>()?;
        Ok(Chunk { offset, data })
    }

    /// Assemble all detailed energy meter values into `out`.
    pub fn get_energy_meter_detailed_values(&mut self, out: &mut [f32]) -> Result<StreamStatus> {
        self.device.ensure_valid()?;
        stream_out(DETAILED_VALUES_LENGTH, out, || {
            self.get_energy_meter_detailed_values_low_level()
        })
    }
}
