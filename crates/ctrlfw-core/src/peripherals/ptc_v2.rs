//! PTC temperature sensor, second revision.

use super::{ThresholdOption, getter, setter};
use crate::device::{CallbackSpec, Device, DeviceSpec, Error, FunctionSpec, Result};
use crate::protocol::PayloadReader;
use crate::protocol::constants::*;
use crate::transport::Transport;

pub const DEVICE_IDENTIFIER: u16 = 2101;
pub const DEVICE_DISPLAY_NAME: &str = "PTC Bricklet 2.0";

pub const FUNCTION_GET_TEMPERATURE: u8 = 1;
pub const FUNCTION_SET_TEMPERATURE_CALLBACK_CONFIGURATION: u8 = 2;
pub const FUNCTION_GET_TEMPERATURE_CALLBACK_CONFIGURATION: u8 = 3;
pub const FUNCTION_GET_RESISTANCE: u8 = 5;
pub const FUNCTION_SET_RESISTANCE_CALLBACK_CONFIGURATION: u8 = 6;
pub const FUNCTION_GET_RESISTANCE_CALLBACK_CONFIGURATION: u8 = 7;
pub const FUNCTION_SET_NOISE_REJECTION_FILTER: u8 = 9;
pub const FUNCTION_GET_NOISE_REJECTION_FILTER: u8 = 10;
pub const FUNCTION_IS_SENSOR_CONNECTED: u8 = 11;
pub const FUNCTION_SET_WIRE_MODE: u8 = 12;
pub const FUNCTION_GET_WIRE_MODE: u8 = 13;
pub const FUNCTION_SET_MOVING_AVERAGE_CONFIGURATION: u8 = 14;
pub const FUNCTION_GET_MOVING_AVERAGE_CONFIGURATION: u8 = 15;
pub const FUNCTION_SET_SENSOR_CONNECTED_CALLBACK_CONFIGURATION: u8 = 16;
pub const FUNCTION_GET_SENSOR_CONNECTED_CALLBACK_CONFIGURATION: u8 = 17;
pub const FUNCTION_GET_CHIP_TEMPERATURE: u8 = 242;

pub const CALLBACK_TEMPERATURE: u8 = 4;
pub const CALLBACK_RESISTANCE: u8 = 8;
pub const CALLBACK_SENSOR_CONNECTED: u8 = 18;

/// Payload length of a value callback configuration.
const CALLBACK_CONFIGURATION_LEN: usize = 14;

static FUNCTIONS: &[FunctionSpec] = &[
    getter(FUNCTION_GET_TEMPERATURE, "get_temperature"),
    setter(
        FUNCTION_SET_TEMPERATURE_CALLBACK_CONFIGURATION,
        "set_temperature_callback_configuration",
        0,
        true,
    ),
    getter(
        FUNCTION_GET_TEMPERATURE_CALLBACK_CONFIGURATION,
        "get_temperature_callback_configuration",
    ),
    getter(FUNCTION_GET_RESISTANCE, "get_resistance"),
    setter(
        FUNCTION_SET_RESISTANCE_CALLBACK_CONFIGURATION,
        "set_resistance_callback_configuration",
        1,
        true,
    ),
    getter(
        FUNCTION_GET_RESISTANCE_CALLBACK_CONFIGURATION,
        "get_resistance_callback_configuration",
    ),
    setter(FUNCTION_SET_NOISE_REJECTION_FILTER, "set_noise_rejection_filter", 2, false),
    getter(FUNCTION_GET_NOISE_REJECTION_FILTER, "get_noise_rejection_filter"),
    getter(FUNCTION_IS_SENSOR_CONNECTED, "is_sensor_connected"),
    setter(FUNCTION_SET_WIRE_MODE, "set_wire_mode", 3, false),
    getter(FUNCTION_GET_WIRE_MODE, "get_wire_mode"),
    setter(
        FUNCTION_SET_MOVING_AVERAGE_CONFIGURATION,
        "set_moving_average_configuration",
        4,
        false,
    ),
    getter(
        FUNCTION_GET_MOVING_AVERAGE_CONFIGURATION,
        "get_moving_average_configuration",
    ),
    setter(
        FUNCTION_SET_SENSOR_CONNECTED_CALLBACK_CONFIGURATION,
        "set_sensor_connected_callback_configuration",
        5,
        true,
    ),
    getter(
        FUNCTION_GET_SENSOR_CONNECTED_CALLBACK_CONFIGURATION,
        "get_sensor_connected_callback_configuration",
    ),
    setter(FUNCTION_SET_WRITE_FIRMWARE_POINTER, "set_write_firmware_pointer", 6, false),
    setter(FUNCTION_SET_STATUS_LED_CONFIG, "set_status_led_config", 7, false),
    getter(FUNCTION_GET_CHIP_TEMPERATURE, "get_chip_temperature"),
    setter(FUNCTION_RESET, "reset", 8, false),
    setter(FUNCTION_WRITE_UID, "write_uid", 9, false),
    getter(FUNCTION_READ_UID, "read_uid"),
    getter(FUNCTION_GET_IDENTITY, "get_identity"),
];

static CALLBACKS: &[CallbackSpec] = &[
    CallbackSpec {
        id: CALLBACK_TEMPERATURE,
        name: "temperature",
        payload_len: 4,
    },
    CallbackSpec {
        id: CALLBACK_RESISTANCE,
        name: "resistance",
        payload_len: 4,
    },
    CallbackSpec {
        id: CALLBACK_SENSOR_CONNECTED,
        name: "sensor_connected",
        payload_len: 1,
    },
];

pub static SPEC: DeviceSpec = DeviceSpec {
    device_identifier: DEVICE_IDENTIFIER,
    display_name: DEVICE_DISPLAY_NAME,
    functions: FUNCTIONS,
    callbacks: CALLBACKS,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WireMode {
    Two = 2,
    Three = 3,
    Four = 4,
}

impl TryFrom<u8> for WireMode {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            2 => Ok(WireMode::Two),
            3 => Ok(WireMode::Three),
            4 => Ok(WireMode::Four),
            other => Err(Error::InvalidParameter(format!("wire mode {}", other))),
        }
    }
}

/// Period and threshold of a value callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CallbackConfiguration {
    /// Milliseconds between callbacks, 0 disables.
    pub period: u32,
    pub value_has_to_change: bool,
    pub option: ThresholdOption,
    pub min: i32,
    pub max: i32,
}

impl CallbackConfiguration {
    fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(CALLBACK_CONFIGURATION_LEN);
        buf.extend_from_slice(&self.period.to_le_bytes());
        buf.push(self.value_has_to_change as u8);
        buf.push(self.option.as_char() as u8);
        buf.extend_from_slice(&self.min.to_le_bytes());
        buf.extend_from_slice(&self.max.to_le_bytes());
        buf
    }

    fn decode(payload: &[u8]) -> Result<Self> {
        let mut reader = PayloadReader::new(payload);
        Ok(Self {
            period: reader.read_u32()?,
            value_has_to_change: reader.read_bool()?,
            option: ThresholdOption::from_char(reader.read_char()?)?,
            min: reader.read_i32()?,
            max: reader.read_i32()?,
        })
    }
}

/// Typed handle for a PTC Bricklet 2.0.
#[derive(Debug)]
pub struct PtcV2<T: Transport> {
    device: Device<T>,
}

impl<T: Transport> PtcV2<T> {
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

    pub fn into_device(self) -> Device<T> {
        self.device
    }

    /// Temperature in 1/100 °C.
    pub fn get_temperature(&mut self) -> Result<i32> {
        let payload = self.device.call(FUNCTION_GET_TEMPERATURE, &[], 4)?;
        PayloadReader::new(&payload).read_i32()
    }

    /// Resistance in Ω/2^15 units.
    pub fn get_resistance(&mut self) -> Result<i32> {
        let payload = self.device.call(FUNCTION_GET_RESISTANCE, &[], 4)?;
        PayloadReader::new(&payload).read_i32()
    }

    pub fn set_temperature_callback_configuration(&mut self, config: &CallbackConfiguration) -> Result<()> {
        self.device.call(
            FUNCTION_SET_TEMPERATURE_CALLBACK_CONFIGURATION,
            &config.encode(),
            0,
        )?;
        Ok(())
    }

    pub fn get_temperature_callback_configuration(&mut self) -> Result<CallbackConfiguration> {
        let payload = self.device.call(
            FUNCTION_GET_TEMPERATURE_CALLBACK_CONFIGURATION,
            &[],
            CALLBACK_CONFIGURATION_LEN,
        )?;
        CallbackConfiguration::decode(&payload)
    }

    pub fn set_resistance_callback_configuration(&mut self, config: &CallbackConfiguration) -> Result<()> {
        self.device.call(
            FUNCTION_SET_RESISTANCE_CALLBACK_CONFIGURATION,
            &config.encode(),
            0,
        )?;
        Ok(())
    }

    pub fn is_sensor_connected(&mut self) -> Result<bool> {
        let payload = self.device.call(FUNCTION_IS_SENSOR_CONNECTED, &[], 1)?;
        PayloadReader::new(&payload).read_bool()
    }

    pub fn set_wire_mode(&mut self, mode: WireMode) -> Result<()> {
        self.device.call(FUNCTION_SET_WIRE_MODE, &[mode as u8], 0)?;
        Ok(())
    }

    pub fn get_wire_mode(&mut self) -> Result<WireMode> {
        let payload = self.device.call(FUNCTION_GET_WIRE_MODE, &[], 1)?;
        WireMode::try_from(PayloadReader::new(&payload).read_u8()?)
    }

    pub fn set_sensor_connected_callback_configuration(&mut self, enabled: bool) -> Result<()> {
        self.device.call(
            FUNCTION_SET_SENSOR_CONNECTED_CALLBACK_CONFIGURATION,
            &[enabled as u8],
            0,
        )?;
        Ok(())
    }

    /// MCU temperature in °C.
    pub fn get_chip_temperature(&mut self) -> Result<i16> {
        let payload = self.device.call(FUNCTION_GET_CHIP_TEMPERATURE, &[], 2)?;
        Ok(PayloadReader::new(&payload).read_u16()? as i16)
    }

    pub fn on_temperature<F>(&mut self, mut handler: F) -> Result<()>
    where
        F: FnMut(&mut Device<T>, i32) + 'static,
    {
        self.device
            .register_callback(CALLBACK_TEMPERATURE, move |device, payload| {
                if let Ok(value) = PayloadReader::new(payload).read_i32() {
                    handler(device, value);
                }
            })
    }

    pub fn on_resistance<F>(&mut self, mut handler: F) -> Result<()>
    where
        F: FnMut(&mut Device<T>, i32) + 'static,
    {
        self.device
            .register_callback(CALLBACK_RESISTANCE, move |device, payload| {
                if let Ok(value) = PayloadReader::new(payload).read_i32() {
                    handler(device, value);
                }
            })
    }

    pub fn on_sensor_connected<F>(&mut self, mut handler: F) -> Result<()>
    where
        F: FnMut(&mut Device<T>, bool) + 'static,
    {
        self.device
            .register_callback(CALLBACK_SENSOR_CONNECTED, move |device, payload| {
                if let Ok(connected) = PayloadReader::new(payload).read_bool() {
                    handler(device, connected);
                }
            })
    }

    pub fn callback_tick(&mut self, timeout_us: u64) -> Result<usize> {
        self.device.callback_tick(timeout_us)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use super::*;
    use crate::transport::MockTransport;

    fn attach() -> (PtcV2<MockTransport>, MockTransport) {
        let mock = MockTransport::new(DEVICE_IDENTIFIER);
        let ptc = PtcV2::attach(mock.clone()).unwrap();
        (ptc, mock)
    }

    #[test]
    fn test_default_response_expected_mask() {
        let (ptc, _mock) = attach();
        // Callback configuration setters answer by default.
        assert_eq!(ptc.device().response_expected().bits(), 0x23);
    }

    #[test]
    fn test_get_temperature() {
        let (mut ptc, mock) = attach();
        mock.queue_response(&2345i32.to_le_bytes());
        assert_eq!(ptc.get_temperature().unwrap(), 2345);
        assert_eq!(
            mock.sent_requests()[0].function_id,
            FUNCTION_GET_TEMPERATURE
        );
    }

    #[test]
    fn test_callback_configuration_encoding() {
        let (mut ptc, mock) = attach();
        let config = CallbackConfiguration {
            period: 1000,
            value_has_to_change: true,
            option: ThresholdOption::Greater,
            min: 2500,
            max: 0,
        };
        mock.queue_response(&[]);
        ptc.set_temperature_callback_configuration(&config).unwrap();

        let sent = mock.sent_requests();
        assert!(sent[0].response_expected);
        assert_eq!(
            sent[0].payload,
            vec![0xE8, 0x03, 0, 0, 1, b'>', 0xC4, 0x09, 0, 0, 0, 0, 0, 0]
        );

        mock.queue_response(&sent[0].payload);
        assert_eq!(ptc.get_temperature_callback_configuration().unwrap(), config);
    }

    #[test]
    fn test_wire_mode_is_fire_and_forget() {
        let (mut ptc, mock) = attach();
        ptc.set_wire_mode(WireMode::Three).unwrap();
        let sent = mock.sent_requests();
        assert!(!sent[0].response_expected);
        assert_eq!(sent[0].payload, vec![3]);

        mock.queue_response(&[7]);
        assert!(matches!(
            ptc.get_wire_mode(),
            Err(Error::InvalidParameter(_))
        ));
    }

    #[test]
    fn test_typed_temperature_callback() {
        let (mut ptc, mock) = attach();
        let readings = Arc::new(Mutex::new(Vec::new()));
        let sink = readings.clone();
        ptc.on_temperature(move |_, t| sink.lock().unwrap().push(t))
            .unwrap();

        mock.queue_callback(CALLBACK_TEMPERATURE, &(-150i32).to_le_bytes());
        mock.queue_callback(CALLBACK_SENSOR_CONNECTED, &[1]);
        assert_eq!(ptc.callback_tick(10_000).unwrap(), 1);
        assert_eq!(*readings.lock().unwrap(), vec![-150]);
    }

    #[test]
    fn test_into_device_keeps_timeout() {
        let mock = MockTransport::new(DEVICE_IDENTIFIER);
        let ptc = PtcV2::attach_with_timeout(mock.clone(), 20_000).unwrap();
        let mut device = ptc.into_device();
        assert_eq!(device.timeout_us(), 20_000);

        mock.queue_response(&2345i32.to_le_bytes());
        assert_eq!(
            device.call(FUNCTION_GET_TEMPERATURE, &[], 4).unwrap(),
            2345i32.to_le_bytes().to_vec()
        );
    }

    #[test]
    fn test_reset_uses_table_bit() {
        let (mut ptc, mock) = attach();
        ptc.device_mut()
            .set_response_expected(FUNCTION_RESET, true)
            .unwrap();
        mock.queue_response(&[]);
        ptc.device_mut().reset().unwrap();
        assert!(mock.sent_requests()[0].response_expected);
        assert!(ptc.device().response_expected().get(8));
    }
}
