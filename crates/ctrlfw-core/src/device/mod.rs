//! Device handles for attached peripherals.
//!
//! A [`Device`] owns the transport endpoint of one peripheral, the
//! response-expected bitmask of its setters and the callback handlers
//! registered on it. The transaction engine lives in [`engine`], the
//! functions every peripheral shares in [`common`].

pub mod common;
pub mod engine;
pub mod error;

use std::collections::HashMap;
use std::fmt;

use tracing::{debug, info};

pub use common::DeviceIdentity;
pub use error::{DeviceError, Error, Result};

use crate::protocol::constants::{DEFAULT_TIMEOUT_US, DEVICE_MAGIC};
use crate::transport::Transport;

/// Where an endpoint is in its request/dispatch cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EndpointState {
    /// Free for a new transaction.
    #[default]
    Idle,
    /// A transaction owns the in-flight slot.
    InTransaction,
    /// A callback handler is running.
    InCallback,
}

impl fmt::Display for EndpointState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EndpointState::Idle => write!(f, "IDLE"),
            EndpointState::InTransaction => write!(f, "IN_TRANSACTION"),
            EndpointState::InCallback => write!(f, "IN_CALLBACK"),
        }
    }
}

/// How a function selector behaves with respect to responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FunctionKind {
    /// Always answered.
    Getter,
    /// Answered only when its bit in the response-expected mask is set.
    Setter { bit: u8, default_expected: bool },
}

#[derive(Debug, Clone, Copy)]
pub struct FunctionSpec {
    pub id: u8,
    pub name: &'static str,
    pub kind: FunctionKind,
}

#[derive(Debug, Clone, Copy)]
pub struct CallbackSpec {
    pub id: u8,
    pub name: &'static str,
    /// Exact payload length of the callback packet.
    pub payload_len: usize,
}

/// Static description of a peripheral type.
#[derive(Debug)]
pub struct DeviceSpec {
    pub device_identifier: u16,
    pub display_name: &'static str,
    pub functions: &'static [FunctionSpec],
    pub callbacks: &'static [CallbackSpec],
}

impl DeviceSpec {
    pub fn function(&self, id: u8) -> Option<&FunctionSpec> {
        self.functions.iter().find(|f| f.id == id)
    }

    pub fn callback(&self, id: u8) -> Option<&CallbackSpec> {
        self.callbacks.iter().find(|c| c.id == id)
    }

    /// Response-expected mask as it stands right after attach.
    pub fn default_response_expected(&self) -> ResponseExpected {
        let mut mask = ResponseExpected::default();
        for function in self.functions {
            if let FunctionKind::Setter {
                bit,
                default_expected,
            } = function.kind
            {
                mask.set(bit, default_expected);
            }
        }
        mask
    }
}

/// One bit per setter.
#[derive(Clone, Copy, Default, PartialEq, Eq)]
pub struct ResponseExpected(u64);

impl ResponseExpected {
    pub fn get(self, bit: u8) -> bool {
        self.0 & (1 << bit) != 0
    }

    pub fn set(&mut self, bit: u8, expected: bool) {
        if expected {
            self.0 |= 1 << bit;
        } else {
            self.0 &= !(1 << bit);
        }
    }

    pub fn bits(self) -> u64 {
        self.0
    }
}

impl fmt::Debug for ResponseExpected {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ResponseExpected({:#06x})", self.0)
    }
}

/// Handler for one callback function id. Receives the device so it can
/// inspect state; transactions from inside it fail with [`Error::Locked`].
pub type CallbackHandler<T> = Box<dyn FnMut(&mut Device<T>, &[u8])>;

/// Handle to one attached peripheral.
pub struct Device<T: Transport> {
    magic: u16,
    transport: Option<T>,
    spec: &'static DeviceSpec,
    uid: String,
    state: EndpointState,
    timeout_us: u64,
    response_expected: ResponseExpected,
    handlers: HashMap<u8, CallbackHandler<T>>,
}

impl<T: Transport> Device<T> {
    /// Attach to the peripheral behind `transport`.
    ///
    /// Fails with [`Error::Null`] if nothing is attached and with
    /// [`Error::WrongDeviceType`] if it declares a different identifier.
    pub fn attach(transport: T, spec: &'static DeviceSpec) -> Result<Self> {
        Self::attach_with_timeout(transport, spec, DEFAULT_TIMEOUT_US)
    }

    /// Like [`Device::attach`], with every transaction bounded by `timeout_us`.
    pub fn attach_with_timeout(
        transport: T,
        spec: &'static DeviceSpec,
        timeout_us: u64,
    ) -> Result<Self> {
        let identity = transport.identity().ok_or(Error::Null)?;
        if identity.device_identifier != spec.device_identifier {
            return Err(Error::WrongDeviceType {
                expected: spec.device_identifier,
                actual: identity.device_identifier,
            });
        }

        info!(
            uid = %identity.uid,
            device = spec.display_name,
            timeout_us,
            "Attached peripheral"
        );

        Ok(Self {
            magic: DEVICE_MAGIC,
            transport: Some(transport),
            spec,
            uid: identity.uid,
            state: EndpointState::Idle,
            timeout_us,
            response_expected: spec.default_response_expected(),
            handlers: HashMap::new(),
        })
    }

    /// Invalidate the handle and hand the transport back.
    pub fn destroy(&mut self) -> Result<T> {
        self.ensure_valid()?;
        let transport = self.transport.take().ok_or(Error::NotInitialized)?;
        self.magic = 0;
        self.handlers.clear();
        debug!(uid = %self.uid, "Destroyed device handle");
        Ok(transport)
    }

    pub fn is_valid(&self) -> bool {
        self.magic == DEVICE_MAGIC && self.transport.is_some()
    }

    pub(crate) fn ensure_valid(&self) -> Result<()> {
        if self.is_valid() {
            Ok(())
        } else {
            Err(Error::NotInitialized)
        }
    }

    pub fn spec(&self) -> &'static DeviceSpec {
        self.spec
    }

    pub fn uid(&self) -> &str {
        &self.uid
    }

    pub fn state(&self) -> EndpointState {
        self.state
    }

    pub fn timeout_us(&self) -> u64 {
        self.timeout_us
    }

    pub fn set_timeout_us(&mut self, timeout_us: u64) {
        self.timeout_us = timeout_us;
    }

    pub fn transport(&self) -> Option<&T> {
        self.transport.as_ref()
    }

    fn setter_bit(&self, function_id: u8) -> Result<u8> {
        match self.spec.function(function_id).map(|f| f.kind) {
            Some(FunctionKind::Setter { bit, .. }) => Ok(bit),
            Some(FunctionKind::Getter) => Err(Error::InvalidParameter(format!(
                "function {} always expects a response",
                function_id
            ))),
            None => Err(Error::InvalidParameter(format!(
                "unknown function id {}",
                function_id
            ))),
        }
    }

    pub fn get_response_expected(&self, function_id: u8) -> Result<bool> {
        self.ensure_valid()?;
        let bit = self.setter_bit(function_id)?;
        Ok(self.response_expected.get(bit))
    }

    pub fn set_response_expected(&mut self, function_id: u8, expected: bool) -> Result<()> {
        self.ensure_valid()?;
        let bit = self.setter_bit(function_id)?;
        self.response_expected.set(bit, expected);
        Ok(())
    }

    pub fn set_response_expected_all(&mut self, expected: bool) -> Result<()> {
        self.ensure_valid()?;
        for function in self.spec.functions {
            if let FunctionKind::Setter { bit, .. } = function.kind {
                self.response_expected.set(bit, expected);
            }
        }
        Ok(())
    }

    pub fn response_expected(&self) -> ResponseExpected {
        self.response_expected
    }
}

impl<T: Transport> fmt::Debug for Device<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Device")
            .field("device", &self.spec.display_name)
            .field("uid", &self.uid)
            .field("valid", &self.is_valid())
            .field("state", &self.state)
            .field("timeout_us", &self.timeout_us)
            .field("response_expected", &self.response_expected)
            .field("handlers", &self.handlers.len())
            .finish()
    }
}
