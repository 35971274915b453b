//! Transaction engine and callback dispatch.
//!
//! Every peripheral function goes through [`Device::invoke`]:
//! prepare, send with a deadline, drain the response, finish, map the error.
//! Nothing here retries; retry policy belongs to the caller.

use tracing::{debug, trace, warn};

use super::{CallbackHandler, Device, DeviceError, EndpointState, Error, FunctionKind, Result};
use crate::protocol::constants::DEVICE_ERROR_OK;
use crate::protocol::{CallbackPacket, Request};
use crate::transport::{TickFlags, Transport};

impl<T: Transport> Device<T> {
    /// Run one transaction and return the response payload.
    ///
    /// `expected_len` is the statically known response length. A successful
    /// response of any other length is rejected without exposing its bytes.
    pub fn invoke(&mut self, request: &Request, expected_len: usize) -> Result<Vec<u8>> {
        self.ensure_valid()?;
        if self.state != EndpointState::Idle {
            return Err(Error::Locked);
        }

        let timeout_us = self.timeout_us;
        let transport = self.transport.as_mut().ok_or(Error::NotInitialized)?;
        let deadline_us = transport.now_us().saturating_add(timeout_us);

        self.state = EndpointState::InTransaction;
        let result = exchange(transport, request, expected_len, deadline_us);
        self.state = EndpointState::Idle;

        if let Err(e) = &result {
            debug!(function_id = request.function_id, error = %e, "Transaction failed");
        }
        result
    }

    /// Call a function from this device's table.
    ///
    /// Getters always expect a response; setters follow the response-expected mask.
    pub fn call(&mut self, function_id: u8, payload: &[u8], response_len: usize) -> Result<Vec<u8>> {
        self.ensure_valid()?;
        let function = self.spec.function(function_id).ok_or_else(|| {
            Error::InvalidParameter(format!("unknown function id {}", function_id))
        })?;
        let response_expected = match function.kind {
            FunctionKind::Getter => true,
            FunctionKind::Setter { bit, .. } => self.response_expected.get(bit),
        };
        trace!(function = function.name, response_expected, "Calling");

        let request = Request::new(function_id, payload, response_expected)?;
        self.invoke(&request, response_len)
    }

    /// Install the handler for `callback_id`, replacing any previous one.
    pub fn register_callback<F>(&mut self, callback_id: u8, handler: F) -> Result<()>
    where
        F: FnMut(&mut Device<T>, &[u8]) + 'static,
    {
        self.ensure_valid()?;
        if self.spec.callback(callback_id).is_none() {
            return Err(Error::InvalidParameter(format!(
                "unknown callback id {}",
                callback_id
            )));
        }
        let handler: CallbackHandler<T> = Box::new(handler);
        self.handlers.insert(callback_id, handler);
        Ok(())
    }

    pub fn unregister_callback(&mut self, callback_id: u8) -> Result<()> {
        self.ensure_valid()?;
        self.handlers.remove(&callback_id);
        Ok(())
    }

    /// Poll for callbacks until `timeout_us` passes, dispatching each one.
    ///
    /// Returns the number of handlers that ran.
    pub fn callback_tick(&mut self, timeout_us: u64) -> Result<usize> {
        self.ensure_valid()?;
        if self.state != EndpointState::Idle {
            return Err(Error::Locked);
        }

        let deadline_us = match self.transport.as_ref() {
            Some(transport) => transport.now_us().saturating_add(timeout_us),
            None => return Err(Error::NotInitialized),
        };

        let mut dispatched = 0;
        loop {
            // A handler may have destroyed the handle.
            let Some(transport) = self.transport.as_mut() else {
                break;
            };
            match transport.poll_callback(deadline_us)? {
                Some(packet) => {
                    if self.dispatch(packet) {
                        dispatched += 1;
                    }
                }
                None => break,
            }
        }
        Ok(dispatched)
    }

    fn dispatch(&mut self, packet: CallbackPacket) -> bool {
        let Some(spec) = self.spec.callback(packet.function_id) else {
            warn!(function_id = packet.function_id, "Dropping unknown callback");
            return false;
        };
        if packet.payload.len() != spec.payload_len {
            warn!(
                callback = spec.name,
                expected = spec.payload_len,
                actual = packet.payload.len(),
                "Dropping callback with wrong payload length"
            );
            return false;
        }
        let Some(mut handler) = self.handlers.remove(&packet.function_id) else {
            trace!(callback = spec.name, "No handler registered");
            return false;
        };

        self.state = EndpointState::InCallback;
        handler(self, &packet.payload);
        self.state = EndpointState::Idle;

        if self.is_valid() {
            self.handlers.entry(packet.function_id).or_insert(handler);
        }
        true
    }
}

fn exchange<T: Transport>(
    transport: &mut T,
    request: &Request,
    expected_len: usize,
    deadline_us: u64,
) -> Result<Vec<u8>> {
    let tick = match transport.send_packet(request, deadline_us) {
        Ok(tick) => tick,
        Err(e) => {
            // The send error wins; the slot is still released.
            let _ = transport.finish_send(TickFlags::empty(), deadline_us);
            return Err(e.into());
        }
    };

    let mut response = if tick.packet_received() {
        transport.take_response()
    } else {
        None
    };

    let finished = transport.finish_send(tick, deadline_us);
    let finish_tick = finished.as_ref().copied().unwrap_or_default();
    if response.is_none() && finish_tick.packet_received() {
        response = transport.take_response();
    }

    if tick.timed_out() || finish_tick.timed_out() {
        // Anything drained at the boundary is dropped with the timeout.
        return Err(Error::Timeout);
    }

    let Some(response) = response else {
        if request.response_expected {
            return Err(Error::Timeout);
        }
        finished?;
        return Ok(Vec::new());
    };

    trace!(
        function_id = request.function_id,
        error_code = response.error_code,
        len = response.len(),
        "Response"
    );

    if response.error_code == DEVICE_ERROR_OK && response.len() != expected_len {
        return Err(Error::WrongResponseLength {
            expected: expected_len,
            actual: response.len(),
        });
    }

    finished?;

    if response.error_code != DEVICE_ERROR_OK {
        return Err(Error::Device(DeviceError::from_code(response.error_code)));
    }

    Ok(response.payload)
}
