//! Transport endpoint abstraction.
//!
//! Defines the `Transport` trait the transaction engine drives. Byte-level
//! framing, CRC and device enumeration live behind it.

use std::fmt;
use std::ops::BitOr;

use thiserror::Error;

use crate::protocol::constants::{TICK_PACKET_RECEIVED, TICK_TIMEOUT};
use crate::protocol::{CallbackPacket, Request, Response};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("Device disconnected")]
    Disconnected,

    #[error("Framing error: {0}")]
    Framing(String),

    #[error("Send buffer busy")]
    Busy,

    #[error("Transport error code {0}")]
    Code(i32),
}

/// Result bits of a send or finish poll.
///
/// Timeout and packet-received are not exclusive: a response may land in
/// the same poll that hit the deadline.
#[derive(Clone, Copy, Default, PartialEq, Eq)]
pub struct TickFlags(u8);

impl TickFlags {
    pub const TIMEOUT: Self = Self(TICK_TIMEOUT);
    pub const PACKET_RECEIVED: Self = Self(TICK_PACKET_RECEIVED);

    pub const fn empty() -> Self {
        Self(0)
    }

    pub const fn bits(self) -> u8 {
        self.0
    }

    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    pub const fn timed_out(self) -> bool {
        self.contains(Self::TIMEOUT)
    }

    pub const fn packet_received(self) -> bool {
        self.contains(Self::PACKET_RECEIVED)
    }
}

impl BitOr for TickFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl fmt::Debug for TickFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TickFlags")
            .field("timeout", &self.timed_out())
            .field("packet_received", &self.packet_received())
            .finish()
    }
}

/// Identity a peripheral declares when it is discovered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub uid: String,
    pub device_identifier: u16,
}

/// Abstract packet transport for one peripheral endpoint.
///
/// This trait enables:
/// - Production implementations over the serial framing layer
/// - Mock implementation for unit testing
pub trait Transport {
    /// Identity of the peripheral behind this endpoint, if one is attached.
    fn identity(&self) -> Option<Identity>;

    /// Monotonic microsecond clock.
    fn now_us(&self) -> u64;

    /// Frame and send a request, polling until a response arrives, the
    /// request needs no response, or `deadline_us` passes.
    fn send_packet(&mut self, request: &Request, deadline_us: u64)
    -> Result<TickFlags, TransportError>;

    /// Take the response signalled by `TickFlags::PACKET_RECEIVED`.
    fn take_response(&mut self) -> Option<Response>;

    /// Release the in-flight slot. May keep polling until `deadline_us` if
    /// the transport is still mid-flight.
    fn finish_send(&mut self, tick: TickFlags, deadline_us: u64)
    -> Result<TickFlags, TransportError>;

    /// Poll for the next callback packet until `deadline_us`.
    fn poll_callback(&mut self, deadline_us: u64)
    -> Result<Option<CallbackPacket>, TransportError>;
}
