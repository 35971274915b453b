//! Protocol module - packet-level definitions shared by the engine and transports.

pub mod constants;
pub mod packet;

pub use constants::*;
pub use packet::{CallbackPacket, PayloadReader, Request, Response};
