//! Transport layer module.

pub mod mock;
pub mod traits;

pub use mock::{MockReply, MockTransport};
pub use traits::{Identity, TickFlags, Transport, TransportError};
