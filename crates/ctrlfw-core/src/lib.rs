//! ctrlfw-core: device controller building blocks in Rust.
//!
//! This crate provides the parts of a charge controller's firmware that talk
//! to attached peripherals and accept firmware updates.
//!
//! # Architecture
//!
//! The crate is organized into layers:
//!
//! - **Protocol**: Constants, request/response/callback packets, payload reader
//! - **Transport**: Collaborator that moves packets (trait, mock)
//! - **Device**: Device handle, transaction engine, callback dispatch
//! - **Stream**: Assembly of values delivered in chunks
//! - **Peripherals**: Thin table-driven shims over the engine
//! - **Update**: Firmware image ingestion and validation
//! - **Events**: Observer pattern for update progress
//! - **Platform**: Flash writer, storage, restart and status LED
//! - **Scheduler / Reset / Http**: Control loop tasks, factory reset and the
//!   endpoint contract
//! - **Config**: Controller configuration
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use ctrlfw_core::config::ControllerConfig;
//! use ctrlfw_core::events::TracingObserver;
//! use ctrlfw_core::http::{Controller, UploadChunk};
//! use ctrlfw_core::platform::{MemoryFlash, SimulatedSystem};
//! use ctrlfw_core::update::UpdateGate;
//!
//! let image = std::fs::read("firmware.bin").unwrap();
//! let mut controller = Controller::new(
//!     &ControllerConfig::default(),
//!     MemoryFlash::new(4 * 1024 * 1024),
//!     SimulatedSystem::new(true),
//!     UpdateGate::default(),
//!     Arc::new(TracingObserver),
//! );
//! let reply = controller.flash_firmware(UploadChunk {
//!     index: 0,
//!     data: &image,
//!     is_final: true,
//!     total_len: image.len(),
//! });
//! println!("{:?}", reply);
//! ```

pub mod config;
pub mod device;
pub mod events;
pub mod http;
pub mod peripherals;
pub mod platform;
pub mod protocol;
pub mod reset;
pub mod scheduler;
pub mod stream;
pub mod transport;
pub mod update;

// Re-exports for convenience
pub use config::ControllerConfig;
pub use device::{Device, DeviceError, DeviceIdentity, EndpointState, Error, Result};
pub use events::{NullObserver, TracingObserver, UpdateEvent, UpdateObserver};
pub use http::{Controller, HttpReply, UploadChunk};
pub use platform::{DirSystem, FlashWriter, MemoryFlash, SimulatedSystem, System};
pub use reset::FactoryReset;
pub use stream::{Chunk, StreamStatus, stream_out};
pub use transport::{MockTransport, Transport, TransportError};
pub use update::{FirmwareUpdater, UpdateError, UpdateGate, UpdatePolicy, UpdateTarget, Version};
