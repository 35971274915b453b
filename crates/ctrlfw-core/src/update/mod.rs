//! Firmware image ingestion.
//!
//! - **Layout**: fixed regions of an uploaded image
//! - **Info**: the record embedded in the info region and its checksum
//! - **Accumulator**: incremental capture of that region from chunks
//! - **Pipeline**: check and flash uploads, validation and abort handling
//! - **Error**: tagged failures reported to the operator

pub mod accumulator;
pub mod error;
pub mod info;
pub mod layout;
pub mod pipeline;

pub use accumulator::InfoAccumulator;
pub use error::UpdateError;
pub use info::{FirmwareInfo, Version, build_info_region, stamp_info_region};
pub use layout::{INFO_REGION, Region, UpdateTarget};
pub use pipeline::{ChunkOutcome, FirmwareUpdater, UpdateGate, UpdatePolicy};
