//! Update progress events.
//!
//! Lets the HTTP layer, a CLI or the state mirror follow an upload without
//! coupling them to the pipeline.

use std::fmt;

use crate::update::info::Version;
use crate::update::layout::UpdateTarget;

/// Which endpoint an upload came through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadKind {
    /// Validation only.
    Check,
    /// Validation and flashing.
    Flash(UpdateTarget),
}

impl fmt::Display for UploadKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UploadKind::Check => write!(f, "check"),
            UploadKind::Flash(target) => write!(f, "flash {}", target),
        }
    }
}

#[derive(Debug, Clone)]
pub enum UpdateEvent {
    /// First chunk of a new upload.
    Started { kind: UploadKind, total_len: usize },
    /// Info region passed validation.
    InfoValidated { name: String, version: Version },
    /// Image has no info region and the policy allows that.
    InfoMissingTolerated,
    /// Bytes handed to program storage so far.
    Progress { written: usize, total: usize },
    /// Upload rejected; later chunks are ignored.
    Aborted { tag: String, message: String },
    /// Image committed; a restart follows.
    Committed { target: UpdateTarget, len: usize },
}

/// Observer trait for receiving update events.
pub trait UpdateObserver: Send + Sync {
    fn on_event(&self, event: &UpdateEvent);
}

/// No-op observer that discards all events.
pub struct NullObserver;

impl UpdateObserver for NullObserver {
    fn on_event(&self, _event: &UpdateEvent) {}
}

/// Observer that logs events using tracing.
pub struct TracingObserver;

impl UpdateObserver for TracingObserver {
    fn on_event(&self, event: &UpdateEvent) {
        match event {
            UpdateEvent::Started { kind, total_len } => {
                tracing::info!(kind = %kind, total_len, "Upload started");
            }
            UpdateEvent::InfoValidated { name, version } => {
                tracing::info!(name = %name, version = %version, "Firmware info validated");
            }
            UpdateEvent::InfoMissingTolerated => {
                tracing::warn!("Firmware has no info page, accepted by policy");
            }
            UpdateEvent::Progress { written, total } => {
                let pct = if *total > 0 {
                    (*written * 100) / *total
                } else {
                    0
                };
                tracing::debug!(written, total, progress = %format!("{}%", pct), "Progress");
            }
            UpdateEvent::Aborted { tag, message } => {
                tracing::error!(tag = %tag, "Update aborted: {}", message);
            }
            UpdateEvent::Committed { target, len } => {
                tracing::info!(image = %target, len, "Update committed");
            }
        }
    }
}
