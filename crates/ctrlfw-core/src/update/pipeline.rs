//! Chunked firmware ingestion.
//!
//! Two entry points share the validation logic:
//!
//! - [`FirmwareUpdater::check_chunk`] receives only the info region of an
//!   image (chunk indexes relative to the region) and validates it, with
//!   optional downgrade protection. Nothing is written.
//! - [`FirmwareUpdater::flash_chunk`] receives a whole image, validates the
//!   info region as it streams past and writes everything from the target's
//!   payload start to program storage.
//!
//! A failed upload is aborted once: the error is returned for the chunk that
//! caused it, the flash transaction is dropped and every later chunk of the
//! same upload is skipped.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tracing::{debug, instrument, warn};

use super::accumulator::InfoAccumulator;
use super::error::UpdateError;
use super::info::{FirmwareInfo, Version};
use super::layout::{INFO_REGION, UpdateTarget};
use crate::events::{UpdateEvent, UpdateObserver, UploadKind};
use crate::platform::FlashWriter;

/// What validation compares an image against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdatePolicy {
    /// Reject images without an info region.
    pub require_info_page: bool,
    /// This device's display name.
    pub display_name: String,
    /// Running firmware version.
    pub installed: Version,
}

/// "Updates permitted" flag owned by unrelated safety logic.
#[derive(Debug, Clone)]
pub struct UpdateGate(Arc<AtomicBool>);

impl UpdateGate {
    pub fn new(permitted: bool) -> Self {
        Self(Arc::new(AtomicBool::new(permitted)))
    }

    pub fn permitted(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    pub fn set_permitted(&self, permitted: bool) {
        self.0.store(permitted, Ordering::SeqCst);
    }
}

impl Default for UpdateGate {
    fn default() -> Self {
        Self::new(true)
    }
}

/// Result of handing one chunk to the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkOutcome {
    /// Processed, more chunks expected.
    Accepted,
    /// The upload was already aborted; nothing was done.
    Skipped,
    /// Last chunk processed: validated (check) or committed (flash).
    Complete,
}

/// Per-upload state, reset on chunk 0.
#[derive(Debug)]
struct Upload {
    info: InfoAccumulator,
    validated: bool,
    aborted: bool,
    flash_open: bool,
    payload_len: usize,
    written: usize,
}

impl Upload {
    fn new() -> Self {
        Self {
            info: InfoAccumulator::new(INFO_REGION),
            validated: false,
            aborted: false,
            flash_open: false,
            payload_len: 0,
            written: 0,
        }
    }
}

pub struct FirmwareUpdater<F: FlashWriter> {
    flash: F,
    policy: UpdatePolicy,
    gate: UpdateGate,
    observer: Arc<dyn UpdateObserver>,
    check: Upload,
    upload: Upload,
}

impl<F: FlashWriter> FirmwareUpdater<F> {
    pub fn new(
        flash: F,
        policy: UpdatePolicy,
        gate: UpdateGate,
        observer: Arc<dyn UpdateObserver>,
    ) -> Self {
        Self {
            flash,
            policy,
            gate,
            observer,
            check: Upload::new(),
            upload: Upload::new(),
        }
    }

    pub fn policy(&self) -> &UpdatePolicy {
        &self.policy
    }

    pub fn gate(&self) -> &UpdateGate {
        &self.gate
    }

    pub fn flash(&self) -> &F {
        &self.flash
    }

    /// Whether the current flash upload was aborted.
    pub fn is_aborted(&self) -> bool {
        self.upload.aborted
    }

    /// Validate one chunk of an info region upload.
    ///
    /// `index` is relative to the region start. Validation runs once the
    /// region is complete or on the final chunk, whichever comes first.
    #[instrument(skip(self, data), fields(len = data.len()))]
    pub fn check_chunk(
        &mut self,
        index: usize,
        data: &[u8],
        is_final: bool,
        detect_downgrade: bool,
    ) -> Result<ChunkOutcome, UpdateError> {
        if index == 0 {
            self.check = Upload::new();
            self.observer.on_event(&UpdateEvent::Started {
                kind: UploadKind::Check,
                total_len: INFO_REGION.len,
            });
        }
        if !self.gate.permitted() {
            self.check.aborted = true;
            return Err(UpdateError::UpdatesLocked);
        }
        if self.check.aborted {
            return Ok(ChunkOutcome::Skipped);
        }
        if index + data.len() > INFO_REGION.len {
            return Err(self.abort_check(UpdateError::TooLong));
        }

        self.check.info.feed(INFO_REGION.start + index, data);

        if !self.check.validated && (index + data.len() >= INFO_REGION.len || is_final) {
            self.check.validated = true;
            match validate(&self.check.info, &self.policy, detect_downgrade) {
                Ok(info) => self.report_valid(info.as_ref()),
                Err(e) => return Err(self.abort_check(e)),
            }
        }

        Ok(if is_final {
            ChunkOutcome::Complete
        } else {
            ChunkOutcome::Accepted
        })
    }

    /// Validate and write one chunk of a full upload.
    ///
    /// `index` is the absolute offset of `data` in the image and `total_len`
    /// the image length announced by the request.
    #[instrument(skip(self, target, data), fields(image = %target, len = data.len()))]
    pub fn flash_chunk(
        &mut self,
        target: UpdateTarget,
        index: usize,
        data: &[u8],
        is_final: bool,
        total_len: usize,
    ) -> Result<ChunkOutcome, UpdateError> {
        if index == 0 {
            if self.upload.flash_open {
                warn!("Previous upload never finished, dropping its flash transaction");
                self.flash.abort();
            }
            self.upload = Upload::new();
            self.observer.on_event(&UpdateEvent::Started {
                kind: UploadKind::Flash(target),
                total_len,
            });
        }
        if !self.gate.permitted() {
            if self.upload.aborted {
                return Err(UpdateError::UpdatesLocked);
            }
            return Err(self.abort_upload(UpdateError::UpdatesLocked));
        }
        if self.upload.aborted {
            return Ok(ChunkOutcome::Skipped);
        }

        let payload_start = target.payload_start();
        if index == 0 {
            let payload_len = target.payload_region(total_len).len;
            if let Err(e) = self.flash.begin(target, payload_len) {
                self.flash.abort();
                return Err(self.abort_upload(UpdateError::FlashBeginFailed(e.to_string())));
            }
            self.upload.flash_open = true;
            self.upload.payload_len = payload_len;
            debug!(image = %target, payload_len, "Flash transaction opened");
        }

        if target.carries_info_region() {
            self.upload.info.feed(index, data);
            let region_done = index + data.len() >= INFO_REGION.end();
            if !self.upload.validated && (region_done || is_final) {
                self.upload.validated = true;
                // Flashing is an explicit operator decision: no downgrade check.
                match validate(&self.upload.info, &self.policy, false) {
                    Ok(info) => self.report_valid(info.as_ref()),
                    Err(e) => return Err(self.abort_upload(e)),
                }
            }
        }

        if index + data.len() > payload_start {
            let skip = payload_start.saturating_sub(index);
            let bytes = &data[skip..];
            let written = match self.flash.write(bytes) {
                Ok(n) => n,
                Err(e) => {
                    return Err(self.abort_upload(UpdateError::FlashWriteFailed {
                        requested: bytes.len(),
                        written: 0,
                        reason: e.to_string(),
                    }));
                }
            };
            if written != bytes.len() {
                return Err(self.abort_upload(UpdateError::FlashWriteFailed {
                    requested: bytes.len(),
                    written,
                    reason: "short write".into(),
                }));
            }
            self.upload.written += written;
            self.observer.on_event(&UpdateEvent::Progress {
                written: self.upload.written,
                total: self.upload.payload_len,
            });
        }

        if !is_final {
            return Ok(ChunkOutcome::Accepted);
        }

        self.upload.flash_open = false;
        if let Err(e) = self.flash.end() {
            return Err(self.abort_upload(UpdateError::FlashCommitFailed(e.to_string())));
        }
        self.observer.on_event(&UpdateEvent::Committed {
            target,
            len: self.upload.written,
        });
        Ok(ChunkOutcome::Complete)
    }

    fn report_valid(&self, info: Option<&FirmwareInfo>) {
        match info {
            Some(info) => self.observer.on_event(&UpdateEvent::InfoValidated {
                name: info.name(),
                version: info.version,
            }),
            None => self.observer.on_event(&UpdateEvent::InfoMissingTolerated),
        }
    }

    fn abort_check(&mut self, error: UpdateError) -> UpdateError {
        self.check.aborted = true;
        self.report_abort(&error);
        error
    }

    fn abort_upload(&mut self, error: UpdateError) -> UpdateError {
        self.upload.aborted = true;
        if self.upload.flash_open {
            self.flash.abort();
            self.upload.flash_open = false;
        }
        self.report_abort(&error);
        error
    }

    fn report_abort(&self, error: &UpdateError) {
        warn!(tag = %error.tag(), "Failed to update: {}", error);
        self.observer.on_event(&UpdateEvent::Aborted {
            tag: error.tag(),
            message: error.to_string(),
        });
    }
}

/// Validate a finished (or truncated) info region.
///
/// Returns the record, or `None` if the image has none and the policy
/// tolerates that.
fn validate(
    info: &InfoAccumulator,
    policy: &UpdatePolicy,
    detect_downgrade: bool,
) -> Result<Option<FirmwareInfo>, UpdateError> {
    let found = match (info.embedded(), info.calculated(), info.record()) {
        (Some(embedded), Some(calculated), Some(record)) if info.found() => {
            Some((embedded, calculated, record))
        }
        _ => None,
    };

    let Some((embedded, calculated, record)) = found else {
        if policy.require_info_page {
            return Err(UpdateError::NoInfoPage);
        }
        return Ok(None);
    };

    if embedded != calculated {
        return Err(UpdateError::InfoPageCorrupted {
            embedded,
            calculated,
        });
    }

    let name = record.name();
    if name != policy.display_name {
        return Err(UpdateError::WrongFirmwareType {
            firmware: name,
            device: policy.display_name.clone(),
        });
    }

    if detect_downgrade && record.version.is_downgrade_from(&policy.installed) {
        return Err(UpdateError::Downgrade {
            firmware: record.version,
            installed: policy.installed,
        });
    }

    Ok(Some(record))
}
