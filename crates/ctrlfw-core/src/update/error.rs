//! Structured upload failures.

use serde_json::json;
use thiserror::Error;

use super::info::Version;

const TAG_PREFIX: &str = "firmware_update.script";

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum UpdateError {
    #[error("Updates are locked (vehicle connected)")]
    UpdatesLocked,

    #[error("Upload is longer than the info region")]
    TooLong,

    #[error("Failed to start update: {0}")]
    FlashBeginFailed(String),

    #[error("Firmware update has no info page")]
    NoInfoPage,

    #[error("Firmware info page corrupted: embedded checksum {embedded:#010x}, calculated {calculated:#010x}")]
    InfoPageCorrupted { embedded: u32, calculated: u32 },

    #[error("Firmware is for a {firmware} but this is a {device}")]
    WrongFirmwareType { firmware: String, device: String },

    #[error("Firmware {firmware} is a downgrade from {installed}")]
    Downgrade { firmware: Version, installed: Version },

    #[error("Failed to write update chunk of {requested} bytes; wrote {written}: {reason}")]
    FlashWriteFailed {
        requested: usize,
        written: usize,
        reason: String,
    },

    #[error("Failed to apply update: {0}")]
    FlashCommitFailed(String),
}

impl UpdateError {
    /// Machine-readable tag operator tooling branches on.
    pub fn tag(&self) -> String {
        let name = match self {
            UpdateError::UpdatesLocked => "vehicle_connected",
            UpdateError::TooLong => "too_long",
            UpdateError::FlashBeginFailed(_) => "flash_begin_failed",
            UpdateError::NoInfoPage => "no_info_page",
            UpdateError::InfoPageCorrupted { .. } => "info_page_corrupted",
            UpdateError::WrongFirmwareType { .. } => "wrong_firmware_type",
            UpdateError::Downgrade { .. } => "downgrade",
            UpdateError::FlashWriteFailed { .. } => "flash_write_failed",
            UpdateError::FlashCommitFailed(_) => "flash_commit_failed",
        };
        format!("{}.{}", TAG_PREFIX, name)
    }

    /// `{"error": "<tag>", ...}` body.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            UpdateError::Downgrade {
                firmware,
                installed,
            } => json!({
                "error": self.tag(),
                "fw": firmware.to_string(),
                "installed": installed.to_string(),
            }),
            UpdateError::FlashBeginFailed(reason)
            | UpdateError::FlashCommitFailed(reason)
            | UpdateError::FlashWriteFailed { reason, .. } => json!({
                "error": self.tag(),
                "reason": reason,
            }),
            _ => json!({ "error": self.tag() }),
        }
    }

    /// HTTP status the flash endpoints answer with.
    pub fn status(&self) -> u16 {
        match self {
            UpdateError::UpdatesLocked => 423,
            _ => 400,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tags_are_distinct() {
        let errors = [
            UpdateError::UpdatesLocked,
            UpdateError::TooLong,
            UpdateError::FlashBeginFailed("x".into()),
            UpdateError::NoInfoPage,
            UpdateError::InfoPageCorrupted {
                embedded: 1,
                calculated: 2,
            },
            UpdateError::WrongFirmwareType {
                firmware: "a".into(),
                device: "b".into(),
            },
            UpdateError::Downgrade {
                firmware: Version::new(1, 0, 0),
                installed: Version::new(2, 0, 0),
            },
            UpdateError::FlashWriteFailed {
                requested: 4,
                written: 0,
                reason: "x".into(),
            },
            UpdateError::FlashCommitFailed("x".into()),
        ];
        let mut tags: Vec<String> = errors.iter().map(UpdateError::tag).collect();
        assert!(tags.iter().all(|t| t.starts_with("firmware_update.script.")));
        tags.sort();
        tags.dedup();
        assert_eq!(tags.len(), errors.len());
    }

    #[test]
    fn test_downgrade_body() {
        let err = UpdateError::Downgrade {
            firmware: Version::new(2, 0, 9),
            installed: Version::new(2, 1, 0),
        };
        assert_eq!(
            err.to_json(),
            json!({
                "error": "firmware_update.script.downgrade",
                "fw": "2.0.9",
                "installed": "2.1.0",
            })
        );
    }

    #[test]
    fn test_plain_body() {
        assert_eq!(
            UpdateError::NoInfoPage.to_json().to_string(),
            r#"{"error":"firmware_update.script.no_info_page"}"#
        );
        assert_eq!(UpdateError::UpdatesLocked.status(), 423);
        assert_eq!(UpdateError::NoInfoPage.status(), 400);
    }
}
