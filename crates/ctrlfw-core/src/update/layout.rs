//! Fixed regions of an uploaded image.
//!
//! Regions are absolute byte windows. A chunk is another window; everything
//! the pipeline does with a chunk starts from intersecting the two.

use std::fmt;
use std::ops::Range;

/// Info region of a full firmware image.
pub const INFO_REGION: Region = Region::new(0xC000, 0x1000);

/// Trailing checksum field of the info region.
pub const CHECKSUM_LEN: usize = 4;

/// First byte of a full image that is written to the firmware slot.
/// Everything before it (bootloader, partition table, info region) is
/// already on the device.
pub const FIRMWARE_PAYLOAD_START: usize = 0x10000 - 0x1000;

/// Filesystem images are written from their first byte.
pub const FILESYSTEM_PAYLOAD_START: usize = 0;

/// Absolute window `[start, start + len)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Region {
    pub start: usize,
    pub len: usize,
}

/// Intersection of a chunk with a region.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Overlap {
    /// Bytes of the chunk, relative to the chunk start.
    pub chunk_range: Range<usize>,
    /// Offset of the first overlapping byte, relative to the region start.
    pub region_offset: usize,
}

impl Overlap {
    pub fn len(&self) -> usize {
        self.chunk_range.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunk_range.is_empty()
    }
}

impl Region {
    pub const fn new(start: usize, len: usize) -> Self {
        Self { start, len }
    }

    pub const fn end(&self) -> usize {
        self.start + self.len
    }

    /// Part covered by the checksum.
    pub const fn checksummed(&self) -> Region {
        Region::new(self.start, self.len - CHECKSUM_LEN)
    }

    /// The checksum field itself.
    pub const fn checksum_field(&self) -> Region {
        Region::new(self.end() - CHECKSUM_LEN, CHECKSUM_LEN)
    }

    /// Intersect with the chunk `[chunk_start, chunk_start + chunk_len)`.
    pub fn overlap(&self, chunk_start: usize, chunk_len: usize) -> Option<Overlap> {
        let start = self.start.max(chunk_start);
        let end = self.end().min(chunk_start + chunk_len);
        if start >= end {
            return None;
        }
        Some(Overlap {
            chunk_range: start - chunk_start..end - chunk_start,
            region_offset: start - self.start,
        })
    }
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:X}..0x{:X}", self.start, self.end())
    }
}

/// What an upload is flashed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UpdateTarget {
    /// Merged image: bootloader, partition table, info region, firmware.
    Firmware,
    /// Raw filesystem image.
    Filesystem,
}

impl UpdateTarget {
    pub fn payload_start(self) -> usize {
        match self {
            UpdateTarget::Firmware => FIRMWARE_PAYLOAD_START,
            UpdateTarget::Filesystem => FILESYSTEM_PAYLOAD_START,
        }
    }

    /// Whether images for this target embed an info region.
    pub fn carries_info_region(self) -> bool {
        matches!(self, UpdateTarget::Firmware)
    }

    /// Payload window of a `total_len` byte image.
    pub fn payload_region(self, total_len: usize) -> Region {
        let start = self.payload_start();
        Region::new(start, total_len.saturating_sub(start))
    }
}

impl fmt::Display for UpdateTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UpdateTarget::Firmware => write!(f, "firmware"),
            UpdateTarget::Filesystem => write!(f, "filesystem"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_regions_do_not_overlap() {
        assert!(INFO_REGION.end() <= FIRMWARE_PAYLOAD_START);
        assert_eq!(INFO_REGION.checksum_field().start, 0xCFFC);
        assert_eq!(INFO_REGION.checksummed().end(), 0xCFFC);
    }

    #[test]
    fn test_chunk_before_region() {
        assert_eq!(INFO_REGION.overlap(0, 0xC000), None);
    }

    #[test]
    fn test_chunk_after_region() {
        assert_eq!(INFO_REGION.overlap(0xD000, 100), None);
    }

    #[test]
    fn test_chunk_straddles_start() {
        let overlap = INFO_REGION.overlap(0xBFF0, 0x20).unwrap();
        assert_eq!(overlap.chunk_range, 0x10..0x20);
        assert_eq!(overlap.region_offset, 0);
    }

    #[test]
    fn test_chunk_inside_region() {
        let overlap = INFO_REGION.overlap(0xC100, 0x10).unwrap();
        assert_eq!(overlap.chunk_range, 0..0x10);
        assert_eq!(overlap.region_offset, 0x100);
    }

    #[test]
    fn test_chunk_covers_region() {
        let overlap = INFO_REGION.overlap(0, 0x20000).unwrap();
        assert_eq!(overlap.chunk_range, 0xC000..0xD000);
        assert_eq!(overlap.len(), INFO_REGION.len);
    }

    #[test]
    fn test_checksum_split_across_chunks() {
        let field = INFO_REGION.checksum_field();
        let first = field.overlap(0xC000, 0xFFE).unwrap();
        assert_eq!(first.region_offset, 0);
        assert_eq!(first.len(), 2);
        let second = field.overlap(0xCFFE, 0x100).unwrap();
        assert_eq!(second.region_offset, 2);
        assert_eq!(second.chunk_range, 0..2);
    }

    #[test]
    fn test_payload_region() {
        assert_eq!(
            UpdateTarget::Firmware.payload_region(0x20000),
            Region::new(0xF000, 0x11000)
        );
        assert_eq!(
            UpdateTarget::Filesystem.payload_region(0x100),
            Region::new(0, 0x100)
        );
        assert_eq!(UpdateTarget::Firmware.payload_region(10).len, 0);
    }
}
