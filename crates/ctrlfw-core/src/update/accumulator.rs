//! Incremental capture of the info region from arbitrarily cut chunks.

use std::fmt;

use crc::Digest;

use super::info::{FirmwareInfo, INFO_CRC, RECORD_LEN};
use super::layout::{CHECKSUM_LEN, Region};

/// Running state over one info region.
///
/// Chunks arrive in order, each identified by its absolute offset. Bytes of
/// the checksummed part feed the CRC, the first [`RECORD_LEN`] of them also
/// fill the record, and the trailing field is collected separately, possibly
/// across two chunks.
pub struct InfoAccumulator {
    region: Region,
    digest: Option<Digest<'static, u32>>,
    /// Bytes fed to the CRC so far.
    crc_len: usize,
    calculated: Option<u32>,
    record: [u8; RECORD_LEN],
    record_len: usize,
    checksum: [u8; CHECKSUM_LEN],
    checksum_len: usize,
}

impl InfoAccumulator {
    pub fn new(region: Region) -> Self {
        Self {
            region,
            digest: Some(INFO_CRC.digest()),
            crc_len: 0,
            calculated: None,
            record: [0; RECORD_LEN],
            record_len: 0,
            checksum: [0; CHECKSUM_LEN],
            checksum_len: 0,
        }
    }

    pub fn region(&self) -> Region {
        self.region
    }

    /// Feed the chunk starting at absolute offset `chunk_start`.
    pub fn feed(&mut self, chunk_start: usize, data: &[u8]) {
        if let Some(overlap) = self.region.checksummed().overlap(chunk_start, data.len()) {
            let bytes = &data[overlap.chunk_range.clone()];

            if overlap.region_offset < RECORD_LEN {
                let n = bytes.len().min(RECORD_LEN - overlap.region_offset);
                self.record[overlap.region_offset..overlap.region_offset + n]
                    .copy_from_slice(&bytes[..n]);
                self.record_len = self.record_len.max(overlap.region_offset + n);
            }

            if overlap.region_offset == self.crc_len {
                if let Some(digest) = self.digest.as_mut() {
                    digest.update(bytes);
                    self.crc_len += bytes.len();
                }
            }
            if self.crc_len == self.region.checksummed().len {
                if let Some(digest) = self.digest.take() {
                    self.calculated = Some(digest.finalize());
                }
            }
        }

        if let Some(overlap) = self.region.checksum_field().overlap(chunk_start, data.len()) {
            let bytes = &data[overlap.chunk_range.clone()];
            self.checksum[overlap.region_offset..overlap.region_offset + bytes.len()]
                .copy_from_slice(bytes);
            self.checksum_len = self
                .checksum_len
                .max(overlap.region_offset + bytes.len());
        }
    }

    /// CRC32 over the checksummed part, once all of it was fed.
    pub fn calculated(&self) -> Option<u32> {
        self.calculated
    }

    /// Checksum stored in the image, once all 4 bytes arrived.
    pub fn embedded(&self) -> Option<u32> {
        if self.checksum_len == CHECKSUM_LEN {
            Some(u32::from_le_bytes(self.checksum))
        } else {
            None
        }
    }

    pub fn record(&self) -> Option<FirmwareInfo> {
        if self.record_len == RECORD_LEN {
            Some(FirmwareInfo::parse(&self.record))
        } else {
            None
        }
    }

    /// Whole region seen.
    pub fn complete(&self) -> bool {
        self.calculated.is_some() && self.embedded().is_some()
    }

    /// Whole region seen and it starts with valid magic words.
    pub fn found(&self) -> bool {
        self.complete() && self.record().is_some_and(|r| r.magic_matches())
    }
}

impl fmt::Debug for InfoAccumulator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InfoAccumulator")
            .field("region", &self.region)
            .field("crc_len", &self.crc_len)
            .field("calculated", &self.calculated)
            .field("record_len", &self.record_len)
            .field("checksum_len", &self.checksum_len)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::update::info::{FirmwareInfo, Version, build_info_region};
    use crate::update::layout::INFO_REGION;

    fn image() -> Vec<u8> {
        let mut image: Vec<u8> = (0..0x12000u32).map(|i| (i * 7 % 251) as u8).collect();
        let region = build_info_region(&FirmwareInfo::new("WARP Charger", Version::new(2, 1, 0)));
        image[INFO_REGION.start..INFO_REGION.end()].copy_from_slice(&region);
        image
    }

    fn feed_in_chunks(image: &[u8], size: usize) -> InfoAccumulator {
        let mut acc = InfoAccumulator::new(INFO_REGION);
        for (i, chunk) in image.chunks(size).enumerate() {
            acc.feed(i * size, chunk);
        }
        acc
    }

    #[test]
    fn test_chunking_invariance() {
        let image = image();
        let reference = feed_in_chunks(&image, image.len());
        assert!(reference.found());
        assert_eq!(reference.calculated(), reference.embedded());

        for size in [1, 7, 64, 4096] {
            let acc = feed_in_chunks(&image, size);
            assert!(acc.found(), "chunk size {}", size);
            assert_eq!(acc.calculated(), reference.calculated(), "chunk size {}", size);
            assert_eq!(acc.embedded(), reference.embedded(), "chunk size {}", size);
            assert_eq!(acc.record(), reference.record(), "chunk size {}", size);
        }
    }

    #[test]
    fn test_checksum_bytes_excluded_when_split() {
        let image = image();
        let split = INFO_REGION.checksum_field().start + 2;

        let mut acc = InfoAccumulator::new(INFO_REGION);
        acc.feed(0, &image[..split]);
        // CRC is final before the checksum field is complete.
        assert!(acc.calculated().is_some());
        assert_eq!(acc.embedded(), None);
        assert!(!acc.complete());

        acc.feed(split, &image[split..]);
        let body = &image[INFO_REGION.start..INFO_REGION.checksum_field().start];
        assert_eq!(acc.calculated(), Some(INFO_CRC.checksum(body)));
        assert_eq!(acc.embedded(), acc.calculated());
    }

    #[test]
    fn test_corrupted_region_detected() {
        let mut image = image();
        image[INFO_REGION.start + 200] ^= 0xFF;
        let acc = feed_in_chunks(&image, 64);
        assert!(acc.found());
        assert_ne!(acc.calculated(), acc.embedded());
    }

    #[test]
    fn test_missing_magic_not_found() {
        let mut image = image();
        image[INFO_REGION.start] = 0;
        let acc = feed_in_chunks(&image, 4096);
        assert!(acc.complete());
        assert!(!acc.found());
    }

    #[test]
    fn test_truncated_image_incomplete() {
        let image = image();
        let acc = feed_in_chunks(&image[..INFO_REGION.start + 100], 64);
        assert!(!acc.complete());
        assert!(acc.record().is_some());
        assert!(!acc.found());
    }
}
