//! Firmware info record embedded in full images.
//!
//! Layout, relative to the info region start (little-endian):
//!
//! | offset | size | field |
//! |---|---|---|
//! | 0 | 4 | magic word 0 |
//! | 4 | 4 | magic word 1 (low 24 bits checked) |
//! | 8 | 61 | display name, NUL-padded |
//! | 69 | 3 | version major, minor, patch |
//!
//! The rest of the region is padding up to the CRC32 in its last 4 bytes.

use std::fmt;
use std::str::FromStr;

use byteorder::{ByteOrder, LittleEndian};
use crc::{CRC_32_ISO_HDLC, Crc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use super::layout::{CHECKSUM_LEN, INFO_REGION};

pub const INFO_MAGIC: [u32; 2] = [0x12CE2171, 0x6E12F0];

/// Only these bits of the second magic word identify the device family.
pub const INFO_MAGIC_1_MASK: u32 = 0x00FF_FFFF;

pub const NAME_LEN: usize = 61;

/// Size of the record at the start of the info region.
pub const RECORD_LEN: usize = 4 + 4 + NAME_LEN + 3;

/// CRC-32 (IEEE 802.3) used for the info region checksum.
pub static INFO_CRC: Crc<u32> = Crc::<u32>::new(&CRC_32_ISO_HDLC);

/// Firmware version triple, ordered major, minor, patch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Version {
    pub major: u8,
    pub minor: u8,
    pub patch: u8,
}

impl Version {
    pub const fn new(major: u8, minor: u8, patch: u8) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }

    /// True if `self` is older than `installed`. Equal is not a downgrade.
    pub fn is_downgrade_from(&self, installed: &Version) -> bool {
        self < installed
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid version {0:?}, expected major.minor.patch")]
pub struct ParseVersionError(String);

impl FromStr for Version {
    type Err = ParseVersionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.trim().split('.').collect();
        if parts.len() != 3 {
            return Err(ParseVersionError(s.to_string()));
        }
        let parse = |p: &str| p.parse::<u8>().map_err(|_| ParseVersionError(s.to_string()));
        Ok(Version::new(parse(parts[0])?, parse(parts[1])?, parse(parts[2])?))
    }
}

impl Serialize for Version {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Version {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Parsed info record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FirmwareInfo {
    pub magic: [u32; 2],
    /// Raw name field; see [`FirmwareInfo::name`].
    pub name: [u8; NAME_LEN],
    pub version: Version,
}

impl FirmwareInfo {
    /// Record with valid magic words.
    pub fn new(name: &str, version: Version) -> Self {
        let mut field = [0u8; NAME_LEN];
        // Keep at least one terminating NUL.
        let len = name.len().min(NAME_LEN - 1);
        field[..len].copy_from_slice(&name.as_bytes()[..len]);
        Self {
            magic: INFO_MAGIC,
            name: field,
            version,
        }
    }

    pub fn parse(bytes: &[u8; RECORD_LEN]) -> Self {
        let mut name = [0u8; NAME_LEN];
        name.copy_from_slice(&bytes[8..8 + NAME_LEN]);
        let v = &bytes[8 + NAME_LEN..RECORD_LEN];
        Self {
            magic: [
                LittleEndian::read_u32(&bytes[0..4]),
                LittleEndian::read_u32(&bytes[4..8]),
            ],
            name,
            version: Version::new(v[0], v[1], v[2]),
        }
    }

    pub fn to_bytes(&self) -> [u8; RECORD_LEN] {
        let mut bytes = [0u8; RECORD_LEN];
        LittleEndian::write_u32(&mut bytes[0..4], self.magic[0]);
        LittleEndian::write_u32(&mut bytes[4..8], self.magic[1]);
        bytes[8..8 + NAME_LEN].copy_from_slice(&self.name);
        bytes[8 + NAME_LEN..].copy_from_slice(&[
            self.version.major,
            self.version.minor,
            self.version.patch,
        ]);
        bytes
    }

    pub fn magic_matches(&self) -> bool {
        self.magic[0] == INFO_MAGIC[0] && (self.magic[1] & INFO_MAGIC_1_MASK) == INFO_MAGIC[1]
    }

    /// Display name up to the first NUL.
    pub fn name(&self) -> String {
        let end = self.name.iter().position(|&b| b == 0).unwrap_or(NAME_LEN);
        String::from_utf8_lossy(&self.name[..end]).into_owned()
    }
}

/// Build a complete info region for `info`, checksum included.
pub fn build_info_region(info: &FirmwareInfo) -> Vec<u8> {
    let mut region = vec![0u8; INFO_REGION.len];
    region[..RECORD_LEN].copy_from_slice(&info.to_bytes());
    let body = INFO_REGION.len - CHECKSUM_LEN;
    let checksum = INFO_CRC.checksum(&region[..body]);
    LittleEndian::write_u32(&mut region[body..], checksum);
    region
}

/// Write the info region for `info` into a full image, growing it if it
/// ends before the region does.
pub fn stamp_info_region(image: &mut Vec<u8>, info: &FirmwareInfo) {
    if image.len() < INFO_REGION.end() {
        image.resize(INFO_REGION.end(), 0xFF);
    }
    image[INFO_REGION.start..INFO_REGION.end()].copy_from_slice(&build_info_region(info));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_order() {
        let installed = Version::new(2, 1, 0);
        assert!(Version::new(2, 0, 9).is_downgrade_from(&installed));
        assert!(Version::new(1, 9, 9).is_downgrade_from(&installed));
        assert!(!Version::new(2, 1, 0).is_downgrade_from(&installed));
        assert!(!Version::new(2, 1, 1).is_downgrade_from(&installed));
        assert!(!Version::new(3, 0, 0).is_downgrade_from(&installed));
    }

    #[test]
    fn test_version_parse() {
        assert_eq!("2.1.0".parse::<Version>().unwrap(), Version::new(2, 1, 0));
        assert!("2.1".parse::<Version>().is_err());
        assert!("2.1.300".parse::<Version>().is_err());
        assert_eq!(Version::new(10, 0, 3).to_string(), "10.0.3");
    }

    #[test]
    fn test_magic_reserved_byte_ignored() {
        let mut info = FirmwareInfo::new("WARP Charger", Version::new(2, 1, 0));
        info.magic[1] |= 0xAB00_0000;
        assert!(info.magic_matches());
        info.magic[1] ^= 0x0000_0001;
        assert!(!info.magic_matches());
    }

    #[test]
    fn test_record_layout() {
        let info = FirmwareInfo::new("WARP Charger", Version::new(2, 0, 9));
        let bytes = info.to_bytes();
        assert_eq!(&bytes[0..4], &[0x71, 0x21, 0xCE, 0x12]);
        assert_eq!(&bytes[8..20], b"WARP Charger");
        assert_eq!(&bytes[RECORD_LEN - 3..], &[2, 0, 9]);
        assert_eq!(FirmwareInfo::parse(&bytes).name(), "WARP Charger");
    }

    #[test]
    fn test_long_name_keeps_terminator() {
        let info = FirmwareInfo::new(&"x".repeat(100), Version::default());
        assert_eq!(info.name().len(), NAME_LEN - 1);
    }

    #[test]
    fn test_info_region_checksum() {
        let region = build_info_region(&FirmwareInfo::new("WARP Charger", Version::new(2, 1, 0)));
        assert_eq!(region.len(), INFO_REGION.len);
        let body = region.len() - CHECKSUM_LEN;
        assert_eq!(
            LittleEndian::read_u32(&region[body..]),
            INFO_CRC.checksum(&region[..body])
        );
    }

    #[test]
    fn test_stamp_grows_short_image() {
        let mut image = vec![0u8; 16];
        stamp_info_region(&mut image, &FirmwareInfo::new("WARP Charger", Version::new(2, 1, 0)));
        assert_eq!(image.len(), INFO_REGION.end());
        assert_eq!(image[16], 0xFF);
        assert_eq!(&image[INFO_REGION.start + 8..INFO_REGION.start + 20], b"WARP Charger");
    }
}
