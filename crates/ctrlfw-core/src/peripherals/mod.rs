//! Thin typed shims over the transaction engine.
//!
//! Each peripheral is a static [`DeviceSpec`](crate::device::DeviceSpec) table
//! plus a newtype whose methods encode arguments, call the engine and decode
//! the fixed-length response.

pub mod evse_v2;
pub mod ptc_v2;

use std::fmt;

use crate::device::{Error, FunctionKind, FunctionSpec, Result};

pub use evse_v2::EvseV2;
pub use ptc_v2::PtcV2;

pub(crate) const fn getter(id: u8, name: &'static str) -> FunctionSpec {
    FunctionSpec {
        id,
        name,
        kind: FunctionKind::Getter,
    }
}

pub(crate) const fn setter(id: u8, name: &'static str, bit: u8, default_expected: bool) -> FunctionSpec {
    FunctionSpec {
        id,
        name,
        kind: FunctionKind::Setter {
            bit,
            default_expected,
        },
    }
}

/// Threshold mode of a value callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ThresholdOption {
    #[default]
    Off,
    Outside,
    Inside,
    Smaller,
    Greater,
}

impl ThresholdOption {
    pub fn as_char(self) -> char {
        match self {
            ThresholdOption::Off => 'x',
            ThresholdOption::Outside => 'o',
            ThresholdOption::Inside => 'i',
            ThresholdOption::Smaller => '<',
            ThresholdOption::Greater => '>',
        }
    }

    pub fn from_char(c: char) -> Result<Self> {
        match c {
            'x' => Ok(ThresholdOption::Off),
            'o' => Ok(ThresholdOption::Outside),
            'i' => Ok(ThresholdOption::Inside),
            '<' => Ok(ThresholdOption::Smaller),
            '>' => Ok(ThresholdOption::Greater),
            other => Err(Error::InvalidParameter(format!(
                "unknown threshold option {:?}",
                other
            ))),
        }
    }
}

impl fmt::Display for ThresholdOption {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_char())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_threshold_option_chars() {
        for option in [
            ThresholdOption::Off,
            ThresholdOption::Outside,
            ThresholdOption::Inside,
            ThresholdOption::Smaller,
            ThresholdOption::Greater,
        ] {
            assert_eq!(ThresholdOption::from_char(option.as_char()), Ok(option));
        }
        assert!(ThresholdOption::from_char('?').is_err());
    }
}
