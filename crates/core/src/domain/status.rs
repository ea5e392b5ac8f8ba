//! Tri-state result of every negotiation and configuration step

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{BitOr, BitOrAssign};

/// Outcome of a configuration step.
///
/// Statuses combine with `|`: `Error` absorbs everything, `PropertyChanged`
/// wins over `Ok`. A caller that ORs every step of a pipeline therefore sees
/// the worst outcome without losing the fact that the rest succeeded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfigurationStatus {
    /// The hardware granted exactly what was requested
    #[default]
    Ok,
    /// The request succeeded but some property was granted differently
    PropertyChanged,
    /// A request was flatly rejected
    Error,
}

impl ConfigurationStatus {
    pub fn is_error(self) -> bool {
        self == Self::Error
    }

    pub fn is_ok(self) -> bool {
        self == Self::Ok
    }

    /// `Ok` when `exact`, `PropertyChanged` otherwise
    pub fn exact_or_changed(exact: bool) -> Self {
        if exact {
            Self::Ok
        } else {
            Self::PropertyChanged
        }
    }

    fn bits(self) -> u8 {
        match self {
            Self::Ok => 0b00,
            Self::PropertyChanged => 0b01,
            Self::Error => 0b11,
        }
    }

    fn from_bits(bits: u8) -> Self {
        if bits & 0b10 != 0 {
            Self::Error
        } else if bits & 0b01 != 0 {
            Self::PropertyChanged
        } else {
            Self::Ok
        }
    }
}

impl BitOr for ConfigurationStatus {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self::from_bits(self.bits() | rhs.bits())
    }
}

impl BitOrAssign for ConfigurationStatus {
    fn bitor_assign(&mut self, rhs: Self) {
        *self = *self | rhs;
    }
}

impl fmt::Display for ConfigurationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ok => write!(f, "ok"),
            Self::PropertyChanged => write!(f, "property changed"),
            Self::Error => write!(f, "error"),
        }
    }
}
