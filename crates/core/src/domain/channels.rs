//! Channel requests and their resolution against the hardware route

use crate::domain::audio::HardwareChannels;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A requested channel count for one direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "ChannelSpecRepr", into = "ChannelSpecRepr")]
pub enum ChannelSpec {
    /// Follow whatever the hardware currently reports
    #[default]
    Auto,
    Fixed(u32),
}

impl ChannelSpec {
    pub fn is_auto(self) -> bool {
        matches!(self, ChannelSpec::Auto)
    }

    /// The explicit count, if one was requested
    pub fn fixed(self) -> Option<u32> {
        match self {
            ChannelSpec::Auto => None,
            ChannelSpec::Fixed(n) => Some(n),
        }
    }
}

impl fmt::Display for ChannelSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChannelSpec::Auto => write!(f, "auto"),
            ChannelSpec::Fixed(n) => write!(f, "{}", n),
        }
    }
}

impl std::str::FromStr for ChannelSpec {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.eq_ignore_ascii_case("auto") {
            return Ok(ChannelSpec::Auto);
        }
        s.parse::<u32>()
            .map(ChannelSpec::Fixed)
            .map_err(|_| format!("expected \"auto\" or a channel count, got {:?}", s))
    }
}

/// On-disk form: `"auto"` or a plain integer
#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum ChannelSpecRepr {
    Count(u32),
    Keyword(String),
}

impl TryFrom<ChannelSpecRepr> for ChannelSpec {
    type Error = String;

    fn try_from(repr: ChannelSpecRepr) -> Result<Self, Self::Error> {
        match repr {
            ChannelSpecRepr::Count(n) => Ok(ChannelSpec::Fixed(n)),
            ChannelSpecRepr::Keyword(word) => word.parse(),
        }
    }
}

impl From<ChannelSpec> for ChannelSpecRepr {
    fn from(spec: ChannelSpec) -> Self {
        match spec {
            ChannelSpec::Auto => ChannelSpecRepr::Keyword("auto".to_string()),
            ChannelSpec::Fixed(n) => ChannelSpecRepr::Count(n),
        }
    }
}

/// Requested input/output channel counts
///
/// Stored as part of the controller configuration so that late events can
/// tell which directions follow the hardware.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ChannelRequest {
    #[serde(default)]
    pub input: ChannelSpec,
    #[serde(default)]
    pub output: ChannelSpec,
}

impl ChannelRequest {
    pub fn new(input: ChannelSpec, output: ChannelSpec) -> Self {
        Self { input, output }
    }

    pub fn fixed(input: u32, output: u32) -> Self {
        Self::new(ChannelSpec::Fixed(input), ChannelSpec::Fixed(output))
    }

    pub fn auto() -> Self {
        Self::default()
    }
}

/// Channel counts pushed into the processing unit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct EffectiveChannels {
    pub input: u32,
    pub output: u32,
    pub input_enabled: bool,
}

impl EffectiveChannels {
    /// Input count actually wired up: zero whenever input is disabled
    pub fn pushed_input(&self) -> u32 {
        if self.input_enabled {
            self.input
        } else {
            0
        }
    }

    fn same_counts(&self, other: &Resolution) -> bool {
        self.input == other.input && self.output == other.output
    }
}

/// Outcome of one resolver pass
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Resolution {
    pub input: u32,
    pub output: u32,
    /// Either count differs from the prior effective configuration
    pub changed: bool,
}

impl Resolution {
    pub fn with_input_enabled(self, input_enabled: bool) -> EffectiveChannels {
        EffectiveChannels {
            input: self.input,
            output: self.output,
            input_enabled,
        }
    }
}

fn resolve_direction(spec: ChannelSpec, reported: u32, prefer_stereo: bool) -> u32 {
    let count = match spec {
        ChannelSpec::Auto => reported,
        ChannelSpec::Fixed(n) => n,
    };
    if prefer_stereo && count > 0 {
        count.max(2)
    } else {
        count
    }
}

/// Compute the channel counts the processing unit should run with
///
/// Auto directions take the hardware-reported count, then `prefer_stereo`
/// raises any positive count to at least two. Calling this again with the
/// result folded into `prior` yields the same counts and `changed == false`.
pub fn resolve(
    request: &ChannelRequest,
    hardware: &HardwareChannels,
    prefer_stereo: bool,
    prior: &EffectiveChannels,
) -> Resolution {
    let mut resolution = Resolution {
        input: resolve_direction(request.input, hardware.input, prefer_stereo),
        output: resolve_direction(request.output, hardware.output, prefer_stereo),
        changed: false,
    };
    resolution.changed = !prior.same_counts(&resolution);
    resolution
}
