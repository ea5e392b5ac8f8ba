//! Hardware session and processing unit abstractions
//!
//! This module defines the collaborator contracts the controller negotiates
//! against. Both collaborators are owned elsewhere: the hardware session is a
//! process-wide resource, and the processing unit is shared with the real-time
//! audio callback. Implementations for specific platforms live in the `infra`
//! crate.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Errors reported by the hardware session or the processing unit
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    /// The hardware session refused a request outright
    #[error("{operation} rejected: {reason}")]
    Rejected {
        operation: &'static str,
        reason: String,
    },

    /// The processing unit could not apply a configuration
    #[error("Processing unit configuration failed: {0}")]
    UnitConfiguration(String),

    /// The backing device or service is not reachable
    #[error("Session unavailable: {0}")]
    Unavailable(String),
}

impl SessionError {
    pub fn rejected(operation: &'static str, reason: impl Into<String>) -> Self {
        Self::Rejected {
            operation,
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, SessionError>;

/// Coarse routing intent requested from the hardware session
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Playback,
    Record,
    Ambient,
    SoloAmbient,
    PlayAndRecord,
    MultiRoute,
    /// A category reported by the hardware that the controller never requests
    Other(String),
}

impl Category {
    /// Whether audio input can be routed while this category is active
    pub fn supports_input(&self) -> bool {
        matches!(
            self,
            Category::Record | Category::PlayAndRecord | Category::MultiRoute
        )
    }

    /// Whether audio output can be routed while this category is active
    pub fn supports_output(&self) -> bool {
        !matches!(self, Category::Record | Category::Other(_))
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Category::Playback => write!(f, "playback"),
            Category::Record => write!(f, "record"),
            Category::Ambient => write!(f, "ambient"),
            Category::SoloAmbient => write!(f, "solo-ambient"),
            Category::PlayAndRecord => write!(f, "play-and-record"),
            Category::MultiRoute => write!(f, "multi-route"),
            Category::Other(name) => write!(f, "{}", name),
        }
    }
}

bitflags::bitflags! {
    /// Fine-grained behaviour flags layered on a category
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
    pub struct CategoryOptions: u32 {
        const MIX_WITH_OTHERS = 1 << 0;
        const DUCK_OTHERS = 1 << 1;
        const ALLOW_BLUETOOTH = 1 << 2;
        const DEFAULT_TO_SPEAKER = 1 << 3;
        const INTERRUPT_SPOKEN_AUDIO_AND_MIX_WITH_OTHERS = 1 << 4;
        const ALLOW_BLUETOOTH_A2DP = 1 << 5;
        const ALLOW_AIR_PLAY = 1 << 6;
    }
}

impl Default for CategoryOptions {
    fn default() -> Self {
        Self::empty()
    }
}

/// Values last confirmed by the hardware session
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub category: Option<Category>,
    pub options: CategoryOptions,
    pub sample_rate: f64,
    pub ticks_per_buffer: u32,
}

impl SessionSnapshot {
    /// Nothing was ever confirmed: no category and no options
    pub fn is_unset(&self) -> bool {
        self.category.is_none() && self.options.is_empty()
    }
}

/// Channel layout currently reported by the hardware route
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct HardwareChannels {
    pub input: u32,
    pub output: u32,
    pub input_available: bool,
}

/// Parameters pushed into the processing unit
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct UnitConfiguration {
    pub sample_rate: f64,
    pub input_channels: u32,
    pub output_channels: u32,
    pub buffering_enabled: bool,
}

/// Externally owned hardware audio session
///
/// Every setter may be refused; getters report what the hardware actually
/// granted, which can differ from any preference previously set.
pub trait HardwareSession: Send + Sync {
    /// Request a category, leaving option selection to the session
    fn set_category(&self, category: &Category) -> Result<()>;

    /// Request a category together with an explicit option bitset
    fn set_category_with_options(&self, category: &Category, options: CategoryOptions)
        -> Result<()>;

    /// Currently granted category, if any
    fn category(&self) -> Option<Category>;

    /// Currently granted options
    fn category_options(&self) -> CategoryOptions;

    fn set_preferred_sample_rate(&self, hz: f64) -> Result<()>;

    fn preferred_sample_rate(&self) -> f64;

    /// Sample rate the hardware is actually running at
    fn sample_rate(&self) -> f64;

    fn set_preferred_io_buffer_duration(&self, duration: Duration) -> Result<()>;

    /// IO buffer duration the hardware is actually using
    fn io_buffer_duration(&self) -> Duration;

    fn set_active(&self, active: bool) -> Result<()>;

    fn input_available(&self) -> bool;

    fn input_channels(&self) -> u32;

    fn output_channels(&self) -> u32;

    /// Snapshot of the current route's channel layout
    fn hardware_channels(&self) -> HardwareChannels {
        HardwareChannels {
            input: self.input_channels(),
            output: self.output_channels(),
            input_available: self.input_available(),
        }
    }
}

/// Audio-processing unit driven by the real-time callback
///
/// `set_active` is the only operation the real-time path depends on;
/// `configure` is only called while the unit is inactive.
pub trait ProcessingUnit: Send + Sync {
    fn configure(&self, config: &UnitConfiguration) -> Result<()>;

    fn set_active(&self, active: bool);

    fn is_active(&self) -> bool;
}

impl<T: HardwareSession + ?Sized> HardwareSession for Arc<T> {
    fn set_category(&self, category: &Category) -> Result<()> {
        (**self).set_category(category)
    }

    fn set_category_with_options(
        &self,
        category: &Category,
        options: CategoryOptions,
    ) -> Result<()> {
        (**self).set_category_with_options(category, options)
    }

    fn category(&self) -> Option<Category> {
        (**self).category()
    }

    fn category_options(&self) -> CategoryOptions {
        (**self).category_options()
    }

    fn set_preferred_sample_rate(&self, hz: f64) -> Result<()> {
        (**self).set_preferred_sample_rate(hz)
    }

    fn preferred_sample_rate(&self) -> f64 {
        (**self).preferred_sample_rate()
    }

    fn sample_rate(&self) -> f64 {
        (**self).sample_rate()
    }

    fn set_preferred_io_buffer_duration(&self, duration: Duration) -> Result<()> {
        (**self).set_preferred_io_buffer_duration(duration)
    }

    fn io_buffer_duration(&self) -> Duration {
        (**self).io_buffer_duration()
    }

    fn set_active(&self, active: bool) -> Result<()> {
        (**self).set_active(active)
    }

    fn input_available(&self) -> bool {
        (**self).input_available()
    }

    fn input_channels(&self) -> u32 {
        (**self).input_channels()
    }

    fn output_channels(&self) -> u32 {
        (**self).output_channels()
    }
}

impl<T: ProcessingUnit + ?Sized> ProcessingUnit for Arc<T> {
    fn configure(&self, config: &UnitConfiguration) -> Result<()> {
        (**self).configure(config)
    }

    fn set_active(&self, active: bool) {
        (**self).set_active(active)
    }

    fn is_active(&self) -> bool {
        (**self).is_active()
    }
}
