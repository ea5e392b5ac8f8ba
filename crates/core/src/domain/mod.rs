//! Domain entities and business rules

pub mod audio;
pub mod channels;
pub mod command;
pub mod config;
pub mod controller;
pub mod events;
pub mod negotiator;
pub mod policy;
mod reconciler;
pub mod status;

#[cfg(test)]
pub(crate) mod testing;

// Re-export specific items to avoid ambiguous glob imports
pub use audio::{
    Category, CategoryOptions, HardwareChannels, HardwareSession, ProcessingUnit, SessionError,
    SessionSnapshot, UnitConfiguration,
};
pub use channels::{resolve, ChannelRequest, ChannelSpec, EffectiveChannels, Resolution};
pub use command::{Command, CommandExecutor, CommandResult, ControlError};
pub use config::{ConfigError, ConfigManager, ConfigWatcher, ControllerConfig};
pub use controller::{
    AudioController, ControllerReport, ControllerSettings, ControllerState, ModeRequest,
};
pub use events::{EventBus, EventSubscription, ResumePolicy, RouteChangeReason, SessionEvent};
pub use negotiator::SessionNegotiator;
pub use policy::{options_for, Feature, FeatureFlags, OperatingMode};
pub use status::ConfigurationStatus;
