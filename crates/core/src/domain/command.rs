//! Control commands
//!
//! Every mutating entry point of the controller expressed as data, so that
//! callers on other threads can hand requests to the single control path.

use crate::domain::audio::{HardwareSession, ProcessingUnit};
use crate::domain::controller::{AudioController, ControllerReport, ModeRequest};
use crate::domain::policy::{Feature, FeatureFlags, OperatingMode};
use crate::domain::status::ConfigurationStatus;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum Command {
    Configure {
        mode: OperatingMode,
        request: ModeRequest,
    },
    SetActive {
        active: bool,
    },
    SetFeature {
        feature: Feature,
        enabled: bool,
    },
    SetFeatureFlags {
        flags: FeatureFlags,
    },
    SetTicksPerBuffer {
        ticks: u32,
    },
    Report,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum CommandResult {
    Status(ConfigurationStatus),
    Report(Box<ControllerReport>),
}

impl CommandResult {
    /// Status of the command; reports always succeed
    pub fn status(&self) -> ConfigurationStatus {
        match self {
            CommandResult::Status(status) => *status,
            CommandResult::Report(_) => ConfigurationStatus::Ok,
        }
    }

    pub fn into_report(self) -> Option<ControllerReport> {
        match self {
            CommandResult::Report(report) => Some(*report),
            CommandResult::Status(_) => None,
        }
    }
}

/// Failure to deliver a command, as opposed to a rejected configuration
#[derive(Debug, Error)]
pub enum ControlError {
    #[error("Control loop is not running")]
    Closed,

    #[error("Control loop dropped the reply")]
    NoReply,
}

/// Anything that can run controller commands
#[async_trait]
pub trait CommandExecutor: Send + Sync {
    async fn execute(&self, command: Command) -> Result<CommandResult, ControlError>;
}

impl<S: HardwareSession, U: ProcessingUnit> AudioController<S, U> {
    /// Run one command against the controller
    pub fn execute(&mut self, command: Command) -> CommandResult {
        match command {
            Command::Configure { mode, request } => CommandResult::Status(self.configure(mode, request)),
            Command::SetActive { active } => CommandResult::Status(self.set_active(active)),
            Command::SetFeature { feature, enabled } => {
                CommandResult::Status(self.set_feature(feature, enabled))
            }
            Command::SetFeatureFlags { flags } => CommandResult::Status(self.set_feature_flags(flags)),
            Command::SetTicksPerBuffer { ticks } => {
                CommandResult::Status(self.configure_ticks_per_buffer(ticks))
            }
            Command::Report => CommandResult::Report(Box::new(self.report())),
        }
    }
}
