//! Configuration orchestrator
//!
//! [`AudioController`] owns the requested configuration, drives the
//! [`SessionNegotiator`] for each operating mode and pushes the resolved
//! channel layout into the processing unit. Event reconciliation lives in
//! `reconciler.rs` as a second `impl` block on the same type.
//!
//! ```text
//! configure(mode) ──► sample rate ──► category/options/activation
//!                                            │
//!              processing unit ◄── push ◄── resolve channels
//! ```
//!
//! Parameter pushes only ever reach the unit while it is deactivated; the
//! real-time path observes nothing but the final activation toggle.

use crate::domain::audio::{
    CategoryOptions, HardwareChannels, HardwareSession, ProcessingUnit, SessionSnapshot,
    UnitConfiguration,
};
use crate::domain::channels::{resolve, ChannelRequest, ChannelSpec, EffectiveChannels};
use crate::domain::events::{EventBus, EventSubscription, ResumePolicy, SessionEvent};
use crate::domain::negotiator::{SessionNegotiator, DEFAULT_BLOCK_SIZE};
use crate::domain::policy::{options_for, Feature, FeatureFlags, OperatingMode};
use crate::domain::status::ConfigurationStatus;
use crossbeam::channel::Receiver;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

/// Parameters of a single configure call
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ModeRequest {
    pub sample_rate: f64,
    pub channels: ChannelRequest,
    /// Wire up input when the mode and hardware allow it
    pub input_enabled: bool,
}

impl ModeRequest {
    pub fn new(sample_rate: f64, channels: ChannelRequest) -> Self {
        Self {
            sample_rate,
            channels,
            input_enabled: true,
        }
    }

    pub fn with_input_enabled(mut self, input_enabled: bool) -> Self {
        self.input_enabled = input_enabled;
        self
    }
}

/// Externally visible controller state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", content = "mode", rename_all = "snake_case")]
pub enum ControllerState {
    Unconfigured,
    Configured(OperatingMode),
    Active(OperatingMode),
    Interrupted(OperatingMode),
}

/// Construction-time settings
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ControllerSettings {
    pub flags: FeatureFlags,
    /// Frames per processing block, used for ticks-per-buffer conversion
    pub block_size: u32,
    pub resume_policy: ResumePolicy,
}

impl Default for ControllerSettings {
    fn default() -> Self {
        Self {
            flags: FeatureFlags::default(),
            block_size: DEFAULT_BLOCK_SIZE,
            resume_policy: ResumePolicy::default(),
        }
    }
}

/// Serializable view of the controller for diagnostics
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ControllerReport {
    pub state: ControllerState,
    pub requested_channels: ChannelRequest,
    pub input_requested: bool,
    pub effective_channels: EffectiveChannels,
    pub flags: FeatureFlags,
    pub session: SessionSnapshot,
    pub options_pending: bool,
    pub requested_active: bool,
    pub resume_policy: ResumePolicy,
}

impl ControllerReport {
    pub fn to_json_pretty(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

/// Top-level state machine over the hardware session and processing unit
pub struct AudioController<S: HardwareSession, U: ProcessingUnit> {
    pub(crate) negotiator: SessionNegotiator<S>,
    pub(crate) unit: U,
    pub(crate) subscription: EventSubscription,
    pub(crate) flags: FeatureFlags,
    pub(crate) block_size: u32,
    pub(crate) resume_policy: ResumePolicy,
    pub(crate) mode: Option<OperatingMode>,
    pub(crate) channels: ChannelRequest,
    pub(crate) input_requested: bool,
    pub(crate) effective: EffectiveChannels,
    pub(crate) requested_active: bool,
    pub(crate) interrupted: bool,
    pub(crate) options_pending: bool,
}

impl<S: HardwareSession, U: ProcessingUnit> AudioController<S, U> {
    /// Create a controller and subscribe it to `bus`
    pub fn new(session: S, unit: U, bus: &EventBus, settings: ControllerSettings) -> Self {
        info!(
            block_size = settings.block_size,
            resume_policy = ?settings.resume_policy,
            "Creating audio controller"
        );
        Self {
            negotiator: SessionNegotiator::new(session),
            unit,
            subscription: bus.subscribe(),
            flags: settings.flags,
            block_size: settings.block_size.max(1),
            resume_policy: settings.resume_policy,
            mode: None,
            channels: ChannelRequest::default(),
            input_requested: false,
            effective: EffectiveChannels::default(),
            requested_active: false,
            interrupted: false,
            options_pending: false,
        }
    }

    pub fn state(&self) -> ControllerState {
        match self.mode {
            None => ControllerState::Unconfigured,
            Some(mode) if self.interrupted => ControllerState::Interrupted(mode),
            Some(mode) if self.unit.is_active() => ControllerState::Active(mode),
            Some(mode) => ControllerState::Configured(mode),
        }
    }

    pub fn mode(&self) -> Option<OperatingMode> {
        self.mode
    }

    pub fn session(&self) -> &S {
        self.negotiator.session()
    }

    pub fn unit(&self) -> &U {
        &self.unit
    }

    pub fn snapshot(&self) -> &SessionSnapshot {
        self.negotiator.snapshot()
    }

    pub fn effective_channels(&self) -> EffectiveChannels {
        self.effective
    }

    pub fn channel_request(&self) -> ChannelRequest {
        self.channels
    }

    pub fn feature_flags(&self) -> FeatureFlags {
        self.flags
    }

    pub fn resume_policy(&self) -> ResumePolicy {
        self.resume_policy
    }

    pub fn set_resume_policy(&mut self, policy: ResumePolicy) {
        self.resume_policy = policy;
    }

    /// Whether the caller wants the unit running, interruptions aside
    pub fn is_active_requested(&self) -> bool {
        self.requested_active
    }

    /// Feature flags changed while inactive and still await application
    pub fn options_pending(&self) -> bool {
        self.options_pending
    }

    /// Effective sample rate confirmed by the hardware session
    pub fn sample_rate(&self) -> f64 {
        self.negotiator.sample_rate()
    }

    /// Blocks per IO buffer as the hardware currently delivers them
    pub fn ticks_per_buffer(&self) -> u32 {
        self.negotiator.ticks_per_buffer(self.block_size)
    }

    pub fn block_size(&self) -> u32 {
        self.block_size
    }

    /// Session events waiting to be reconciled
    pub fn events(&self) -> &Receiver<SessionEvent> {
        self.subscription.receiver()
    }

    pub fn report(&self) -> ControllerReport {
        ControllerReport {
            state: self.state(),
            requested_channels: self.channels,
            input_requested: self.input_requested,
            effective_channels: self.effective,
            flags: self.flags,
            session: self.negotiator.snapshot().clone(),
            options_pending: self.options_pending,
            requested_active: self.requested_active,
            resume_policy: self.resume_policy,
        }
    }

    pub fn configure_playback(&mut self, request: ModeRequest) -> ConfigurationStatus {
        self.configure(OperatingMode::Playback, request)
    }

    pub fn configure_record(&mut self, request: ModeRequest) -> ConfigurationStatus {
        self.configure(OperatingMode::Record, request)
    }

    pub fn configure_ambient(&mut self, request: ModeRequest) -> ConfigurationStatus {
        self.configure(OperatingMode::Ambient, request)
    }

    pub fn configure_solo_ambient(&mut self, request: ModeRequest) -> ConfigurationStatus {
        self.configure(OperatingMode::SoloAmbient, request)
    }

    pub fn configure_play_and_record(&mut self, request: ModeRequest) -> ConfigurationStatus {
        self.configure(OperatingMode::PlayAndRecord, request)
    }

    pub fn configure_multi_route(&mut self, request: ModeRequest) -> ConfigurationStatus {
        self.configure(OperatingMode::MultiRoute, request)
    }

    /// Negotiate `mode` with the hardware and push the result into the unit
    ///
    /// Aborts on the first `Error`; the previous configuration stays in place.
    pub fn configure(&mut self, mode: OperatingMode, request: ModeRequest) -> ConfigurationStatus {
        info!(
            %mode,
            sample_rate = request.sample_rate,
            input = %request.channels.input,
            output = %request.channels.output,
            input_enabled = request.input_enabled,
            "Configuring audio controller"
        );

        if let Err(reason) = validate_request(mode, &request) {
            error!(%mode, reason, "Invalid configuration request");
            return ConfigurationStatus::Error;
        }

        let mut status = self.negotiator.set_sample_rate(request.sample_rate);
        if status.is_error() {
            return status;
        }

        let previous = self.negotiator.snapshot().clone();
        status |= self.negotiator.set_category(&mode.category(), &self.flags);
        if status.is_error() {
            return status;
        }

        let hardware = self.negotiator.session().hardware_channels();
        let resolution = resolve(
            &request.channels,
            &hardware,
            self.flags.prefer_stereo,
            &self.effective,
        );

        if mode.uses_output() && resolution.output == 0 {
            error!(%mode, "No output channels available");
            return self.abandon_configure(&previous);
        }
        if mode == OperatingMode::Record && (resolution.input == 0 || !hardware.input_available) {
            error!(%mode, input = resolution.input, "No input channels available for recording");
            return self.abandon_configure(&previous);
        }

        let input_enabled = input_enabled_for(mode, request.input_enabled, &hardware);
        let effective = resolution.with_input_enabled(input_enabled);
        status |= self.push_configuration(mode, effective);
        if status.is_error() {
            return self.abandon_configure(&previous);
        }

        self.mode = Some(mode);
        self.channels = request.channels;
        self.input_requested = request.input_enabled;
        self.effective = effective;
        self.options_pending = false;

        info!(
            %mode,
            %status,
            input = effective.pushed_input(),
            output = effective.output,
            sample_rate = self.negotiator.sample_rate(),
            "Audio controller configured"
        );
        status
    }

    /// Reinstate the session category of the last good configuration
    fn abandon_configure(&mut self, previous: &SessionSnapshot) -> ConfigurationStatus {
        if self.mode.is_some() && !self.negotiator.revert_category(previous) {
            warn!(
                mode = ?self.mode,
                session = ?self.negotiator.snapshot().category,
                "Session category no longer matches the configured mode"
            );
        }
        ConfigurationStatus::Error
    }

    /// Request an IO buffer of `ticks` processing blocks
    pub fn configure_ticks_per_buffer(&mut self, ticks: u32) -> ConfigurationStatus {
        self.negotiator.set_ticks_per_buffer(ticks, self.block_size)
    }

    /// Toggle the processing unit, applying deferred options on activation
    pub fn set_active(&mut self, active: bool) -> ConfigurationStatus {
        if !active {
            self.requested_active = false;
            self.interrupted = false;
            self.unit.set_active(false);
            debug!("Processing unit deactivated");
            return ConfigurationStatus::Ok;
        }

        if self.mode.is_none() {
            warn!("Cannot activate an unconfigured controller");
            return ConfigurationStatus::Error;
        }

        if self.options_pending {
            let options = self.current_options();
            if !self.negotiator.apply_options(options) {
                error!(?options, "Deferred options rejected on activation");
                return ConfigurationStatus::Error;
            }
            self.negotiator.refresh_snapshot();
            self.options_pending = false;
            debug!(?options, "Deferred options applied");
        }

        self.requested_active = true;
        self.interrupted = false;
        self.unit.set_active(true);
        debug!("Processing unit activated");
        ConfigurationStatus::Ok
    }

    pub fn set_feature(&mut self, feature: Feature, enabled: bool) -> ConfigurationStatus {
        let mut flags = self.flags;
        flags.set(feature, enabled);
        self.set_feature_flags(flags)
    }

    /// Replace the feature flags and reconcile the session options
    ///
    /// While active the new options are merged into the session right away;
    /// otherwise they are marked pending and applied on the next activation.
    pub fn set_feature_flags(&mut self, flags: FeatureFlags) -> ConfigurationStatus {
        if flags == self.flags {
            return ConfigurationStatus::Ok;
        }
        self.flags = flags;

        if self.mode.is_none() {
            debug!("Feature flags stored for the next configuration");
            return ConfigurationStatus::Ok;
        }

        if self.state_is_active() {
            let options = self.current_options();
            if self.negotiator.apply_options(options) {
                self.negotiator.refresh_snapshot();
                ConfigurationStatus::Ok
            } else {
                self.options_pending = true;
                ConfigurationStatus::Error
            }
        } else {
            debug!("Feature flags changed while inactive, options pending");
            self.options_pending = true;
            ConfigurationStatus::Ok
        }
    }

    pub(crate) fn state_is_active(&self) -> bool {
        matches!(self.state(), ControllerState::Active(_))
    }

    /// Options implied by the flags for the negotiated category
    pub(crate) fn current_options(&self) -> CategoryOptions {
        self.negotiator
            .snapshot()
            .category
            .clone()
            .or_else(|| self.mode.map(OperatingMode::category))
            .map(|category| options_for(&category, &self.flags))
            .unwrap_or_else(CategoryOptions::empty)
    }

    /// Push `effective` into the unit while it is deactivated
    ///
    /// Modes without output get zero output channels. The unit's prior active
    /// flag is restored afterwards. A failed push leaves the unit inactive.
    pub(crate) fn push_configuration(
        &mut self,
        mode: OperatingMode,
        effective: EffectiveChannels,
    ) -> ConfigurationStatus {
        let was_active = self.unit.is_active();
        if was_active {
            self.unit.set_active(false);
        }

        let config = UnitConfiguration {
            sample_rate: self.negotiator.sample_rate(),
            input_channels: effective.pushed_input(),
            output_channels: if mode.uses_output() { effective.output } else { 0 },
            buffering_enabled: self.flags.buffer_samples,
        };

        match self.unit.configure(&config) {
            Ok(()) => {
                debug!(?config, "Processing unit configured");
                if was_active {
                    self.unit.set_active(true);
                }
                ConfigurationStatus::Ok
            }
            Err(e) => {
                error!(?config, error = %e, "Processing unit rejected configuration");
                self.requested_active = false;
                ConfigurationStatus::Error
            }
        }
    }
}

impl<S: HardwareSession, U: ProcessingUnit> Drop for AudioController<S, U> {
    fn drop(&mut self) {
        info!("Releasing audio controller");
        self.unit.set_active(false);
    }
}

fn validate_request(mode: OperatingMode, request: &ModeRequest) -> Result<(), &'static str> {
    if !request.sample_rate.is_finite() || request.sample_rate <= 0.0 {
        return Err("sample rate must be positive");
    }
    if mode.uses_output() && request.channels.output == ChannelSpec::Fixed(0) {
        return Err("mode requires at least one output channel");
    }
    if mode == OperatingMode::Record && request.channels.input == ChannelSpec::Fixed(0) {
        return Err("recording requires at least one input channel");
    }
    Ok(())
}

/// Whether input gets wired up for `mode` on the given hardware
pub(crate) fn input_enabled_for(
    mode: OperatingMode,
    requested: bool,
    hardware: &HardwareChannels,
) -> bool {
    if mode == OperatingMode::Record {
        return hardware.input_available;
    }
    if !mode.uses_input() {
        return false;
    }
    if requested && !hardware.input_available {
        warn!(%mode, "Hardware input unavailable, continuing output only");
        return false;
    }
    requested
}
