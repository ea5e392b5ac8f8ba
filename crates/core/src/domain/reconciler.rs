//! Session event reconciliation
//!
//! Interruptions, route changes and media-service resets arrive on the
//! controller's event subscription. Each one is handled here so that the
//! processing unit never runs with a layout the hardware no longer matches.

use crate::domain::audio::{HardwareSession, ProcessingUnit};
use crate::domain::channels::resolve;
use crate::domain::controller::{input_enabled_for, AudioController};
use crate::domain::events::{RouteChangeReason, SessionEvent};
use crate::domain::status::ConfigurationStatus;
use tracing::{debug, error, info, instrument, warn};

impl<S: HardwareSession, U: ProcessingUnit> AudioController<S, U> {
    /// Drain and handle every queued session event
    ///
    /// Returns the number of events processed.
    pub fn process_pending_events(&mut self) -> usize {
        let mut handled = 0;
        while let Some(event) = self.subscription.try_recv() {
            self.handle_event(event);
            handled += 1;
        }
        handled
    }

    #[instrument(skip(self))]
    pub fn handle_event(&mut self, event: SessionEvent) -> ConfigurationStatus {
        match event {
            SessionEvent::InterruptionBegan => self.begin_interruption(),
            SessionEvent::InterruptionEnded { should_resume } => self.end_interruption(should_resume),
            SessionEvent::RouteChanged { reason } => self.route_changed(reason),
            SessionEvent::MediaServicesReset => self.media_services_reset(),
        }
    }

    fn begin_interruption(&mut self) -> ConfigurationStatus {
        if self.mode.is_none() || !self.requested_active {
            debug!("Interruption while idle, nothing to suspend");
            return ConfigurationStatus::Ok;
        }
        self.unit.set_active(false);
        self.interrupted = true;
        info!("Audio interrupted, processing unit suspended");
        ConfigurationStatus::Ok
    }

    fn end_interruption(&mut self, should_resume: bool) -> ConfigurationStatus {
        if !self.interrupted {
            return ConfigurationStatus::Ok;
        }
        if !self.resume_policy.should_resume(should_resume) {
            info!(policy = ?self.resume_policy, "Interruption ended without resume hint, staying suspended");
            return ConfigurationStatus::Ok;
        }
        info!(resume = self.requested_active, "Interruption ended");
        let requested = self.requested_active;
        self.set_active(requested)
    }

    fn route_changed(&mut self, reason: RouteChangeReason) -> ConfigurationStatus {
        if !reason.affects_channels() {
            debug!(?reason, "Route change ignored");
            return ConfigurationStatus::Ok;
        }
        let Some(mode) = self.mode else {
            return ConfigurationStatus::Ok;
        };

        let hardware = self.negotiator.session().hardware_channels();
        let resolution = resolve(
            &self.channels,
            &hardware,
            self.flags.prefer_stereo,
            &self.effective,
        );
        if !resolution.changed {
            debug!(?reason, "Route change left channel layout unchanged");
            return ConfigurationStatus::Ok;
        }

        let category_has_input = self
            .negotiator
            .session()
            .category()
            .is_some_and(|category| category.supports_input());
        let input_enabled = input_enabled_for(mode, self.input_requested, &hardware)
            && category_has_input
            && hardware.input_available;
        let effective = resolution.with_input_enabled(input_enabled);

        info!(
            ?reason,
            input = effective.pushed_input(),
            output = effective.output,
            "Route change altered channel layout, reconfiguring"
        );
        let status = self.push_configuration(mode, effective);
        if !status.is_error() {
            self.effective = effective;
        }
        status
    }

    fn media_services_reset(&mut self) -> ConfigurationStatus {
        if self.negotiator.snapshot().is_unset() {
            debug!("Media services reset before any configuration");
            return ConfigurationStatus::Ok;
        }
        warn!("Media services reset, restoring session");

        let mut status = self.negotiator.restore_category();
        if status.is_error() {
            return status;
        }

        if self.interrupted {
            // Options go back on when the interruption ends
            self.options_pending = true;
            debug!("Media services reset while interrupted, unit stays suspended");
        } else if self.requested_active {
            self.options_pending = true;
            status |= self.set_active(true);
        } else if !self.negotiator.restore_options() {
            error!("Could not restore category options after reset");
            return ConfigurationStatus::Error;
        }
        if status.is_error() {
            return status;
        }

        let Some(mode) = self.mode else {
            return status;
        };
        let hardware = self.negotiator.session().hardware_channels();
        let resolution = resolve(
            &self.channels,
            &hardware,
            self.flags.prefer_stereo,
            &self.effective,
        );
        let input_enabled = input_enabled_for(mode, self.input_requested, &hardware);
        let effective = resolution.with_input_enabled(input_enabled);
        status |= self.push_configuration(mode, effective);
        if !status.is_error() {
            self.effective = effective;
            info!(%status, "Session restored after media services reset");
        }
        status
    }
}
