//! Session negotiation: category, options, sample rate and buffering
//!
//! Every step asks the hardware session for something, reads back what was
//! actually granted, and reports the difference as a [`ConfigurationStatus`].
//! All mutation of the hardware session flows through this type.

use crate::domain::audio::{Category, CategoryOptions, HardwareSession, SessionSnapshot};
use crate::domain::policy::{options_for, FeatureFlags};
use crate::domain::status::ConfigurationStatus;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Largest sample-rate difference still treated as an exact grant, in Hz
pub const SAMPLE_RATE_TOLERANCE: f64 = 1e-4;

/// Frames per processing block when nothing else is configured
pub const DEFAULT_BLOCK_SIZE: u32 = 64;

/// IO buffer duration that should hold `ticks` blocks at `sample_rate`
///
/// Half a frame is added so that hardware which truncates durations to whole
/// frames still lands on the requested block count.
pub fn buffer_duration_for(ticks: u32, block_size: u32, sample_rate: f64) -> Duration {
    let frames = f64::from(block_size) * f64::from(ticks) + 0.5;
    Duration::from_secs_f64(frames / sample_rate)
}

/// Whole blocks delivered per IO buffer of `duration` at `sample_rate`
pub fn ticks_for_duration(duration: Duration, block_size: u32, sample_rate: f64) -> u32 {
    if block_size == 0 {
        return 0;
    }
    let ticks = (duration.as_secs_f64() * sample_rate / f64::from(block_size)).round();
    ticks.max(0.0) as u32
}

/// Drives the hardware session and caches what it confirmed
pub struct SessionNegotiator<S> {
    session: S,
    snapshot: SessionSnapshot,
}

impl<S: HardwareSession> SessionNegotiator<S> {
    pub fn new(session: S) -> Self {
        Self {
            session,
            snapshot: SessionSnapshot::default(),
        }
    }

    pub fn session(&self) -> &S {
        &self.session
    }

    pub fn snapshot(&self) -> &SessionSnapshot {
        &self.snapshot
    }

    /// Effective sample rate last confirmed by the session
    pub fn sample_rate(&self) -> f64 {
        self.snapshot.sample_rate
    }

    /// Request `category`, apply the policy options for it, then activate
    ///
    /// Any rejected sub-step short-circuits to `Error`. On success the
    /// confirmed category and options are cached; a downgraded category or
    /// missing option bits yield `PropertyChanged`.
    pub fn set_category(&mut self, category: &Category, flags: &FeatureFlags) -> ConfigurationStatus {
        if let Err(e) = self.session.set_category(category) {
            error!(%category, error = %e, "Category rejected");
            return ConfigurationStatus::Error;
        }

        let options = options_for(category, flags);
        if !self.apply_options(options) {
            error!(%category, ?options, "Category options rejected");
            return ConfigurationStatus::Error;
        }

        if let Err(e) = self.session.set_active(true) {
            error!(%category, error = %e, "Session activation rejected");
            return ConfigurationStatus::Error;
        }

        self.refresh_snapshot();

        let granted_category = self.snapshot.category.as_ref() == Some(category);
        let granted_options = self.snapshot.options.contains(options);
        if !granted_category || !granted_options {
            warn!(
                requested = %category,
                granted = ?self.snapshot.category,
                requested_options = ?options,
                granted_options = ?self.snapshot.options,
                "Session granted a different category configuration"
            );
        } else {
            info!(%category, options = ?self.snapshot.options, "Session category set");
        }

        ConfigurationStatus::exact_or_changed(granted_category && granted_options)
    }

    /// Ask for a preferred sample rate and cache whatever the session runs at
    pub fn set_sample_rate(&mut self, requested_hz: f64) -> ConfigurationStatus {
        if let Err(e) = self.session.set_preferred_sample_rate(requested_hz) {
            error!(requested_hz, error = %e, "Preferred sample rate rejected");
            return ConfigurationStatus::Error;
        }

        let granted = self.session.sample_rate();
        self.snapshot.sample_rate = granted;

        let exact = (granted - requested_hz).abs() <= SAMPLE_RATE_TOLERANCE;
        if exact {
            debug!(sample_rate = granted, "Sample rate granted");
        } else {
            warn!(requested_hz, granted, "Session granted a different sample rate");
        }
        ConfigurationStatus::exact_or_changed(exact)
    }

    /// Request an IO buffer holding `ticks` blocks and read back the result
    pub fn set_ticks_per_buffer(&mut self, ticks: u32, block_size: u32) -> ConfigurationStatus {
        if ticks == 0 || block_size == 0 {
            error!(ticks, block_size, "Ticks per buffer and block size must be positive");
            return ConfigurationStatus::Error;
        }

        let sample_rate = self.current_sample_rate();
        if sample_rate <= 0.0 {
            error!(sample_rate, "No usable sample rate for buffer sizing");
            return ConfigurationStatus::Error;
        }

        let duration = buffer_duration_for(ticks, block_size, sample_rate);
        if let Err(e) = self.session.set_preferred_io_buffer_duration(duration) {
            error!(ticks, ?duration, error = %e, "IO buffer duration rejected");
            return ConfigurationStatus::Error;
        }

        let granted = self.ticks_per_buffer(block_size);
        self.snapshot.ticks_per_buffer = granted;

        if granted == ticks {
            debug!(ticks, ?duration, "Ticks per buffer granted");
        } else {
            warn!(requested = ticks, granted, "Session granted a different buffer size");
        }
        ConfigurationStatus::exact_or_changed(granted == ticks)
    }

    /// Blocks per IO buffer as the session currently reports it
    pub fn ticks_per_buffer(&self, block_size: u32) -> u32 {
        ticks_for_duration(
            self.session.io_buffer_duration(),
            block_size,
            self.current_sample_rate(),
        )
    }

    /// Merge `options` into the session's active options and commit
    ///
    /// Option bits already granted by the hardware are kept.
    pub fn apply_options(&mut self, options: CategoryOptions) -> bool {
        let Some(category) = self.session.category() else {
            warn!(?options, "Cannot apply options without an active category");
            return false;
        };

        let merged = self.session.category_options() | options;
        match self.session.set_category_with_options(&category, merged) {
            Ok(()) => {
                debug!(%category, options = ?merged, "Category options applied");
                true
            }
            Err(e) => {
                error!(%category, options = ?merged, error = %e, "Category options rejected");
                false
            }
        }
    }

    /// Put back the category and options of an earlier snapshot
    ///
    /// Used when a configuration is abandoned after the session already
    /// switched category. Nothing is requested if `previous` had no category.
    pub fn revert_category(&mut self, previous: &SessionSnapshot) -> bool {
        let Some(category) = previous.category.as_ref() else {
            return true;
        };
        match self
            .session
            .set_category_with_options(category, previous.options)
        {
            Ok(()) => {
                self.refresh_snapshot();
                info!(%category, options = ?previous.options, "Previous session category reinstated");
                true
            }
            Err(e) => {
                error!(%category, error = %e, "Could not reinstate previous category");
                self.refresh_snapshot();
                false
            }
        }
    }

    /// Re-request the cached category after the session lost its state
    pub fn restore_category(&mut self) -> ConfigurationStatus {
        let Some(category) = self.snapshot.category.clone() else {
            return ConfigurationStatus::Ok;
        };

        if let Err(e) = self.session.set_category(&category) {
            error!(%category, error = %e, "Category restore rejected");
            return ConfigurationStatus::Error;
        }
        if let Err(e) = self.session.set_active(true) {
            error!(%category, error = %e, "Session reactivation rejected");
            return ConfigurationStatus::Error;
        }

        let granted = self.session.category();
        let exact = granted.as_ref() == Some(&category);
        if !exact {
            warn!(requested = %category, ?granted, "Restored category differs");
        }
        ConfigurationStatus::exact_or_changed(exact)
    }

    /// Re-apply the cached options directly and refresh the snapshot
    pub fn restore_options(&mut self) -> bool {
        let options = self.snapshot.options;
        let applied = self.apply_options(options);
        if applied {
            self.refresh_snapshot();
        }
        applied
    }

    /// Read the granted category and options back from the session
    pub fn refresh_snapshot(&mut self) {
        self.snapshot.category = self.session.category();
        self.snapshot.options = self.session.category_options();
    }

    fn current_sample_rate(&self) -> f64 {
        if self.snapshot.sample_rate > 0.0 {
            self.snapshot.sample_rate
        } else {
            self.session.sample_rate()
        }
    }
}
