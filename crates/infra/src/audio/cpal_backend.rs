//! CPAL-based hardware session and processing unit
//!
//! Desktop hosts have no session categories, so category, options and
//! activation are kept as host-side bookkeeping. Sample rate, buffer size and
//! channel counts are probed from the default devices on every query, which
//! keeps the session current across device hot-plugs.

use cadenza_core::domain::audio::{
    Category, CategoryOptions, HardwareSession, ProcessingUnit, Result, SessionError,
    UnitConfiguration,
};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use crossbeam::channel::{bounded, Sender};
use serde::Serialize;
use std::sync::Mutex;
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::{debug, error, info, warn};

const FALLBACK_SAMPLE_RATE: f64 = 48000.0;
const FALLBACK_BUFFER_FRAMES: u32 = 512;

/// Names of the devices a [`CpalSession`] is currently probing
#[derive(Debug, Clone, Serialize)]
pub struct HostDescription {
    pub host: String,
    pub input_device: Option<String>,
    pub output_device: Option<String>,
}

struct Bookkeeping {
    category: Option<Category>,
    options: CategoryOptions,
    preferred_rate: f64,
    rate: f64,
    io_frames: u32,
    active: bool,
}

/// Hardware session backed by the host's default audio devices
pub struct CpalSession {
    state: Mutex<Bookkeeping>,
}

impl Default for CpalSession {
    fn default() -> Self {
        info!("Initializing CPAL session");
        Self::new()
    }
}

impl CpalSession {
    pub fn new() -> Self {
        let host = cpal::default_host();
        debug!("Using audio host: {:?}", host.id());

        let default_config = host
            .default_output_device()
            .and_then(|device| device.default_output_config().ok());
        let rate = default_config
            .as_ref()
            .map(|config| f64::from(config.sample_rate()))
            .unwrap_or(FALLBACK_SAMPLE_RATE);
        let io_frames = match default_config.as_ref().map(|config| config.buffer_size()) {
            Some(cpal::SupportedBufferSize::Range { min, .. }) => (*min).max(FALLBACK_BUFFER_FRAMES),
            _ => FALLBACK_BUFFER_FRAMES,
        };

        Self {
            state: Mutex::new(Bookkeeping {
                category: None,
                options: CategoryOptions::empty(),
                preferred_rate: 0.0,
                rate,
                io_frames,
                active: false,
            }),
        }
    }

    pub fn describe(&self) -> HostDescription {
        let host = cpal::default_host();
        #[allow(deprecated)]
        let input_device = host
            .default_input_device()
            .and_then(|device| device.name().ok());
        #[allow(deprecated)]
        let output_device = host
            .default_output_device()
            .and_then(|device| device.name().ok());
        HostDescription {
            host: format!("{:?}", host.id()),
            input_device,
            output_device,
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Bookkeeping> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn output_device() -> Result<cpal::Device> {
        cpal::default_host()
            .default_output_device()
            .ok_or_else(|| SessionError::Unavailable("No default output device".to_string()))
    }

    /// Supported rate closest to `requested` across the device's ranges
    fn nearest_supported_rate(device: &cpal::Device, requested: f64) -> Option<f64> {
        let configs = device.supported_output_configs().ok()?;
        configs
            .map(|range| {
                let min = f64::from(range.min_sample_rate());
                let max = f64::from(range.max_sample_rate());
                requested.clamp(min, max)
            })
            .min_by(|a, b| {
                (a - requested)
                    .abs()
                    .partial_cmp(&(b - requested).abs())
                    .unwrap_or(std::cmp::Ordering::Equal)
            })
    }
}

impl HardwareSession for CpalSession {
    fn set_category(&self, category: &Category) -> Result<()> {
        let mut state = self.lock();
        state.category = Some(category.clone());
        state.options = CategoryOptions::empty();
        debug!(%category, "Category recorded");
        Ok(())
    }

    fn set_category_with_options(&self, category: &Category, options: CategoryOptions) -> Result<()> {
        let mut state = self.lock();
        state.category = Some(category.clone());
        state.options = options;
        debug!(%category, ?options, "Category options recorded");
        Ok(())
    }

    fn category(&self) -> Option<Category> {
        self.lock().category.clone()
    }

    fn category_options(&self) -> CategoryOptions {
        self.lock().options
    }

    fn set_preferred_sample_rate(&self, hz: f64) -> Result<()> {
        let device = Self::output_device()?;
        let granted = Self::nearest_supported_rate(&device, hz).ok_or_else(|| {
            SessionError::rejected("set_preferred_sample_rate", "device reports no output configurations")
        })?;

        let mut state = self.lock();
        state.preferred_rate = hz;
        state.rate = granted;
        if (granted - hz).abs() > f64::EPSILON {
            warn!(requested = hz, granted, "Device does not support requested sample rate");
        }
        Ok(())
    }

    fn preferred_sample_rate(&self) -> f64 {
        self.lock().preferred_rate
    }

    fn sample_rate(&self) -> f64 {
        self.lock().rate
    }

    fn set_preferred_io_buffer_duration(&self, duration: Duration) -> Result<()> {
        let device = Self::output_device()?;
        let config = device
            .default_output_config()
            .map_err(|e| SessionError::Unavailable(e.to_string()))?;

        let mut state = self.lock();
        let frames = (duration.as_secs_f64() * state.rate).floor() as u32;
        state.io_frames = match config.buffer_size() {
            cpal::SupportedBufferSize::Range { min, max } => frames.clamp(*min, *max),
            cpal::SupportedBufferSize::Unknown => frames.max(1),
        };
        debug!(frames = state.io_frames, "IO buffer size recorded");
        Ok(())
    }

    fn io_buffer_duration(&self) -> Duration {
        let state = self.lock();
        Duration::from_secs_f64(f64::from(state.io_frames) / state.rate)
    }

    fn set_active(&self, active: bool) -> Result<()> {
        if active {
            Self::output_device()?;
        }
        self.lock().active = active;
        Ok(())
    }

    fn input_available(&self) -> bool {
        cpal::default_host().default_input_device().is_some()
    }

    fn input_channels(&self) -> u32 {
        cpal::default_host()
            .default_input_device()
            .and_then(|device| device.default_input_config().ok())
            .map(|config| u32::from(config.channels()))
            .unwrap_or(0)
    }

    fn output_channels(&self) -> u32 {
        cpal::default_host()
            .default_output_device()
            .and_then(|device| device.default_output_config().ok())
            .map(|config| u32::from(config.channels()))
            .unwrap_or(0)
    }
}

struct RunningStream {
    stop: Sender<()>,
    thread: JoinHandle<()>,
}

/// Processing unit that renders silence through the default output device
///
/// The CPAL stream lives on its own thread for as long as the unit is
/// active; deactivation stops and joins that thread.
#[derive(Default)]
pub struct CpalUnit {
    config: Mutex<Option<UnitConfiguration>>,
    running: Mutex<Option<RunningStream>>,
}

impl CpalUnit {
    pub fn new() -> Self {
        Self::default()
    }

    fn start(config: UnitConfiguration) -> Option<RunningStream> {
        if config.output_channels == 0 {
            warn!("No output channels configured, not opening a stream");
            return None;
        }

        let (stop, stopped) = bounded::<()>(1);
        let thread = std::thread::spawn(move || {
            let device = match cpal::default_host().default_output_device() {
                Some(device) => device,
                None => {
                    error!("No default output device");
                    return;
                }
            };

            let stream_config = cpal::StreamConfig {
                channels: config.output_channels as u16,
                sample_rate: config.sample_rate.round() as u32,
                buffer_size: cpal::BufferSize::Default,
            };

            let stream = match device.build_output_stream(
                &stream_config,
                |data: &mut [f32], _: &cpal::OutputCallbackInfo| data.fill(0.0),
                |err| error!("Output stream error: {}", err),
                None,
            ) {
                Ok(stream) => stream,
                Err(e) => {
                    error!("Failed to build stream: {}", e);
                    return;
                }
            };

            if let Err(e) = stream.play() {
                error!("Failed to start stream: {}", e);
                return;
            }
            info!(?stream_config, "Output stream running");

            let _ = stopped.recv();
            drop(stream);
            debug!("Output stream stopped");
        });

        Some(RunningStream { stop, thread })
    }

    fn stop(running: RunningStream) {
        let _ = running.stop.send(());
        if running.thread.join().is_err() {
            error!("Output stream thread panicked");
        }
    }
}

impl ProcessingUnit for CpalUnit {
    fn configure(&self, config: &UnitConfiguration) -> Result<()> {
        if config.sample_rate <= 0.0 || config.output_channels > u32::from(u16::MAX) {
            return Err(SessionError::UnitConfiguration(format!(
                "unsupported stream layout: {:?}",
                config
            )));
        }
        *self.config.lock().unwrap_or_else(|e| e.into_inner()) = Some(*config);
        Ok(())
    }

    fn set_active(&self, active: bool) {
        let mut running = self.running.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(current) = running.take() {
            Self::stop(current);
        }
        if active {
            let config = *self.config.lock().unwrap_or_else(|e| e.into_inner());
            match config {
                Some(config) => *running = Self::start(config),
                None => warn!("Processing unit activated before configuration"),
            }
        }
    }

    fn is_active(&self) -> bool {
        self.running
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .is_some()
    }
}

impl Drop for CpalUnit {
    fn drop(&mut self) {
        let running = self
            .running
            .get_mut()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        if let Some(running) = running {
            Self::stop(running);
        }
    }
}
