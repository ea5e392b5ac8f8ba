//! In-memory hardware session and processing unit
//!
//! [`SimulatedSession`] behaves like a platform audio session that grants
//! "close enough" values: the nearest supported sample rate, IO buffers
//! quantized to whole frames, and only the option bits it is willing to
//! honour. Every mutating call is logged so callers can assert on the exact
//! hardware traffic, and any operation can be made to fail on demand.

use cadenza_core::domain::audio::{
    Category, CategoryOptions, HardwareSession, ProcessingUnit, Result, SessionError,
    UnitConfiguration,
};
use cadenza_core::domain::events::{EventBus, RouteChangeReason, SessionEvent};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tracing::debug;

/// Mutating session operations, for fault injection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    SetCategory,
    SetCategoryWithOptions,
    SetPreferredSampleRate,
    SetPreferredIoBufferDuration,
    SetActive,
}

impl Operation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::SetCategory => "set_category",
            Operation::SetCategoryWithOptions => "set_category_with_options",
            Operation::SetPreferredSampleRate => "set_preferred_sample_rate",
            Operation::SetPreferredIoBufferDuration => "set_preferred_io_buffer_duration",
            Operation::SetActive => "set_active",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One logged call against the simulated session
#[derive(Debug, Clone, PartialEq)]
pub enum SessionCall {
    SetCategory(Category),
    SetCategoryWithOptions(Category, CategoryOptions),
    SetPreferredSampleRate(f64),
    SetPreferredIoBufferDuration(Duration),
    SetActive(bool),
}

impl SessionCall {
    pub fn operation(&self) -> Operation {
        match self {
            SessionCall::SetCategory(_) => Operation::SetCategory,
            SessionCall::SetCategoryWithOptions(..) => Operation::SetCategoryWithOptions,
            SessionCall::SetPreferredSampleRate(_) => Operation::SetPreferredSampleRate,
            SessionCall::SetPreferredIoBufferDuration(_) => Operation::SetPreferredIoBufferDuration,
            SessionCall::SetActive(_) => Operation::SetActive,
        }
    }
}

struct SessionState {
    category: Option<Category>,
    options: CategoryOptions,
    grantable: CategoryOptions,
    substitutions: HashMap<Category, Category>,
    supported_rates: Vec<f64>,
    preferred_rate: f64,
    rate: f64,
    io_frames: u32,
    frame_range: (u32, u32),
    active: bool,
    input_available: bool,
    input_channels: u32,
    output_channels: u32,
    rejected: HashSet<Operation>,
    calls: Vec<SessionCall>,
}

/// Simulated platform audio session
pub struct SimulatedSession {
    state: Mutex<SessionState>,
    events: EventBus,
}

impl Default for SimulatedSession {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulatedSession {
    /// A stereo-out, mono-in session at 48 kHz with a 1024-frame buffer
    pub fn new() -> Self {
        Self {
            state: Mutex::new(SessionState {
                category: None,
                options: CategoryOptions::empty(),
                grantable: CategoryOptions::all(),
                substitutions: HashMap::new(),
                supported_rates: vec![44100.0, 48000.0],
                preferred_rate: 0.0,
                rate: 48000.0,
                io_frames: 1024,
                frame_range: (32, 4096),
                active: false,
                input_available: true,
                input_channels: 1,
                output_channels: 2,
                rejected: HashSet::new(),
                calls: Vec::new(),
            }),
            events: EventBus::new(),
        }
    }

    pub fn with_supported_rates(self, rates: impl Into<Vec<f64>>) -> Self {
        self.lock().supported_rates = rates.into();
        self
    }

    pub fn with_route(self, input: u32, output: u32, input_available: bool) -> Self {
        self.set_route(input, output, input_available);
        self
    }

    pub fn with_frame_range(self, min: u32, max: u32) -> Self {
        self.lock().frame_range = (min.min(max), max.max(min));
        self
    }

    pub fn with_grantable_options(self, options: CategoryOptions) -> Self {
        self.lock().grantable = options;
        self
    }

    /// Grant `granted` whenever `requested` is asked for
    pub fn with_category_substitution(self, requested: Category, granted: Category) -> Self {
        self.lock().substitutions.insert(requested, granted);
        self
    }

    /// Bus on which this session publishes its notifications
    pub fn event_bus(&self) -> EventBus {
        self.events.clone()
    }

    pub fn reject(&self, operation: Operation) {
        self.lock().rejected.insert(operation);
    }

    pub fn accept(&self, operation: Operation) {
        self.lock().rejected.remove(&operation);
    }

    pub fn set_route(&self, input: u32, output: u32, input_available: bool) {
        let mut state = self.lock();
        state.input_channels = input;
        state.output_channels = output;
        state.input_available = input_available;
    }

    pub fn is_active(&self) -> bool {
        self.lock().active
    }

    pub fn calls(&self) -> Vec<SessionCall> {
        self.lock().calls.clone()
    }

    pub fn clear_calls(&self) {
        self.lock().calls.clear();
    }

    /// Publish the start of an interruption
    pub fn interrupt(&self) -> bool {
        self.lock().active = false;
        self.events.publish(SessionEvent::InterruptionBegan)
    }

    pub fn end_interruption(&self, should_resume: bool) -> bool {
        self.events
            .publish(SessionEvent::InterruptionEnded { should_resume })
    }

    /// Switch to a new route and publish the change
    pub fn change_route(
        &self,
        input: u32,
        output: u32,
        input_available: bool,
        reason: RouteChangeReason,
    ) -> bool {
        self.set_route(input, output, input_available);
        self.events.publish(SessionEvent::RouteChanged { reason })
    }

    /// Drop category, options and activation, then publish the reset
    pub fn reset_media_services(&self) -> bool {
        {
            let mut state = self.lock();
            state.category = None;
            state.options = CategoryOptions::empty();
            state.active = false;
        }
        self.events.publish(SessionEvent::MediaServicesReset)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, SessionState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn request(&self, call: SessionCall) -> Result<std::sync::MutexGuard<'_, SessionState>> {
        let operation = call.operation();
        let mut state = self.lock();
        debug!(?call, "Simulated session call");
        state.calls.push(call);
        if state.rejected.contains(&operation) {
            return Err(SessionError::rejected(
                operation.as_str(),
                "rejected by simulated session",
            ));
        }
        Ok(state)
    }
}

fn nearest_rate(supported: &[f64], requested: f64) -> f64 {
    supported
        .iter()
        .copied()
        .min_by(|a, b| {
            (a - requested)
                .abs()
                .partial_cmp(&(b - requested).abs())
                .unwrap_or(std::cmp::Ordering::Equal)
        })
        .unwrap_or(requested)
}

impl HardwareSession for SimulatedSession {
    fn set_category(&self, category: &Category) -> Result<()> {
        let mut state = self.request(SessionCall::SetCategory(category.clone()))?;
        let granted = state
            .substitutions
            .get(category)
            .cloned()
            .unwrap_or_else(|| category.clone());
        state.category = Some(granted);
        state.options = CategoryOptions::empty();
        Ok(())
    }

    fn set_category_with_options(&self, category: &Category, options: CategoryOptions) -> Result<()> {
        let mut state = self.request(SessionCall::SetCategoryWithOptions(category.clone(), options))?;
        let granted = state
            .substitutions
            .get(category)
            .cloned()
            .unwrap_or_else(|| category.clone());
        state.category = Some(granted);
        state.options = options & state.grantable;
        Ok(())
    }

    fn category(&self) -> Option<Category> {
        self.lock().category.clone()
    }

    fn category_options(&self) -> CategoryOptions {
        self.lock().options
    }

    fn set_preferred_sample_rate(&self, hz: f64) -> Result<()> {
        let mut state = self.request(SessionCall::SetPreferredSampleRate(hz))?;
        state.preferred_rate = hz;
        state.rate = nearest_rate(&state.supported_rates, hz);
        Ok(())
    }

    fn preferred_sample_rate(&self) -> f64 {
        self.lock().preferred_rate
    }

    fn sample_rate(&self) -> f64 {
        self.lock().rate
    }

    fn set_preferred_io_buffer_duration(&self, duration: Duration) -> Result<()> {
        let mut state = self.request(SessionCall::SetPreferredIoBufferDuration(duration))?;
        let (min, max) = state.frame_range;
        let frames = (duration.as_secs_f64() * state.rate).floor() as u32;
        state.io_frames = frames.clamp(min, max);
        Ok(())
    }

    fn io_buffer_duration(&self) -> Duration {
        let state = self.lock();
        Duration::from_secs_f64(f64::from(state.io_frames) / state.rate)
    }

    fn set_active(&self, active: bool) -> Result<()> {
        let mut state = self.request(SessionCall::SetActive(active))?;
        state.active = active;
        Ok(())
    }

    fn input_available(&self) -> bool {
        self.lock().input_available
    }

    fn input_channels(&self) -> u32 {
        self.lock().input_channels
    }

    fn output_channels(&self) -> u32 {
        self.lock().output_channels
    }
}

/// Processing unit that records what it is told
#[derive(Default)]
pub struct SimulatedUnit {
    active: AtomicBool,
    fail: AtomicBool,
    pushes_while_active: AtomicUsize,
    configurations: Mutex<Vec<UnitConfiguration>>,
    activations: Mutex<Vec<bool>>,
}

impl SimulatedUnit {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make subsequent `configure` calls fail
    pub fn fail_configure(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub fn configurations(&self) -> Vec<UnitConfiguration> {
        self.configurations
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn last_configuration(&self) -> Option<UnitConfiguration> {
        self.configurations
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .last()
            .copied()
    }

    /// Every activation toggle, in order
    pub fn activations(&self) -> Vec<bool> {
        self.activations
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Configuration pushes that arrived while the unit was running
    pub fn pushes_while_active(&self) -> usize {
        self.pushes_while_active.load(Ordering::SeqCst)
    }
}

impl ProcessingUnit for SimulatedUnit {
    fn configure(&self, config: &UnitConfiguration) -> Result<()> {
        if self.active.load(Ordering::SeqCst) {
            self.pushes_while_active.fetch_add(1, Ordering::SeqCst);
        }
        if self.fail.load(Ordering::SeqCst) {
            return Err(SessionError::UnitConfiguration(
                "simulated unit failure".to_string(),
            ));
        }
        debug!(?config, "Simulated unit configured");
        self.configurations
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(*config);
        Ok(())
    }

    fn set_active(&self, active: bool) {
        self.active.store(active, Ordering::SeqCst);
        self.activations
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(active);
    }

    fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }
}
