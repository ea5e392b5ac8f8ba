//! In-memory collaborators for unit tests

use crate::domain::audio::{
    Category, CategoryOptions, HardwareSession, ProcessingUnit, Result, SessionError,
    UnitConfiguration,
};
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

/// Route `tracing` output through the test harness; set RUST_LOG to see it
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

#[derive(Debug, Clone, PartialEq)]
pub enum SessionCall {
    SetCategory(Category),
    SetCategoryWithOptions(Category, CategoryOptions),
    SetPreferredSampleRate(f64),
    SetPreferredIoBufferDuration(Duration),
    SetActive(bool),
}

struct FakeState {
    category: Option<Category>,
    options: CategoryOptions,
    grantable: CategoryOptions,
    preferred_rate: f64,
    rate: f64,
    granted_rate: Option<f64>,
    io_frames: u32,
    active: bool,
    input_available: bool,
    input_channels: u32,
    output_channels: u32,
    rejected: HashSet<&'static str>,
    calls: Vec<SessionCall>,
}

pub struct FakeSession {
    state: Mutex<FakeState>,
}

impl Default for FakeSession {
    fn default() -> Self {
        Self {
            state: Mutex::new(FakeState {
                category: None,
                options: CategoryOptions::empty(),
                grantable: CategoryOptions::all(),
                preferred_rate: 0.0,
                rate: 48000.0,
                granted_rate: None,
                io_frames: 1024,
                active: false,
                input_available: true,
                input_channels: 1,
                output_channels: 2,
                rejected: HashSet::new(),
                calls: Vec::new(),
            }),
        }
    }
}

impl FakeSession {
    pub fn reject(&self, operation: &'static str) {
        self.state.lock().unwrap().rejected.insert(operation);
    }

    pub fn accept(&self, operation: &'static str) {
        self.state.lock().unwrap().rejected.remove(operation);
    }

    pub fn set_grantable(&self, options: CategoryOptions) {
        self.state.lock().unwrap().grantable = options;
    }

    pub fn set_granted_rate(&self, rate: Option<f64>) {
        self.state.lock().unwrap().granted_rate = rate;
    }

    pub fn set_route(&self, input: u32, output: u32, input_available: bool) {
        let mut state = self.state.lock().unwrap();
        state.input_channels = input;
        state.output_channels = output;
        state.input_available = input_available;
    }

    /// Drop category, options and activation as a crashed media service would
    pub fn reset_service(&self) {
        let mut state = self.state.lock().unwrap();
        state.category = None;
        state.options = CategoryOptions::empty();
        state.active = false;
    }

    pub fn is_active(&self) -> bool {
        self.state.lock().unwrap().active
    }

    pub fn calls(&self) -> Vec<SessionCall> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn clear_calls(&self) {
        self.state.lock().unwrap().calls.clear();
    }

    fn request(&self, operation: &'static str, call: SessionCall) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(call);
        if state.rejected.contains(operation) {
            return Err(SessionError::rejected(operation, "rejected by test"));
        }
        Ok(())
    }
}

impl HardwareSession for FakeSession {
    fn set_category(&self, category: &Category) -> Result<()> {
        self.request("set_category", SessionCall::SetCategory(category.clone()))?;
        let mut state = self.state.lock().unwrap();
        state.category = Some(category.clone());
        state.options = CategoryOptions::empty();
        Ok(())
    }

    fn set_category_with_options(
        &self,
        category: &Category,
        options: CategoryOptions,
    ) -> Result<()> {
        self.request(
            "set_category_with_options",
            SessionCall::SetCategoryWithOptions(category.clone(), options),
        )?;
        let mut state = self.state.lock().unwrap();
        state.category = Some(category.clone());
        state.options = options & state.grantable;
        Ok(())
    }

    fn category(&self) -> Option<Category> {
        self.state.lock().unwrap().category.clone()
    }

    fn category_options(&self) -> CategoryOptions {
        self.state.lock().unwrap().options
    }

    fn set_preferred_sample_rate(&self, hz: f64) -> Result<()> {
        self.request(
            "set_preferred_sample_rate",
            SessionCall::SetPreferredSampleRate(hz),
        )?;
        let mut state = self.state.lock().unwrap();
        state.preferred_rate = hz;
        state.rate = state.granted_rate.unwrap_or(hz);
        Ok(())
    }

    fn preferred_sample_rate(&self) -> f64 {
        self.state.lock().unwrap().preferred_rate
    }

    fn sample_rate(&self) -> f64 {
        self.state.lock().unwrap().rate
    }

    fn set_preferred_io_buffer_duration(&self, duration: Duration) -> Result<()> {
        self.request(
            "set_preferred_io_buffer_duration",
            SessionCall::SetPreferredIoBufferDuration(duration),
        )?;
        let mut state = self.state.lock().unwrap();
        state.io_frames = (duration.as_secs_f64() * state.rate).floor() as u32;
        Ok(())
    }

    fn io_buffer_duration(&self) -> Duration {
        let state = self.state.lock().unwrap();
        Duration::from_secs_f64(f64::from(state.io_frames) / state.rate)
    }

    fn set_active(&self, active: bool) -> Result<()> {
        self.request("set_active", SessionCall::SetActive(active))?;
        self.state.lock().unwrap().active = active;
        Ok(())
    }

    fn input_available(&self) -> bool {
        self.state.lock().unwrap().input_available
    }

    fn input_channels(&self) -> u32 {
        self.state.lock().unwrap().input_channels
    }

    fn output_channels(&self) -> u32 {
        self.state.lock().unwrap().output_channels
    }
}

#[derive(Default)]
pub struct FakeUnit {
    active: AtomicBool,
    fail: AtomicBool,
    pushes_while_active: AtomicUsize,
    configurations: Mutex<Vec<UnitConfiguration>>,
    activations: Mutex<Vec<bool>>,
}

impl FakeUnit {
    pub fn fail_configure(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub fn configurations(&self) -> Vec<UnitConfiguration> {
        self.configurations.lock().unwrap().clone()
    }

    pub fn last_configuration(&self) -> Option<UnitConfiguration> {
        self.configurations.lock().unwrap().last().copied()
    }

    pub fn activations(&self) -> Vec<bool> {
        self.activations.lock().unwrap().clone()
    }

    pub fn pushes_while_active(&self) -> usize {
        self.pushes_while_active.load(Ordering::SeqCst)
    }
}

impl ProcessingUnit for FakeUnit {
    fn configure(&self, config: &UnitConfiguration) -> Result<()> {
        if self.active.load(Ordering::SeqCst) {
            self.pushes_while_active.fetch_add(1, Ordering::SeqCst);
        }
        if self.fail.load(Ordering::SeqCst) {
            return Err(SessionError::UnitConfiguration("failed by test".to_string()));
        }
        self.configurations.lock().unwrap().push(*config);
        Ok(())
    }

    fn set_active(&self, active: bool) {
        self.active.store(active, Ordering::SeqCst);
        self.activations.lock().unwrap().push(active);
    }

    fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }
}
