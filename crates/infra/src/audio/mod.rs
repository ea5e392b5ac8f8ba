//! Hardware session and processing unit implementations
//!
//! The simulated pair runs entirely in memory and is what tests and the
//! `simulate` command use. The CPAL pair talks to the host's default devices:
//! - Windows: WASAPI
//! - Linux: ALSA/PulseAudio
//! - macOS: CoreAudio

pub mod cpal_backend;
pub mod simulated;

pub use cpal_backend::{CpalSession, CpalUnit, HostDescription};
pub use simulated::{Operation, SessionCall, SimulatedSession, SimulatedUnit};
