//! Adapters for the Cadenza control plane
//!
//! - [`audio`]: hardware-session and processing-unit implementations, both
//!   simulated and backed by the host audio system through CPAL
//! - [`control`]: the control loop that serializes commands and session
//!   events onto a single thread

pub mod audio;
pub mod control;

pub use audio::{CpalSession, CpalUnit, SimulatedSession, SimulatedUnit};
pub use control::{ControlHandle, ControlLoop};
