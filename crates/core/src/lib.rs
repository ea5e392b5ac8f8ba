//! Cadenza core: control plane for a shared hardware audio session
//!
//! The domain layer negotiates an audio configuration against an externally
//! owned hardware session and keeps a dependent processing unit consistent
//! with whatever the hardware actually grants. Platform adapters live in the
//! `cadenza-infra` crate.

pub mod domain;
