//! Subcommand implementations

use crate::Backend;
use cadenza_core::domain::audio::{HardwareChannels, HardwareSession, ProcessingUnit};
use cadenza_core::domain::command::{Command, CommandExecutor};
use cadenza_core::domain::config::{ConfigManager, ConfigWatcher, ControllerConfig};
use cadenza_core::domain::controller::{AudioController, ControllerReport, ModeRequest};
use cadenza_core::domain::events::{EventBus, RouteChangeReason};
use cadenza_core::domain::negotiator::ticks_for_duration;
use cadenza_core::domain::policy::OperatingMode;
use cadenza_core::domain::status::ConfigurationStatus;
use cadenza_infra::audio::{CpalSession, CpalUnit, HostDescription, SimulatedSession, SimulatedUnit};
use cadenza_infra::control::{ControlHandle, ControlLoop};
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};

#[derive(Debug, Serialize)]
struct ProbeReport {
    backend: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    host: Option<HostDescription>,
    hardware: HardwareChannels,
    sample_rate: f64,
    io_buffer_ms: f64,
    ticks_per_buffer: u32,
}

impl ProbeReport {
    fn from_session<S: HardwareSession>(
        backend: &'static str,
        host: Option<HostDescription>,
        session: &S,
        block_size: u32,
    ) -> Self {
        let io_buffer = session.io_buffer_duration();
        Self {
            backend,
            host,
            hardware: session.hardware_channels(),
            sample_rate: session.sample_rate(),
            io_buffer_ms: io_buffer.as_secs_f64() * 1000.0,
            ticks_per_buffer: ticks_for_duration(io_buffer, block_size, session.sample_rate()),
        }
    }
}

pub fn probe(backend: Backend, config: &ControllerConfig) -> anyhow::Result<()> {
    let report = match backend {
        Backend::Sim => {
            ProbeReport::from_session("sim", None, &SimulatedSession::new(), config.block_size)
        }
        Backend::Cpal => {
            let session = CpalSession::new();
            ProbeReport::from_session("cpal", Some(session.describe()), &session, config.block_size)
        }
    };
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

pub struct ConfigureOptions {
    pub mode: OperatingMode,
    pub request: ModeRequest,
    pub ticks: Option<u32>,
    pub activate: bool,
}

pub fn configure(
    backend: Backend,
    config: &ControllerConfig,
    options: ConfigureOptions,
) -> anyhow::Result<()> {
    match backend {
        Backend::Sim => {
            let session = SimulatedSession::new();
            let bus = session.event_bus();
            configure_with(
                AudioController::new(session, SimulatedUnit::new(), &bus, config.settings()),
                options,
            )
        }
        Backend::Cpal => configure_with(
            AudioController::new(
                CpalSession::new(),
                CpalUnit::new(),
                &EventBus::new(),
                config.settings(),
            ),
            options,
        ),
    }
}

fn configure_with<S: HardwareSession, U: ProcessingUnit>(
    mut controller: AudioController<S, U>,
    options: ConfigureOptions,
) -> anyhow::Result<()> {
    let mut status = controller.configure(options.mode, options.request);
    if !status.is_error() {
        if let Some(ticks) = options.ticks {
            status |= controller.configure_ticks_per_buffer(ticks);
        }
        if options.activate {
            status |= controller.set_active(true);
        }
    }

    println!("status: {}", status);
    println!("{}", controller.report().to_json_pretty()?);

    if status.is_error() {
        anyhow::bail!("configuring {} failed", options.mode);
    }
    Ok(())
}

async fn report(handle: &ControlHandle) -> anyhow::Result<ControllerReport> {
    handle
        .execute(Command::Report)
        .await?
        .into_report()
        .ok_or_else(|| anyhow::anyhow!("controller did not return a report"))
}

async fn print_step(handle: &ControlHandle, label: &str) -> anyhow::Result<()> {
    let report = report(handle).await?;
    println!(
        "{:<22} {:<40} in={} out={} rate={}",
        label,
        format!("{:?}", report.state),
        report.effective_channels.pushed_input(),
        report.effective_channels.output,
        report.session.sample_rate,
    );
    Ok(())
}

/// Scripted run against the simulated session, printing state after each step
pub async fn simulate(mode: OperatingMode, config: &ControllerConfig) -> anyhow::Result<()> {
    let session = Arc::new(SimulatedSession::new());
    let unit = Arc::new(SimulatedUnit::new());
    let controller = AudioController::new(
        Arc::clone(&session),
        Arc::clone(&unit),
        &session.event_bus(),
        config.settings(),
    );
    let handle = ControlLoop::spawn(controller)?;

    let status = handle
        .execute(Command::Configure {
            mode,
            request: config.mode_request(),
        })
        .await?
        .status();
    println!("configure status: {}", status);
    if status.is_error() {
        anyhow::bail!("configuring {} failed", mode);
    }
    print_step(&handle, "configured").await?;

    handle.execute(Command::SetActive { active: true }).await?;
    print_step(&handle, "activated").await?;

    session.interrupt();
    print_step(&handle, "interruption began").await?;

    session.end_interruption(true);
    print_step(&handle, "interruption ended").await?;

    session.change_route(2, 2, true, RouteChangeReason::NewDeviceAvailable);
    print_step(&handle, "headset connected").await?;

    session.change_route(0, 2, false, RouteChangeReason::OldDeviceUnavailable);
    print_step(&handle, "headset removed").await?;

    session.reset_media_services();
    print_step(&handle, "media services reset").await?;

    let report = report(&handle).await?;
    handle.shutdown();

    println!("{}", report.to_json_pretty()?);
    println!(
        "hardware calls: {}, unit pushes: {}, pushes while active: {}",
        session.calls().len(),
        unit.configurations().len(),
        unit.pushes_while_active(),
    );
    Ok(())
}

pub async fn watch(
    backend: Backend,
    manager: &ConfigManager,
    config: ControllerConfig,
) -> anyhow::Result<()> {
    let handle = match backend {
        Backend::Sim => {
            let session = SimulatedSession::new();
            let bus = session.event_bus();
            ControlLoop::spawn(AudioController::new(
                session,
                SimulatedUnit::new(),
                &bus,
                config.settings(),
            ))?
        }
        Backend::Cpal => ControlLoop::spawn(AudioController::new(
            CpalSession::new(),
            CpalUnit::new(),
            &EventBus::new(),
            config.settings(),
        ))?,
    };

    apply(&handle, &config).await?;

    let watcher = ConfigWatcher::new(manager.config_dir().to_path_buf()).await?;
    let mut changes = watcher.subscribe();
    info!(
        path = %manager.config_path().display(),
        "Watching configuration, press Ctrl-C to stop"
    );

    loop {
        tokio::select! {
            changed = changes.recv() => match changed {
                Ok(path) if path.file_name() == manager.config_path().file_name() => {
                    reload(&handle, &path).await?;
                }
                Ok(_) => {}
                Err(RecvError::Lagged(skipped)) => warn!(skipped, "Missed configuration changes"),
                Err(RecvError::Closed) => break,
            },
            _ = tokio::signal::ctrl_c() => {
                info!("Stopping");
                break;
            }
        }
    }

    handle.shutdown();
    Ok(())
}

async fn apply(handle: &ControlHandle, config: &ControllerConfig) -> anyhow::Result<()> {
    let Some(mode) = config.mode else {
        info!("No mode configured, controller stays unconfigured");
        return Ok(());
    };

    let mut status = handle
        .execute(Command::Configure {
            mode,
            request: config.mode_request(),
        })
        .await?
        .status();
    if !status.is_error() {
        status |= handle
            .execute(Command::SetTicksPerBuffer {
                ticks: config.ticks_per_buffer,
            })
            .await?
            .status();
        status |= handle
            .execute(Command::SetActive { active: true })
            .await?
            .status();
    }
    info!(%mode, %status, "Configuration applied");
    Ok(())
}

async fn reload(handle: &ControlHandle, path: &Path) -> anyhow::Result<()> {
    match ControllerConfig::load_from_file(path).await {
        Ok(config) => {
            let status = handle
                .execute(Command::SetFeatureFlags {
                    flags: config.flags,
                })
                .await?
                .status();
            if status == ConfigurationStatus::Error {
                warn!("Reloaded feature flags were rejected");
            } else {
                info!(%status, "Feature flags reloaded");
            }
        }
        Err(e) => warn!(error = %e, "Ignoring invalid configuration"),
    }
    Ok(())
}
