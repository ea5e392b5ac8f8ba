//! Cadenza CLI Application

mod commands;

use anyhow::Context;
use cadenza_core::domain::channels::ChannelSpec;
use cadenza_core::domain::config::ConfigManager;
use cadenza_core::domain::policy::OperatingMode;
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "cadenza")]
#[command(about = "Negotiates and reconciles a shared audio session", long_about = None)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Configuration file (defaults to the per-user controller.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Hardware session implementation
    #[arg(short, long, global = true, value_enum, default_value_t = Backend::Sim)]
    backend: Backend,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Backend {
    /// In-memory simulated session
    Sim,
    /// Host default devices through CPAL
    Cpal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ModeArg {
    Playback,
    Record,
    Ambient,
    SoloAmbient,
    PlayAndRecord,
    MultiRoute,
}

impl From<ModeArg> for OperatingMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::Playback => OperatingMode::Playback,
            ModeArg::Record => OperatingMode::Record,
            ModeArg::Ambient => OperatingMode::Ambient,
            ModeArg::SoloAmbient => OperatingMode::SoloAmbient,
            ModeArg::PlayAndRecord => OperatingMode::PlayAndRecord,
            ModeArg::MultiRoute => OperatingMode::MultiRoute,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Print the hardware session as JSON
    Probe,

    /// Configure a mode and print the resulting controller report
    Configure {
        #[arg(value_enum)]
        mode: ModeArg,

        /// Preferred sample rate in Hz
        #[arg(long)]
        sample_rate: Option<f64>,

        /// Input channels: "auto" or a count
        #[arg(long)]
        input: Option<ChannelSpec>,

        /// Output channels: "auto" or a count
        #[arg(long)]
        output: Option<ChannelSpec>,

        /// Leave input unwired even if the mode supports it
        #[arg(long)]
        no_input: bool,

        /// Processing blocks per IO buffer
        #[arg(long)]
        ticks: Option<u32>,

        /// Activate the processing unit after configuring
        #[arg(long)]
        activate: bool,
    },

    /// Run a scripted interruption, route change and service reset
    Simulate {
        #[arg(value_enum, default_value_t = ModeArg::PlayAndRecord)]
        mode: ModeArg,
    },

    /// Apply the configuration file and hot-reload feature flags on change
    Watch,
}

fn init_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let manager = match cli.config {
        Some(path) => ConfigManager::for_file(path),
        None => ConfigManager::new(
            ConfigManager::default_config_dir().context("locating configuration directory")?,
        ),
    };
    let config = manager.load().await;

    match cli.command {
        Commands::Probe => commands::probe(cli.backend, &config),
        Commands::Configure {
            mode,
            sample_rate,
            input,
            output,
            no_input,
            ticks,
            activate,
        } => {
            let mut request = config.mode_request();
            if let Some(rate) = sample_rate {
                request.sample_rate = rate;
            }
            if let Some(input) = input {
                request.channels.input = input;
            }
            if let Some(output) = output {
                request.channels.output = output;
            }
            if no_input {
                request.input_enabled = false;
            }
            let options = commands::ConfigureOptions {
                mode: mode.into(),
                request,
                ticks: ticks.or(Some(config.ticks_per_buffer)),
                activate,
            };
            commands::configure(cli.backend, &config, options)
        }
        Commands::Simulate { mode } => commands::simulate(mode.into(), &config).await,
        Commands::Watch => commands::watch(cli.backend, &manager, config).await,
    }
}
