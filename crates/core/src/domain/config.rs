//! Configuration management for Cadenza
//!
//! This module provides:
//! - The controller configuration document with TOML serialization
//! - A manager for the per-user configuration file
//! - Hot-reload support via file system watcher

use crate::domain::channels::ChannelRequest;
use crate::domain::controller::{ControllerSettings, ModeRequest};
use crate::domain::events::ResumePolicy;
use crate::domain::policy::{FeatureFlags, OperatingMode};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::fs;
use tokio::sync::broadcast;
use tracing::{debug, error, info, instrument};

pub type Result<T> = std::result::Result<T, ConfigError>;

/// Errors that can occur during configuration operations
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialization error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    #[error("File watch error: {0}")]
    WatchError(#[from] notify::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Persisted controller configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ControllerConfig {
    /// Mode to configure on startup; `None` leaves the controller unconfigured
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mode: Option<OperatingMode>,

    /// Preferred sample rate in Hz
    pub sample_rate: f64,

    /// Processing blocks per hardware IO buffer
    pub ticks_per_buffer: u32,

    /// Frames per processing block
    pub block_size: u32,

    pub input_enabled: bool,

    pub resume_policy: ResumePolicy,

    pub channels: ChannelRequest,

    pub flags: FeatureFlags,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            mode: None,
            sample_rate: 44100.0,
            ticks_per_buffer: 1,
            block_size: crate::domain::negotiator::DEFAULT_BLOCK_SIZE,
            input_enabled: true,
            resume_policy: ResumePolicy::default(),
            channels: ChannelRequest::auto(),
            flags: FeatureFlags::default(),
        }
    }
}

impl ControllerConfig {
    /// Load configuration from TOML file
    #[instrument(skip(path))]
    pub async fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        info!(path = %path.display(), "Loading configuration");

        let contents = fs::read_to_string(path).await?;
        let config: Self = toml::from_str(&contents)?;
        config.validate()?;

        debug!("Configuration loaded successfully");
        Ok(config)
    }

    /// Save configuration to TOML file
    #[instrument(skip(self, path))]
    pub async fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        info!(path = %path.display(), "Saving configuration");

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }

        let toml_str = toml::to_string_pretty(self)?;
        fs::write(path, toml_str).await?;

        debug!("Configuration saved successfully");
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if !self.sample_rate.is_finite() || self.sample_rate <= 0.0 {
            return Err(ConfigError::Invalid(format!(
                "sample_rate must be positive, got {}",
                self.sample_rate
            )));
        }
        if self.block_size == 0 {
            return Err(ConfigError::Invalid("block_size must be at least 1".to_string()));
        }
        if self.ticks_per_buffer == 0 {
            return Err(ConfigError::Invalid(
                "ticks_per_buffer must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    pub fn settings(&self) -> ControllerSettings {
        ControllerSettings {
            flags: self.flags,
            block_size: self.block_size,
            resume_policy: self.resume_policy,
        }
    }

    pub fn mode_request(&self) -> ModeRequest {
        ModeRequest::new(self.sample_rate, self.channels).with_input_enabled(self.input_enabled)
    }
}

/// File system watcher for hot-reload
pub struct ConfigWatcher {
    _watcher: notify::RecommendedWatcher,
    config_tx: broadcast::Sender<PathBuf>,
}

impl ConfigWatcher {
    /// Watch `config_dir` for created or modified `.toml` files
    pub async fn new(config_dir: PathBuf) -> Result<Self> {
        use notify::Watcher;

        let (config_tx, _config_rx) = broadcast::channel(32);

        fs::create_dir_all(&config_dir).await?;

        let tx_clone = config_tx.clone();
        let mut watcher = notify::recommended_watcher(move |res: notify::Result<notify::Event>| {
            if let Ok(event) = res {
                if matches!(
                    event.kind,
                    notify::EventKind::Create(_) | notify::EventKind::Modify(_)
                ) {
                    for path in event.paths {
                        if path.extension().and_then(|e| e.to_str()) == Some("toml") {
                            if let Err(e) = tx_clone.send(path) {
                                debug!("No listener for config change: {}", e);
                            }
                        }
                    }
                }
            }
        })?;

        watcher.watch(&config_dir, notify::RecursiveMode::NonRecursive)?;

        info!(path = %config_dir.display(), "Config watcher started");

        Ok(Self {
            _watcher: watcher,
            config_tx,
        })
    }

    /// Subscribe to config change events
    pub fn subscribe(&self) -> broadcast::Receiver<PathBuf> {
        self.config_tx.subscribe()
    }
}

/// Manages the per-user `controller.toml`
pub struct ConfigManager {
    config_dir: PathBuf,
    config_path: PathBuf,
}

impl ConfigManager {
    pub const FILE_NAME: &'static str = "controller.toml";

    pub fn new(config_dir: PathBuf) -> Self {
        let config_path = config_dir.join(Self::FILE_NAME);
        Self {
            config_dir,
            config_path,
        }
    }

    /// Manager for the file at `path`, whatever its name
    pub fn for_file(path: PathBuf) -> Self {
        let config_dir = path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        Self {
            config_dir,
            config_path: path,
        }
    }

    /// `~/.config/cadenza` on Linux, the platform equivalent elsewhere
    pub fn default_config_dir() -> Result<PathBuf> {
        dirs::config_dir()
            .map(|p| p.join("cadenza"))
            .ok_or_else(|| ConfigError::Invalid("Could not determine config directory".to_string()))
    }

    pub fn config_dir(&self) -> &Path {
        &self.config_dir
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    /// Load configuration from file
    ///
    /// A missing file is created with defaults. A corrupt or invalid file is
    /// copied aside to `controller.toml.corrupt` and defaults are returned.
    #[instrument(skip(self))]
    pub async fn load(&self) -> ControllerConfig {
        if !self.config_path.exists() {
            info!(
                path = %self.config_path.display(),
                "Config file not found, writing defaults"
            );

            let config = ControllerConfig::default();
            if let Err(e) = config.save_to_file(&self.config_path).await {
                error!(
                    path = %self.config_path.display(),
                    error = %e,
                    "Failed to save default config"
                );
            }
            return config;
        }

        match ControllerConfig::load_from_file(&self.config_path).await {
            Ok(config) => config,
            Err(e) => {
                error!(
                    path = %self.config_path.display(),
                    error = %e,
                    "Failed to load config, using defaults"
                );

                let backup_path = self.config_path.with_extension("toml.corrupt");
                if let Err(copy_err) = fs::copy(&self.config_path, &backup_path).await {
                    error!(
                        path = %backup_path.display(),
                        error = %copy_err,
                        "Failed to backup corrupt config"
                    );
                }

                ControllerConfig::default()
            }
        }
    }

    #[instrument(skip(self, config))]
    pub async fn save(&self, config: &ControllerConfig) -> Result<()> {
        config.validate()?;
        fs::create_dir_all(&self.config_dir).await?;
        config.save_to_file(&self.config_path).await
    }

    pub fn exists(&self) -> bool {
        self.config_path.exists()
    }
}
