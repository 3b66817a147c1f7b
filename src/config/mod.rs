use crate::global;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::info;

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub audio: AudioConfig,
    pub storage: StorageConfig,
    pub transport: TransportConfig,
    pub api: ApiConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    /// Capture sample rate in Hz.
    pub sample_rate: u32,
    /// Capture channel count.
    pub channels: u16,
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Where recordings land. Defaults to the data dir when unset.
    pub recordings_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    /// Progress notification cadence in milliseconds.
    pub progress_tick_ms: u64,
    /// Ceiling in seconds on how long stop waits for audio i/o to flush.
    pub stop_timeout_seconds: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub port: u16,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            sample_rate: 44_100,
            channels: 1,
        }
    }
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            progress_tick_ms: 30,
            stop_timeout_seconds: 2,
        }
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        // TAPE on a phone keypad
        Self { port: 8273 }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path()?;
        if !config_path.exists() {
            info!(
                "Config file not found, creating default at {:?}",
                config_path
            );
            let config = Self::default();
            config.save()?;
            return Ok(config);
        }

        let content =
            std::fs::read_to_string(&config_path).context("Failed to read config file")?;

        let config: Self = toml::from_str(&content).context("Failed to parse config file")?;

        info!("Loaded config from {:?}", config_path);
        Ok(config)
    }

    pub fn save(&self) -> Result<()> {
        let config_path = Self::config_path()?;

        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent).context("Failed to create config directory")?;
        }

        let content = toml::to_string_pretty(self).context("Failed to serialize config")?;

        std::fs::write(&config_path, content).context("Failed to write config file")?;

        Ok(())
    }

    /// Resolved recordings directory, honoring the config override.
    pub fn recordings_dir(&self) -> Result<PathBuf> {
        match &self.storage.recordings_dir {
            Some(dir) => Ok(dir.clone()),
            None => global::recordings_dir(),
        }
    }

    fn config_path() -> Result<PathBuf> {
        global::config_file()
    }
}
