//! Daemon configuration.
//!
//! Loaded from a TOML file (see `configs/lull.toml`); every key is
//! optional and defaults to the classic constants: sample once a second,
//! a 30-sample window, and an alert after 30 consecutive samples at or
//! below 30% usage.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::stat::ProcStat;

pub const DEFAULT_INTERVAL_SECS: u64 = 1;
pub const DEFAULT_WINDOW: usize = 30;
pub const DEFAULT_LOW_THRESHOLD: f64 = 30.0;
pub const DEFAULT_TRIGGER: u32 = 30;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Seconds between samples fed to the window and alarm.
    pub interval_secs: u64,
    /// Seconds between instant-readout refreshes.
    pub instant_interval_secs: u64,
    /// Number of samples in the rolling average window.
    pub window: usize,
    /// Usage at or below this percentage counts as low.
    pub low_threshold: f64,
    /// Consecutive low samples required before the alert fires.
    pub trigger: u32,
    /// Path of the cumulative cpu counter file.
    pub stat_path: PathBuf,
    pub alert: AlertConfig,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AlertConfig {
    /// Command (program + args) to run when the alert fires; the terminal
    /// bell when unset.
    pub command: Option<Vec<String>>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            interval_secs: DEFAULT_INTERVAL_SECS,
            instant_interval_secs: DEFAULT_INTERVAL_SECS,
            window: DEFAULT_WINDOW,
            low_threshold: DEFAULT_LOW_THRESHOLD,
            trigger: DEFAULT_TRIGGER,
            stat_path: PathBuf::from(ProcStat::PROC_STAT),
            alert: AlertConfig::default(),
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Read(#[from] std::io::Error),
    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid config: {0}")]
    Invalid(&'static str),
}

impl Config {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = fs::read_to_string(path)?;
        let config: Self = toml::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Rejects bounds that would otherwise blow up deep inside a running
    /// session: the window ring and the tokio interval both refuse zero,
    /// and a zero trigger would fire the alarm on every sample.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.window == 0 {
            return Err(ConfigError::Invalid("window must be at least 1"));
        }
        if self.trigger == 0 {
            return Err(ConfigError::Invalid("trigger must be at least 1"));
        }
        if self.interval_secs == 0 {
            return Err(ConfigError::Invalid("interval_secs must be at least 1"));
        }
        if self.instant_interval_secs == 0 {
            return Err(ConfigError::Invalid(
                "instant_interval_secs must be at least 1",
            ));
        }
        Ok(())
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn instant_interval(&self) -> Duration {
        Duration::from_secs(self.instant_interval_secs)
    }
}
