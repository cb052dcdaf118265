//! Autoflow configuration system.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{AutoflowError, Result};

/// Root configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AutoflowConfig {
    /// Path to the SQLite database file.
    #[serde(default = "default_db_path")]
    pub db_path: String,
    #[serde(default)]
    pub queue: QueueConfig,
    #[serde(default)]
    pub jobs: JobsConfig,
    #[serde(default)]
    pub channels: ChannelsConfig,
}

fn default_db_path() -> String {
    AutoflowConfig::home_dir()
        .join("autoflow.db")
        .to_string_lossy()
        .into_owned()
}

impl Default for AutoflowConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            queue: QueueConfig::default(),
            jobs: JobsConfig::default(),
            channels: ChannelsConfig::default(),
        }
    }
}

impl AutoflowConfig {
    /// Load config from the default path (~/.autoflow/config.toml).
    pub fn load() -> Result<Self> {
        let path = Self::default_path();
        if path.exists() {
            Self::load_from(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load config from a specific path.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| AutoflowError::Config(format!("Failed to read config: {e}")))?;
        let config: Self = toml::from_str(&content)
            .map_err(|e| AutoflowError::Config(format!("Failed to parse config: {e}")))?;
        Ok(config)
    }

    /// Save config to the default path.
    pub fn save(&self) -> Result<()> {
        let path = Self::default_path();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)
            .map_err(|e| AutoflowError::Config(format!("Failed to serialize config: {e}")))?;
        std::fs::write(&path, content)?;
        Ok(())
    }

    /// Get the default config path.
    pub fn default_path() -> PathBuf {
        Self::home_dir().join("config.toml")
    }

    /// Get the Autoflow home directory (~/.autoflow).
    pub fn home_dir() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".autoflow")
    }
}

/// Delay queue configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueConfig {
    /// Poll loop interval in seconds. The poll loop is the source of truth
    /// for due executions; in-process timers only shave latency.
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,
    /// Maximum due rows picked up per poll tick.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Delays at or above this many minutes skip the in-process timer and
    /// rely on the poll loop alone.
    #[serde(default = "default_timer_cutoff")]
    pub timer_cutoff_minutes: u32,
}

fn default_poll_interval() -> u64 { 30 }
fn default_batch_size() -> usize { 25 }
fn default_timer_cutoff() -> u32 { 60 }

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: default_poll_interval(),
            batch_size: default_batch_size(),
            timer_cutoff_minutes: default_timer_cutoff(),
        }
    }
}

/// Job orchestrator configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobsConfig {
    /// Retry budget applied when a job is created without an explicit one.
    #[serde(default = "default_max_retries")]
    pub default_max_retries: u32,
    /// How many log entries status displays read back (most recent first).
    #[serde(default = "default_log_tail")]
    pub log_tail_limit: usize,
}

fn default_max_retries() -> u32 { 3 }
fn default_log_tail() -> usize { 50 }

impl Default for JobsConfig {
    fn default() -> Self {
        Self {
            default_max_retries: default_max_retries(),
            log_tail_limit: default_log_tail(),
        }
    }
}

/// Channel selector configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelsConfig {
    /// Cooldown between attempts when trying channels in sequence.
    #[serde(default = "default_cooldown")]
    pub sequence_cooldown_secs: u64,
    /// Fallback channel tag when a contact has no usable candidates.
    #[serde(default = "default_fallback")]
    pub fallback_channel: String,
}

fn default_cooldown() -> u64 { 300 }
fn default_fallback() -> String { "email".into() }

impl Default for ChannelsConfig {
    fn default() -> Self {
        Self {
            sequence_cooldown_secs: default_cooldown(),
            fallback_channel: default_fallback(),
        }
    }
}
