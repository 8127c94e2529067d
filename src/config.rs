//! # Scheduler configuration
//!
//! Timing, policy thresholds and an optional scenario (printers to connect and
//! jobs to submit) loaded from TOML.
//!
//! ## Example: TOML Configuration
//!
//! ```toml
//! [timing]
//! page_interval_ms = 500
//! idle_poll_ms = 200
//!
//! [policy]
//! fcfs_max_queue_len = 3
//! srtf_max_mean_remaining = 20.0
//!
//! [[printers]]
//! name = "Office LaserJet"
//!
//! [[jobs]]
//! name = "quarterly-report.pdf"
//! pages = 12
//! submit_after_ms = 0
//! ```
//!
//! Every section is optional. Missing timing and policy values fall back to
//! their defaults; a missing scenario is empty.

use std::path::Path;

use printflow_shared::PolicyThresholds;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct SchedulerConfig {
    #[serde(default)]
    pub timing: TimingConfig,
    #[serde(default)]
    pub policy: PolicyThresholds,
    #[serde(default)]
    pub printers: Vec<PrinterConfig>,
    #[serde(default)]
    pub jobs: Vec<JobConfig>,
}

impl SchedulerConfig {
    /// Built-in scenario used when no config file is given.
    pub fn demo() -> Self {
        Self {
            printers: vec![
                PrinterConfig { name: "Office LaserJet".to_string() },
                PrinterConfig { name: "Lab Inkjet".to_string() },
            ],
            jobs: vec![
                JobConfig::new("thesis-draft.pdf", 42, 0),
                JobConfig::new("invoice.pdf", 2, 0),
                JobConfig::new("slides.pdf", 18, 250),
                JobConfig::new("poster.pdf", 1, 500),
                JobConfig::new("handbook.pdf", 30, 750),
                JobConfig::new("memo.pdf", 3, 1500),
            ],
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.timing.validate()?;
        let srtf_max_mean = self.policy.srtf_max_mean_remaining;
        if srtf_max_mean.is_nan() || srtf_max_mean < 0.0 {
            return Err(ConfigError::Invalid(
                "policy.srtf_max_mean_remaining must be a non-negative number".to_string(),
            ));
        }
        for printer in &self.printers {
            if printer.name.trim().is_empty() {
                return Err(ConfigError::Invalid("printer name cannot be empty".to_string()));
            }
        }
        for job in &self.jobs {
            if job.name.trim().is_empty() {
                return Err(ConfigError::Invalid("job name cannot be empty".to_string()));
            }
            if job.pages == 0 {
                return Err(ConfigError::Invalid(format!(
                    "job '{}' must have at least one page",
                    job.name
                )));
            }
        }
        Ok(())
    }
}

/// Simulated durations, in milliseconds.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct TimingConfig {
    /// Time to print one page.
    pub page_interval_ms: u64,
    /// How long a paused printer waits between status reports.
    pub pause_poll_ms: u64,
    /// How long an idle printer waits before asking for work again.
    pub idle_poll_ms: u64,
    /// Cadence at which the front end drains the update stream.
    pub drain_interval_ms: u64,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            page_interval_ms: 500,
            pause_poll_ms: 500,
            idle_poll_ms: 200,
            drain_interval_ms: 100,
        }
    }
}

impl TimingConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        let fields = [
            ("page_interval_ms", self.page_interval_ms),
            ("pause_poll_ms", self.pause_poll_ms),
            ("idle_poll_ms", self.idle_poll_ms),
            ("drain_interval_ms", self.drain_interval_ms),
        ];
        for (name, value) in fields {
            if value == 0 {
                return Err(ConfigError::Invalid(format!(
                    "timing.{} must be greater than zero",
                    name
                )));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct PrinterConfig {
    pub name: String,
}

/// A job submitted by the scenario runner.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct JobConfig {
    pub name: String,
    pub pages: u32,
    /// Delay after scenario start before the job is submitted.
    #[serde(default)]
    pub submit_after_ms: u64,
}

impl JobConfig {
    pub fn new(name: impl Into<String>, pages: u32, submit_after_ms: u64) -> Self {
        Self {
            name: name.into(),
            pages,
            submit_after_ms,
        }
    }
}

pub fn load_config(path: impl AsRef<Path>) -> Result<SchedulerConfig, ConfigError> {
    let path = path.as_ref();
    let contents = std::fs::read_to_string(path).map_err(|e| {
        tracing::error!("Failed to read config file '{}': {}", path.display(), e);
        ConfigError::Io(e)
    })?;
    let config = parse_config(&contents)?;
    tracing::debug!("Loaded config from '{}'", path.display());
    Ok(config)
}

pub fn parse_config(contents: &str) -> Result<SchedulerConfig, ConfigError> {
    let config: SchedulerConfig = toml::from_str(contents).map_err(|e| {
        tracing::error!("Failed to parse config TOML: {}", e);
        ConfigError::Toml(e)
    })?;
    config.validate()?;
    Ok(config)
}
