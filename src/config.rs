// src/config.rs

use serde::Deserialize;
use std::fs;
use std::path::Path;

#[derive(Debug, Deserialize, Clone)]
pub struct PipelineConfig {
    /// Bounded queue capacity per output stream
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
    /// Emit a progress line every N processed entries
    #[serde(default = "default_report_interval")]
    pub report_interval: u64,
    /// Entry-count estimate the ETA is extrapolated from
    #[serde(default = "default_expected_total")]
    pub expected_total: u64,
}

fn default_queue_capacity() -> usize { 100 }
fn default_report_interval() -> u64 { 50_000 }
fn default_expected_total() -> u64 { 250_000_000 }

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            queue_capacity: default_queue_capacity(),
            report_interval: default_report_interval(),
            expected_total: default_expected_total(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_level() -> String { "info".to_string() }

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

#[derive(Debug, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub pipeline: PipelineConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let contents = fs::read_to_string(path)?;
        let cfg: Config = toml::from_str(&contents)?;
        Ok(cfg)
    }
}
