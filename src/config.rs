// =============================================================================
// Config — fatal-at-startup configuration loader
// =============================================================================
//
// Every optional field carries `#[serde(default = "...")]` so an older
// config file never fails to load, `Config::load` reads a JSON file with
// `anyhow::Context`, and there is deliberately no `Config::save` — admission
// thresholds are fixed for the life of a run, never hot-reloaded.
// Environment-variable overrides (`SO_*`) are applied after file load.
// =============================================================================

use std::path::Path;

use anyhow::{Context, Result};
use chrono::NaiveTime;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

use crate::clock::Window;
use crate::gates::GateThresholds;
use crate::snapshot::Snapshot;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("instrument.symbol is required")]
    MissingSymbol,
    #[error("instrument.contract_key {0:?} does not match ^[A-Z]+\\.\\d{{6}}$")]
    InvalidContractKey(String),
    #[error("instrument.tick_size must be > 0, got {0}")]
    InvalidTickSize(f64),
    #[error("operating window {0:?}-{1:?} could not be parsed as HH:MM")]
    InvalidWindow(String, String),
}

fn default_cycle_target_ms() -> u64 {
    100
}
fn default_cycle_overrun_threshold_ms() -> u64 {
    500
}
fn default_stale_threshold_ms() -> f64 {
    2000.0
}
fn default_feed_heartbeat_timeout_ms() -> u64 {
    5000
}
fn default_max_spread_ticks() -> u64 {
    8
}
fn default_operating_window_start() -> String {
    "07:00".to_string()
}
fn default_operating_window_end() -> String {
    "16:00".to_string()
}
fn default_trigger_logger_cadence_hz() -> f64 {
    1.0
}
fn default_trigger_logger_dir() -> String {
    "./trigger_logs".to_string()
}
fn default_flush_interval_records() -> u64 {
    10
}
fn default_true() -> bool {
    true
}
fn default_inbound_capacity() -> usize {
    crate::queues::DEFAULT_INBOUND_CAPACITY
}
fn default_command_capacity() -> usize {
    crate::queues::DEFAULT_COMMAND_CAPACITY
}

/// Instrument identity, required at startup.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstrumentConfig {
    pub symbol: String,
    pub contract_key: String,
    pub con_id: Option<u64>,
    pub tick_size: f64,
}

/// Trigger logger configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TriggerLoggerConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_trigger_logger_cadence_hz")]
    pub cadence_hz: f64,
    #[serde(default = "default_trigger_logger_dir")]
    pub directory: String,
    #[serde(default = "default_flush_interval_records")]
    pub flush_interval_records: u64,
}

impl Default for TriggerLoggerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            cadence_hz: default_trigger_logger_cadence_hz(),
            directory: default_trigger_logger_dir(),
            flush_interval_records: default_flush_interval_records(),
        }
    }
}

/// Top-level configuration for the Silent Observer kernel. Injected at
/// process start and immutable for the life of the run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub instrument: InstrumentConfig,

    #[serde(default = "default_cycle_target_ms")]
    pub cycle_target_ms: u64,
    #[serde(default = "default_cycle_overrun_threshold_ms")]
    pub cycle_overrun_threshold_ms: u64,
    #[serde(default = "default_stale_threshold_ms")]
    pub stale_threshold_ms: f64,
    #[serde(default = "default_feed_heartbeat_timeout_ms")]
    pub feed_heartbeat_timeout_ms: u64,
    #[serde(default = "default_max_spread_ticks")]
    pub max_spread_ticks: u64,

    #[serde(default = "default_operating_window_start")]
    pub operating_window_start: String,
    #[serde(default = "default_operating_window_end")]
    pub operating_window_end: String,

    #[serde(default)]
    pub trigger_logger: TriggerLoggerConfig,

    /// Optional bounded-duration run, in seconds.
    #[serde(default)]
    pub max_runtime_s: Option<u64>,

    #[serde(default = "default_inbound_capacity")]
    pub inbound_queue_capacity: usize,
    #[serde(default = "default_command_capacity")]
    pub command_queue_capacity: usize,
}

impl Config {
    /// Load configuration from a JSON file at `path`, failing fatally on
    /// any I/O, parse, or validation error.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config from {}", path.display()))?;
        let config: Self = serde_json::from_str(&content)
            .with_context(|| format!("failed to parse config from {}", path.display()))?;
        config.validate().context("config failed validation")?;
        info!(
            symbol = %config.instrument.symbol,
            contract_key = %config.instrument.contract_key,
            "config loaded"
        );
        Ok(config)
    }

    /// Apply environment-variable overrides after file load, mirroring
    /// `main.rs`'s `AURORA_SYMBOLS`/`AURORA_BIND_ADDR` pattern.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(sym) = std::env::var("SO_SYMBOL") {
            if !sym.trim().is_empty() {
                self.instrument.symbol = sym.trim().to_uppercase();
            }
        }
        if let Ok(dir) = std::env::var("SO_TRIGGER_LOG_DIR") {
            if !dir.trim().is_empty() {
                self.trigger_logger.directory = dir;
            }
        }
    }

    /// Validate the required fields and fail fast with a [`ConfigError`].
    pub fn validate(&self) -> std::result::Result<(), ConfigError> {
        if self.instrument.symbol.trim().is_empty() {
            return Err(ConfigError::MissingSymbol);
        }
        if !Snapshot::validate_contract_key(&self.instrument.contract_key) {
            return Err(ConfigError::InvalidContractKey(
                self.instrument.contract_key.clone(),
            ));
        }
        if !(self.instrument.tick_size > 0.0) {
            return Err(ConfigError::InvalidTickSize(self.instrument.tick_size));
        }
        self.operating_window().ok_or_else(|| {
            ConfigError::InvalidWindow(
                self.operating_window_start.clone(),
                self.operating_window_end.clone(),
            )
        })?;
        Ok(())
    }

    pub fn operating_window(&self) -> Option<Window> {
        let start = parse_hh_mm(&self.operating_window_start)?;
        let end = parse_hh_mm(&self.operating_window_end)?;
        Some(Window::new(start, end))
    }

    pub fn gate_thresholds(&self) -> GateThresholds {
        GateThresholds {
            stale_threshold_ms: self.stale_threshold_ms,
            feed_heartbeat_timeout_ms: self.feed_heartbeat_timeout_ms,
            max_spread_ticks: self.max_spread_ticks,
        }
    }

    /// A short, stable hash of the config, carried on every snapshot as
    /// `config_hash` so readers can tell two runs apart even when
    /// `run_id` is unavailable.
    pub fn config_hash(&self) -> String {
        use std::collections::hash_map::DefaultHasher;
        use std::hash::{Hash, Hasher};
        let mut hasher = DefaultHasher::new();
        self.instrument.symbol.hash(&mut hasher);
        self.instrument.contract_key.hash(&mut hasher);
        self.cycle_target_ms.hash(&mut hasher);
        self.stale_threshold_ms.to_bits().hash(&mut hasher);
        self.max_spread_ticks.hash(&mut hasher);
        format!("{:016x}", hasher.finish())
    }
}

fn parse_hh_mm(s: &str) -> Option<NaiveTime> {
    let (h, m) = s.split_once(':')?;
    NaiveTime::from_hms_opt(h.parse().ok()?, m.parse().ok()?, 0)
}

impl Default for Config {
    fn default() -> Self {
        Self {
            instrument: InstrumentConfig {
                symbol: "ES".to_string(),
                contract_key: "ES.202609".to_string(),
                con_id: Some(1),
                tick_size: 0.25,
            },
            cycle_target_ms: default_cycle_target_ms(),
            cycle_overrun_threshold_ms: default_cycle_overrun_threshold_ms(),
            stale_threshold_ms: default_stale_threshold_ms(),
            feed_heartbeat_timeout_ms: default_feed_heartbeat_timeout_ms(),
            max_spread_ticks: default_max_spread_ticks(),
            operating_window_start: default_operating_window_start(),
            operating_window_end: default_operating_window_end(),
            trigger_logger: TriggerLoggerConfig::default(),
            max_runtime_s: None,
            inbound_queue_capacity: default_inbound_capacity(),
            command_queue_capacity: default_command_capacity(),
        }
    }
}
