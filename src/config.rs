//! Engine configuration
//!
//! Engine settings load from a YAML file merged with `PLCPOLL_`-prefixed
//! environment variables; the tag table loads from a separate CSV file. Both
//! are read once at startup and handed to the engine by value.

use std::path::Path;

use anyhow::Context;
use figment::providers::{Env, Format, Yaml};
use figment::Figment;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// One row of the tag table
///
/// Maps a model field to its decode rule and location: register block,
/// start byte, optional bit index, optional repeat stride for slot fields.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TagRecord {
    pub field: String,
    pub function: String,
    pub db: u16,
    pub byte: usize,
    #[serde(default)]
    pub bit: Option<u8>,
    #[serde(default)]
    pub repeat: Option<usize>,
}

/// Controller endpoint settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlcConfig {
    /// Controller IP address or hostname
    pub address: String,
    #[serde(default)]
    pub rack: u16,
    #[serde(default = "default_slot")]
    pub slot: u16,
    /// Register blocks the poller is allowed to read
    pub blocks: Vec<u16>,
}

/// Poll cycle settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollingConfig {
    /// Poll interval in milliseconds
    #[serde(default = "default_poll_interval_ms")]
    pub interval_ms: u64,
    /// Bound of each per-field dispatch queue
    #[serde(default = "default_dispatch_queue")]
    pub dispatch_queue: usize,
    /// Log a cycle statistics summary every N cycles
    #[serde(default = "default_stats_every")]
    pub stats_every: u64,
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            interval_ms: default_poll_interval_ms(),
            dispatch_queue: default_dispatch_queue(),
            stats_every: default_stats_every(),
        }
    }
}

/// Reconnect loop settings
///
/// Defaults give a fixed 5 s retry cadence; a multiplier above 1.0 turns on
/// exponential backoff capped at `max_delay_ms`, with optional jitter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconnectConfig {
    #[serde(default = "default_reconnect_interval_ms")]
    pub interval_ms: u64,
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
    #[serde(default)]
    pub jitter: bool,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            interval_ms: default_reconnect_interval_ms(),
            backoff_multiplier: default_backoff_multiplier(),
            max_delay_ms: default_max_delay_ms(),
            jitter: false,
        }
    }
}

/// Top-level engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    pub plc: PlcConfig,
    #[serde(default)]
    pub polling: PollingConfig,
    #[serde(default)]
    pub reconnect: ReconnectConfig,
    /// Path to the CSV tag table, resolved relative to the working directory
    #[serde(default)]
    pub tag_table: Option<String>,
}

fn default_slot() -> u16 {
    1
}

fn default_poll_interval_ms() -> u64 {
    1500
}

fn default_dispatch_queue() -> usize {
    64
}

fn default_stats_every() -> u64 {
    100
}

fn default_reconnect_interval_ms() -> u64 {
    5000
}

fn default_backoff_multiplier() -> f64 {
    1.0
}

fn default_max_delay_ms() -> u64 {
    30_000
}

impl EngineConfig {
    /// Load configuration from a YAML file merged with `PLCPOLL_` environment
    /// variables (`PLCPOLL_PLC__ADDRESS=10.0.0.5` overrides `plc.address`).
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let config: EngineConfig = Figment::new()
            .merge(Yaml::file(path.as_ref()))
            .merge(Env::prefixed("PLCPOLL_").split("__"))
            .extract()?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> anyhow::Result<()> {
        anyhow::ensure!(!self.plc.address.is_empty(), "plc.address must not be empty");
        anyhow::ensure!(
            !self.plc.blocks.is_empty(),
            "plc.blocks must declare at least one register block"
        );
        anyhow::ensure!(
            self.polling.interval_ms >= 100,
            "polling.interval_ms below 100 ms is not supported"
        );
        anyhow::ensure!(
            self.polling.dispatch_queue > 0,
            "polling.dispatch_queue must be positive"
        );
        anyhow::ensure!(
            self.reconnect.interval_ms >= 100,
            "reconnect.interval_ms below 100 ms is not supported"
        );
        anyhow::ensure!(
            self.reconnect.backoff_multiplier >= 1.0,
            "reconnect.backoff_multiplier must be at least 1.0"
        );
        Ok(())
    }
}

/// Load the CSV tag table.
///
/// Expected header: `field,function,db,byte,bit,repeat` with `bit` and
/// `repeat` left empty where not applicable.
pub fn load_tag_table(path: impl AsRef<Path>) -> anyhow::Result<Vec<TagRecord>> {
    let path = path.as_ref();
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_path(path)
        .with_context(|| format!("failed to open tag table {}", path.display()))?;

    let mut records = Vec::new();
    for row in reader.deserialize() {
        let record: TagRecord =
            row.with_context(|| format!("malformed row in tag table {}", path.display()))?;
        records.push(record);
    }
    Ok(records)
}
