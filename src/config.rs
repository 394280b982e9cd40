use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use serde::Deserialize;

use crate::store::DEFAULT_WINDOW_CAPACITY;

/// Top-level configuration for the telespect pipeline.
#[derive(Debug, Default, Deserialize)]
pub struct Config {
    /// Logging verbosity (trace, debug, info, warn, error). Default: "info".
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Collector-side configuration.
    #[serde(default)]
    pub collector: CollectorConfig,

    /// Producer-side configuration.
    #[serde(default)]
    pub producer: ProducerConfig,

    /// Prometheus health metrics server configuration.
    #[serde(default)]
    pub health: HealthConfig,
}

/// Collector-side configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct CollectorConfig {
    /// Address to listen on. Default: "0.0.0.0".
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,

    /// TCP port to listen on. Default: 8077.
    #[serde(default = "default_port")]
    pub listen_port: u16,

    /// Maximum samples retained per metric window. Default: 1,000,000.
    #[serde(default = "default_window_capacity")]
    pub window_capacity: usize,

    /// Directory for persisted spectrum files. Default: ".".
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,

    /// Persist each computed spectrum to `{id}_spectrum.txt`. Default: false.
    #[serde(default)]
    pub persist_spectra: bool,

    /// How often to log the message counters. Default: 60s.
    #[serde(default = "default_stats_interval", with = "humantime_serde")]
    pub stats_interval: Duration,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            listen_port: default_port(),
            window_capacity: default_window_capacity(),
            output_dir: default_output_dir(),
            persist_spectra: false,
            stats_interval: default_stats_interval(),
        }
    }
}

/// Producer-side configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ProducerConfig {
    /// Collector address to connect to. Default: "127.0.0.1".
    #[serde(default = "default_server_addr")]
    pub server_addr: String,

    /// Collector TCP port. Default: 8077.
    #[serde(default = "default_port")]
    pub server_port: u16,

    /// Total number of metric ids the deployment knows about; every id in
    /// `metric_ids` must fall below this. Default: 10.
    #[serde(default = "default_metric_count")]
    pub metric_count: usize,

    /// Metric ids this producer emits each cycle. Default: [0].
    #[serde(default = "default_metric_ids")]
    pub metric_ids: Vec<i64>,

    /// Readings generated per metric per cycle. Default: 100.
    #[serde(default = "default_samples_per_cycle")]
    pub samples_per_cycle: usize,

    /// Send cadence; generation time is absorbed into it. Default: 1s.
    #[serde(default = "default_period", with = "humantime_serde")]
    pub period: Duration,

    /// Directory for persisted result files. Default: ".".
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,

    /// Persist each reply record to `{pid}_{id}_result.txt`. Default: false.
    #[serde(default)]
    pub persist_results: bool,
}

impl Default for ProducerConfig {
    fn default() -> Self {
        Self {
            server_addr: default_server_addr(),
            server_port: default_port(),
            metric_count: default_metric_count(),
            metric_ids: default_metric_ids(),
            samples_per_cycle: default_samples_per_cycle(),
            period: default_period(),
            output_dir: default_output_dir(),
            persist_results: false,
        }
    }
}

/// Prometheus health metrics server configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct HealthConfig {
    /// Listen address for /metrics and /healthz. Default: "127.0.0.1:9640".
    #[serde(default = "default_health_addr")]
    pub addr: String,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            addr: default_health_addr(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_listen_addr() -> String {
    "0.0.0.0".to_string()
}

fn default_server_addr() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8077
}

fn default_window_capacity() -> usize {
    DEFAULT_WINDOW_CAPACITY
}

fn default_output_dir() -> PathBuf {
    PathBuf::from(".")
}

fn default_stats_interval() -> Duration {
    Duration::from_secs(60)
}

fn default_metric_count() -> usize {
    10
}

fn default_metric_ids() -> Vec<i64> {
    vec![0]
}

fn default_samples_per_cycle() -> usize {
    100
}

fn default_period() -> Duration {
    Duration::from_secs(1)
}

fn default_health_addr() -> String {
    "127.0.0.1:9640".to_string()
}

// --- Validation and loading ---

impl Config {
    /// Load configuration from a YAML file.
    pub fn load(path: &Path) -> Result<Self> {
        let data = std::fs::read_to_string(path)
            .with_context(|| format!("reading config file {}", path.display()))?;

        let cfg: Config = serde_yaml::from_str(&data)
            .with_context(|| format!("parsing config file {}", path.display()))?;

        cfg.validate()?;

        Ok(cfg)
    }

    /// Validate the configuration for required fields and consistency.
    pub fn validate(&self) -> Result<()> {
        if self.collector.window_capacity == 0 {
            bail!("collector.window_capacity must be positive");
        }

        if self.health.addr.is_empty() {
            bail!("health.addr is required");
        }

        if self.producer.metric_ids.is_empty() {
            bail!("producer.metric_ids must not be empty");
        }

        if self.producer.samples_per_cycle == 0 {
            bail!("producer.samples_per_cycle must be positive");
        }

        if self.producer.period.is_zero() {
            bail!("producer.period must be positive");
        }

        let mut seen = HashSet::new();
        for &id in &self.producer.metric_ids {
            if id < 0 || id as usize >= self.producer.metric_count {
                bail!(
                    "producer.metric_ids entry {id} is outside 0..{}",
                    self.producer.metric_count
                );
            }
            if !seen.insert(id) {
                bail!("producer.metric_ids entry {id} appears more than once");
            }
        }

        Ok(())
    }
}
