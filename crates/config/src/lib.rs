//! Configuration schema and loader for chunknet storage nodes.

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::PathBuf;

/// Top-level node configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeConfig {
    /// This node's unique identifier.
    pub node_id: String,

    /// This node's gRPC listen address.
    pub listen: SocketAddr,

    /// Declared hardware capacities.
    #[serde(default)]
    pub capacity: CapacityConfig,

    /// Virtual disk settings.
    #[serde(default)]
    pub disk: DiskConfig,

    /// Process scheduler settings.
    #[serde(default)]
    pub scheduler: SchedulerConfig,

    /// Lifecycle / heartbeat settings.
    #[serde(default)]
    pub lifecycle: LifecycleConfig,

    /// Optional Prometheus metrics HTTP port.
    #[serde(default)]
    pub metrics_port: Option<u16>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CapacityConfig {
    /// Declared storage capacity in gigabytes.
    #[serde(default = "default_storage_gb")]
    pub storage_gb: u64,

    /// Declared RAM in gigabytes.
    #[serde(default = "default_ram_gb")]
    pub ram_gb: u64,

    /// Declared CPU core count.
    #[serde(default = "default_cpu_cores")]
    pub cpu_cores: usize,

    /// Declared bandwidth in megabits per second.
    #[serde(default = "default_bandwidth_mbps")]
    pub bandwidth_mbps: u64,
}

impl Default for CapacityConfig {
    fn default() -> Self {
        Self {
            storage_gb: default_storage_gb(),
            ram_gb: default_ram_gb(),
            cpu_cores: default_cpu_cores(),
            bandwidth_mbps: default_bandwidth_mbps(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiskConfig {
    /// Directory holding the disk's backing allocation and blob files.
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
}

impl Default for DiskConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Fixed worker-pool size. Zero means "one per declared CPU core".
    #[serde(default)]
    pub workers: usize,

    /// Shutdown drain timeout in seconds.
    #[serde(default = "default_shutdown_timeout_secs")]
    pub shutdown_timeout_secs: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            workers: 0,
            shutdown_timeout_secs: default_shutdown_timeout_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LifecycleConfig {
    /// Heartbeat emission interval in milliseconds.
    #[serde(default = "default_heartbeat_interval_ms")]
    pub heartbeat_interval_ms: u64,

    /// Heartbeat staleness beyond which the node is declared dead, in
    /// milliseconds. Must be strictly greater than the interval.
    #[serde(default = "default_dead_threshold_ms")]
    pub dead_threshold_ms: u64,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval_ms: default_heartbeat_interval_ms(),
            dead_threshold_ms: default_dead_threshold_ms(),
        }
    }
}

// --- Defaults ---

fn default_storage_gb() -> u64 {
    100
}
fn default_ram_gb() -> u64 {
    8
}
fn default_cpu_cores() -> usize {
    4
}
fn default_bandwidth_mbps() -> u64 {
    1000
}
fn default_data_dir() -> PathBuf {
    PathBuf::from("data")
}
fn default_shutdown_timeout_secs() -> u64 {
    30
}
fn default_heartbeat_interval_ms() -> u64 {
    5000
}
fn default_dead_threshold_ms() -> u64 {
    15000
}

// --- Loading ---

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}

impl NodeConfig {
    /// Validate that configuration values are consistent.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.node_id.trim().is_empty() {
            return Err(ConfigError::Invalid("node_id must not be empty".into()));
        }
        if self.listen.port() == 0 {
            return Err(ConfigError::Invalid("listen port must be non-zero".into()));
        }
        if self.capacity.storage_gb == 0 {
            return Err(ConfigError::Invalid(
                "capacity.storage_gb must be > 0".into(),
            ));
        }
        if self.capacity.cpu_cores == 0 {
            return Err(ConfigError::Invalid(
                "capacity.cpu_cores must be > 0".into(),
            ));
        }
        if self.lifecycle.dead_threshold_ms <= self.lifecycle.heartbeat_interval_ms {
            return Err(ConfigError::Invalid(format!(
                "lifecycle.dead_threshold_ms ({}) must be > heartbeat_interval_ms ({})",
                self.lifecycle.dead_threshold_ms, self.lifecycle.heartbeat_interval_ms
            )));
        }
        Ok(())
    }

    /// Effective scheduler worker count: explicit setting or one per core.
    pub fn scheduler_workers(&self) -> usize {
        if self.scheduler.workers > 0 {
            self.scheduler.workers
        } else {
            self.capacity.cpu_cores
        }
    }

    /// Declared storage capacity in bytes.
    pub fn storage_bytes(&self) -> u64 {
        self.capacity.storage_gb * 1024 * 1024 * 1024
    }
}

/// Load a `NodeConfig` from a YAML file path.
pub fn load_from_file(path: &std::path::Path) -> Result<NodeConfig, ConfigError> {
    let contents = std::fs::read_to_string(path)?;
    let config: NodeConfig = serde_yaml::from_str(&contents)?;
    config.validate()?;
    Ok(config)
}

/// Load a `NodeConfig` from a YAML string.
pub fn load_from_str(yaml: &str) -> Result<NodeConfig, ConfigError> {
    let config: NodeConfig = serde_yaml::from_str(yaml)?;
    config.validate()?;
    Ok(config)
}
