//! Node construction parameters.

use crate::RuntimeError;
use chunknet_lifecycle::HeartbeatConfig;
use std::path::PathBuf;
use tokio::time::Duration;

/// Configuration for one storage node: identity, declared capacities, and
/// component tuning. Fields have sensible defaults; `node_id`, `port` and
/// `data_dir` are the ones callers always set.
#[derive(Debug, Clone)]
pub struct NodeSpec {
    pub node_id: String,
    pub port: u16,
    pub data_dir: PathBuf,
    pub storage_gb: u64,
    pub ram_gb: u64,
    pub cpu_cores: usize,
    pub bandwidth_mbps: u64,
    pub heartbeat: HeartbeatConfig,
    pub scheduler_workers: usize,
    pub shutdown_timeout: Duration,
}

impl Default for NodeSpec {
    fn default() -> Self {
        Self {
            node_id: String::new(),
            port: 0,
            data_dir: PathBuf::from("data"),
            storage_gb: 100,
            ram_gb: 8,
            cpu_cores: 4,
            bandwidth_mbps: 1000,
            heartbeat: HeartbeatConfig::default(),
            scheduler_workers: 4,
            shutdown_timeout: Duration::from_secs(30),
        }
    }
}

impl NodeSpec {
    /// Required fields must be present before construction proceeds.
    pub fn validate(&self) -> Result<(), RuntimeError> {
        if self.node_id.trim().is_empty() {
            return Err(RuntimeError::InvalidSpec("node_id must not be empty".into()));
        }
        if self.port == 0 {
            return Err(RuntimeError::InvalidSpec("port must be non-zero".into()));
        }
        if self.storage_gb == 0 {
            return Err(RuntimeError::InvalidSpec("storage_gb must be > 0".into()));
        }
        if self.cpu_cores == 0 {
            return Err(RuntimeError::InvalidSpec("cpu_cores must be > 0".into()));
        }
        Ok(())
    }

    pub fn storage_bytes(&self) -> u64 {
        self.storage_gb * 1024 * 1024 * 1024
    }

    pub fn ram_bytes(&self) -> u64 {
        self.ram_gb * 1024 * 1024 * 1024
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_spec() -> NodeSpec {
        NodeSpec {
            node_id: "node1".to_string(),
            port: 7000,
            ..NodeSpec::default()
        }
    }

    #[test]
    fn test_valid_spec_passes() {
        valid_spec().validate().unwrap();
    }

    #[test]
    fn test_rejects_empty_id() {
        let spec = NodeSpec {
            node_id: "   ".to_string(),
            ..valid_spec()
        };
        assert!(spec.validate().is_err());
    }

    #[test]
    fn test_rejects_zero_port() {
        let spec = NodeSpec {
            port: 0,
            ..valid_spec()
        };
        assert!(spec.validate().is_err());
    }

    #[test]
    fn test_storage_bytes() {
        let spec = NodeSpec {
            storage_gb: 2,
            ..valid_spec()
        };
        assert_eq!(spec.storage_bytes(), 2 * 1024 * 1024 * 1024);
    }
}
