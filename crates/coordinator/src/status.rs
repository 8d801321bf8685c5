//! Status cache and network-wide metric aggregation.

use chunknet_common::{NodeId, NodeStatus};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// Aggregate view over the most recent status snapshots.
#[derive(Debug, Clone, PartialEq)]
pub struct NetworkMetrics {
    pub total_nodes: usize,
    pub total_bytes: u64,
    pub used_bytes: u64,
    pub utilization_percent: f64,
    pub total_chunks: u64,
}

/// Cache of per-node status snapshots, overwritten wholesale on every poll.
/// Snapshots are never merged across polls.
#[derive(Debug, Clone, Default)]
pub struct StatusCache {
    statuses: Arc<Mutex<HashMap<NodeId, NodeStatus>>>,
}

impl StatusCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&self, status: NodeStatus) {
        self.statuses
            .lock()
            .expect("status cache poisoned")
            .insert(status.node_id.clone(), status);
    }

    pub fn remove(&self, node_id: &NodeId) {
        self.statuses
            .lock()
            .expect("status cache poisoned")
            .remove(node_id);
    }

    pub fn get(&self, node_id: &NodeId) -> Option<NodeStatus> {
        self.statuses
            .lock()
            .expect("status cache poisoned")
            .get(node_id)
            .cloned()
    }

    pub fn all(&self) -> Vec<NodeStatus> {
        self.statuses
            .lock()
            .expect("status cache poisoned")
            .values()
            .cloned()
            .collect()
    }

    /// Aggregate the cached snapshots into network-wide figures.
    pub fn network_metrics(&self) -> NetworkMetrics {
        let statuses = self.statuses.lock().expect("status cache poisoned");

        let mut total_bytes = 0u64;
        let mut used_bytes = 0u64;
        let mut total_chunks = 0u64;
        for status in statuses.values() {
            total_bytes += status.total_bytes;
            used_bytes += status.used_bytes;
            total_chunks += status.chunk_count;
        }

        let utilization_percent = if total_bytes > 0 {
            (used_bytes as f64 * 100.0) / total_bytes as f64
        } else {
            0.0
        };

        NetworkMetrics {
            total_nodes: statuses.len(),
            total_bytes,
            used_bytes,
            utilization_percent,
            total_chunks,
        }
    }
}
