//! Node registry: the coordinator's authoritative membership map.

use chunknet_common::NodeId;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::RwLock;

/// Registration record for one storage node. Owned exclusively by the
/// registry: created on registration, removed on unregistration/eviction.
#[derive(Debug, Clone)]
pub struct NodeRecord {
    pub node_id: NodeId,
    pub host: String,
    pub port: u16,
    /// Used for the liveness grace period.
    pub registered_at: Instant,
}

impl NodeRecord {
    pub fn new(node_id: NodeId, host: impl Into<String>, port: u16) -> Self {
        Self {
            node_id,
            host: host.into(),
            port,
            registered_at: Instant::now(),
        }
    }

    /// gRPC endpoint for this node.
    pub fn endpoint(&self) -> String {
        format!("http://{}:{}", self.host, self.port)
    }

    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Concurrency-safe registry map. Register/unregister/evict race from RPC
/// handlers and the status poller; iteration always goes through a key
/// snapshot so eviction during a poll cannot invalidate it.
#[derive(Debug, Clone, Default)]
pub struct Registry {
    nodes: Arc<RwLock<HashMap<NodeId, NodeRecord>>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a record; `false` when the id is already present.
    pub async fn insert(&self, record: NodeRecord) -> bool {
        let mut nodes = self.nodes.write().await;
        if nodes.contains_key(&record.node_id) {
            return false;
        }
        nodes.insert(record.node_id.clone(), record);
        true
    }

    /// Remove a record, returning it when present.
    pub async fn remove(&self, node_id: &NodeId) -> Option<NodeRecord> {
        self.nodes.write().await.remove(node_id)
    }

    pub async fn get(&self, node_id: &NodeId) -> Option<NodeRecord> {
        self.nodes.read().await.get(node_id).cloned()
    }

    pub async fn contains(&self, node_id: &NodeId) -> bool {
        self.nodes.read().await.contains_key(node_id)
    }

    pub async fn len(&self) -> usize {
        self.nodes.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.nodes.read().await.is_empty()
    }

    /// Defensive snapshot of the registered ids, in insertion-independent
    /// but stable (sorted) order.
    pub async fn key_snapshot(&self) -> Vec<NodeId> {
        let mut keys: Vec<NodeId> = self.nodes.read().await.keys().cloned().collect();
        keys.sort();
        keys
    }

    /// Snapshot of all records.
    pub async fn records(&self) -> Vec<NodeRecord> {
        self.nodes.read().await.values().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_insert_and_duplicate() {
        let registry = Registry::new();
        assert!(
            registry
                .insert(NodeRecord::new(NodeId::from("n1"), "127.0.0.1", 7001))
                .await
        );
        assert!(
            !registry
                .insert(NodeRecord::new(NodeId::from("n1"), "127.0.0.1", 7002))
                .await,
            "duplicate id must be rejected"
        );
        assert_eq!(registry.len().await, 1);
    }

    #[tokio::test]
    async fn test_remove_is_idempotent() {
        let registry = Registry::new();
        registry
            .insert(NodeRecord::new(NodeId::from("n1"), "127.0.0.1", 7001))
            .await;
        assert!(registry.remove(&NodeId::from("n1")).await.is_some());
        assert!(registry.remove(&NodeId::from("n1")).await.is_none());
    }

    #[tokio::test]
    async fn test_key_snapshot_is_sorted() {
        let registry = Registry::new();
        for id in ["charlie", "alpha", "bravo"] {
            registry
                .insert(NodeRecord::new(NodeId::from(id), "127.0.0.1", 7000))
                .await;
        }
        let keys = registry.key_snapshot().await;
        assert_eq!(
            keys,
            vec![
                NodeId::from("alpha"),
                NodeId::from("bravo"),
                NodeId::from("charlie")
            ]
        );
    }

    #[tokio::test]
    async fn test_endpoint_format() {
        let record = NodeRecord::new(NodeId::from("n1"), "localhost", 7005);
        assert_eq!(record.endpoint(), "http://localhost:7005");
        assert_eq!(record.address(), "localhost:7005");
    }
}
