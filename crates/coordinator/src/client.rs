//! Abstraction over coordinator-to-node RPCs.
//!
//! A trait in the domain crate with the gRPC implementation in
//! `chunknet-net`: real deployments use `GrpcNodeClient`; unit tests use
//! an in-process mock.

use crate::registry::NodeRecord;
use chunknet_common::{NodeId, NodeStatus};

/// Errors surfaced by node RPCs. `Unavailable` is the only variant that
/// feeds the grace-period / eviction logic; everything else is reported to
/// the immediate caller and otherwise ignored by liveness tracking.
#[derive(Debug, thiserror::Error)]
pub enum NodeClientError {
    #[error("node unavailable: {0}")]
    Unavailable(String),

    #[error("RPC timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("node rejected chunk: {0}")]
    Rejected(String),

    #[error("chunk not found: {0}")]
    NotFound(String),

    #[error("RPC failed: {0}")]
    Rpc(String),
}

/// Transport for the three node-facing RPCs.
#[async_trait::async_trait]
pub trait NodeClient: Send + Sync + 'static {
    /// Ship one chunk replica to a node.
    async fn store_chunk(
        &self,
        target: &NodeRecord,
        chunk_id: &str,
        data: Vec<u8>,
    ) -> Result<(), NodeClientError>;

    /// Fetch one chunk replica from a node.
    async fn retrieve_chunk(
        &self,
        target: &NodeRecord,
        chunk_id: &str,
    ) -> Result<Vec<u8>, NodeClientError>;

    /// Pull a capacity snapshot from a node.
    async fn get_status(&self, target: &NodeRecord) -> Result<NodeStatus, NodeClientError>;

    /// Drop any pooled connection state for a node (called on unregister).
    async fn disconnect(&self, node_id: &NodeId);
}
