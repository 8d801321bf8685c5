//! Network coordinator for the chunknet cluster.
//!
//! The coordinator:
//! 1. Maintains the registry of storage nodes (register / unregister / evict)
//! 2. Splits files into chunks and replicates each chunk to N distinct nodes
//! 3. Issues store / retrieve / status RPCs through a pluggable `NodeClient`
//! 4. Aggregates per-node status into network-wide metrics
//! 5. Detects unreachable nodes on a periodic poll, honouring a registration
//!    grace period before eviction

pub mod balance;
pub mod chunker;
pub mod client;
pub mod coordinator;
pub mod launcher;
pub mod registry;
pub mod status;

pub use balance::RoundRobin;
pub use client::{NodeClient, NodeClientError};
pub use coordinator::{CoordinatorConfig, NetworkCoordinator};
pub use launcher::{LaunchConfig, NodeHandle, NodeLauncher, SubprocessLauncher};
pub use registry::NodeRecord;
pub use status::NetworkMetrics;

use chunknet_common::NodeId;

/// Errors surfaced by coordinator operations.
#[derive(Debug, thiserror::Error)]
pub enum CoordinatorError {
    #[error("node already registered: {0}")]
    DuplicateNode(NodeId),

    #[error("no nodes available for storage")]
    NoNodesAvailable,

    #[error("all replicas failed for chunk {chunk_id}")]
    ChunkLost { chunk_id: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to launch node {node_id}: {message}")]
    Launch { node_id: NodeId, message: String },

    #[error("node {node_id} did not become reachable within {timeout_secs}s")]
    LaunchTimeout { node_id: NodeId, timeout_secs: u64 },
}
