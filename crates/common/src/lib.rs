//! chunknet-common: shared types for the chunknet project.
//!
//! Provides the `NodeId` identifier plus the value types that cross
//! component boundaries: `Chunk`, `ChunkDistribution` and `NodeStatus`.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

// ---------------------------------------------------------------------------
// NodeId
// ---------------------------------------------------------------------------

/// Identifier for a storage node, unique across the coordinator's registry.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(String);

impl NodeId {
    /// Create a `NodeId` from any string-like value.
    ///
    /// Emptiness is checked at configuration-validation time, not here, so
    /// test fixtures can build ids freely.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Return the id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<&str> for NodeId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for NodeId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl fmt::Debug for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NodeId({})", self.0)
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ---------------------------------------------------------------------------
// Chunk
// ---------------------------------------------------------------------------

/// A contiguous byte-range slice of a file, the unit of distribution and
/// replication. Immutable after creation; the payload is never exposed
/// mutably, so no aliasing can cross ownership boundaries.
#[derive(Clone, PartialEq, Eq)]
pub struct Chunk {
    chunk_id: String,
    data: Vec<u8>,
}

impl Chunk {
    pub fn new(chunk_id: impl Into<String>, data: Vec<u8>) -> Self {
        Self {
            chunk_id: chunk_id.into(),
            data,
        }
    }

    pub fn chunk_id(&self) -> &str {
        &self.chunk_id
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn size_bytes(&self) -> u64 {
        self.data.len() as u64
    }

    /// Consume the chunk, yielding its payload without copying.
    pub fn into_data(self) -> Vec<u8> {
        self.data
    }
}

impl fmt::Debug for Chunk {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Chunk {{ id: {}, size: {} }}",
            self.chunk_id,
            self.data.len()
        )
    }
}

// ---------------------------------------------------------------------------
// ChunkDistribution
// ---------------------------------------------------------------------------

/// Records which node holds which chunk replicas after a distribution run.
///
/// Built incrementally by the coordinator during a single `distribute_file`
/// call and handed to the caller afterwards; it is not persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkDistribution {
    file_name: String,
    total_chunks: usize,
    replication_factor: usize,
    node_to_chunks: HashMap<NodeId, Vec<String>>,
}

impl ChunkDistribution {
    pub fn new(
        file_name: impl Into<String>,
        total_chunks: usize,
        replication_factor: usize,
    ) -> Self {
        Self {
            file_name: file_name.into(),
            total_chunks,
            replication_factor,
            node_to_chunks: HashMap::new(),
        }
    }

    /// Record that `chunk_id` was successfully placed on `node_id`.
    pub fn record_placement(&mut self, node_id: NodeId, chunk_id: impl Into<String>) {
        self.node_to_chunks
            .entry(node_id)
            .or_default()
            .push(chunk_id.into());
    }

    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    pub fn total_chunks(&self) -> usize {
        self.total_chunks
    }

    pub fn replication_factor(&self) -> usize {
        self.replication_factor
    }

    /// Map of node id to the ordered chunk ids placed on it.
    pub fn node_to_chunks(&self) -> &HashMap<NodeId, Vec<String>> {
        &self.node_to_chunks
    }

    /// Total placements recorded so far, counting every replica.
    pub fn total_placements(&self) -> usize {
        self.node_to_chunks.values().map(Vec::len).sum()
    }

    /// Complete iff every chunk reached its full replica count.
    pub fn is_complete(&self) -> bool {
        self.total_placements() == self.total_chunks * self.replication_factor
    }

    /// All nodes that hold at least one replica of `chunk_id`.
    pub fn nodes_holding(&self, chunk_id: &str) -> Vec<NodeId> {
        self.node_to_chunks
            .iter()
            .filter(|(_, chunks)| chunks.iter().any(|c| c == chunk_id))
            .map(|(node, _)| node.clone())
            .collect()
    }
}

// ---------------------------------------------------------------------------
// NodeStatus
// ---------------------------------------------------------------------------

/// Point-in-time capacity snapshot pulled from a node's virtual disk.
///
/// Cached by the coordinator's status cache and overwritten on every poll;
/// snapshots from different polls are never merged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeStatus {
    pub node_id: NodeId,
    pub used_bytes: u64,
    pub total_bytes: u64,
    pub chunk_count: u64,
    pub utilization_percent: f64,
}

impl NodeStatus {
    pub fn new(node_id: NodeId, used_bytes: u64, total_bytes: u64, chunk_count: u64) -> Self {
        let utilization_percent = if total_bytes > 0 {
            (used_bytes as f64 * 100.0) / total_bytes as f64
        } else {
            0.0
        };
        Self {
            node_id,
            used_bytes,
            total_bytes,
            chunk_count,
            utilization_percent,
        }
    }
}

// ---------------------------------------------------------------------------
// Formatting helpers
// ---------------------------------------------------------------------------

const KIB: u64 = 1024;
const MIB: u64 = 1024 * KIB;
const GIB: u64 = 1024 * MIB;

/// Human-readable byte count, used by log lines across the workspace.
pub fn format_bytes(bytes: u64) -> String {
    if bytes < KIB {
        format!("{} B", bytes)
    } else if bytes < MIB {
        format!("{:.2} KB", bytes as f64 / KIB as f64)
    } else if bytes < GIB {
        format!("{:.2} MB", bytes as f64 / MIB as f64)
    } else {
        format!("{:.2} GB", bytes as f64 / GIB as f64)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
