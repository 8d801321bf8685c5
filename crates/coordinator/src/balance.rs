//! Load balancing: round-robin target selection.

use chunknet_common::NodeId;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Round-robin selection over a candidate list: an atomically incremented
/// counter modulo the candidate count. Deterministic and fair; the counter
/// is the only state and can be reset for tests.
#[derive(Debug, Default)]
pub struct RoundRobin {
    next_index: AtomicUsize,
}

impl RoundRobin {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pick the next candidate. `None` when the list is empty.
    pub fn select(&self, candidates: &[NodeId]) -> Option<NodeId> {
        if candidates.is_empty() {
            return None;
        }
        let index = self.next_index.fetch_add(1, Ordering::SeqCst) % candidates.len();
        Some(candidates[index].clone())
    }

    /// Reset the counter.
    pub fn reset(&self) {
        self.next_index.store(0, Ordering::SeqCst);
    }
}
