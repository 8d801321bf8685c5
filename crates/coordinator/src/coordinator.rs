//! The network coordinator: registry operations, file distribution with
//! replication, status polling and liveness eviction.

use crate::balance::RoundRobin;
use crate::chunker;
use crate::client::{NodeClient, NodeClientError};
use crate::registry::{NodeRecord, Registry};
use crate::status::{NetworkMetrics, StatusCache};
use crate::CoordinatorError;
use chunknet_common::{format_bytes, ChunkDistribution, NodeId, NodeStatus};
use std::path::Path;
use std::sync::Arc;
use tokio::time::{interval, Duration};

/// Coordinator tuning knobs.
#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    /// Window after registration during which unreachability is tolerated:
    /// a freshly started node needs time to open its listener.
    pub grace_period: Duration,
    /// Cadence of the background status poll.
    pub poll_interval: Duration,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            grace_period: Duration::from_secs(10),
            poll_interval: Duration::from_secs(15),
        }
    }
}

/// Coordinates the distributed storage network.
///
/// Generic over `C: NodeClient` for testability: real deployments use
/// `chunknet-net`'s `GrpcNodeClient`; unit tests use a mock.
pub struct NetworkCoordinator<C: NodeClient> {
    registry: Registry,
    client: Arc<C>,
    balancer: RoundRobin,
    status_cache: StatusCache,
    config: CoordinatorConfig,
}

impl<C: NodeClient> std::fmt::Debug for NetworkCoordinator<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NetworkCoordinator")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl<C: NodeClient> NetworkCoordinator<C> {
    pub fn new(client: Arc<C>, config: CoordinatorConfig) -> Self {
        Self {
            registry: Registry::new(),
            client,
            balancer: RoundRobin::new(),
            status_cache: StatusCache::new(),
            config,
        }
    }

    // -----------------------------------------------------------------------
    // Registry operations
    // -----------------------------------------------------------------------

    /// Register a node. Fails with `DuplicateNode` when the id is taken.
    /// The registration timestamp starts the liveness grace period.
    pub async fn register_node(
        &self,
        node_id: NodeId,
        host: impl Into<String>,
        port: u16,
    ) -> Result<(), CoordinatorError> {
        let record = NodeRecord::new(node_id.clone(), host, port);
        let address = record.address();

        if !self.registry.insert(record).await {
            return Err(CoordinatorError::DuplicateNode(node_id));
        }

        chunknet_metrics::metrics().nodes_registered.inc();
        tracing::info!(
            "node registered: {} at {} (grace period {:?})",
            node_id,
            address,
            self.config.grace_period
        );
        Ok(())
    }

    /// Unregister a node, dropping its pooled connection. Idempotent:
    /// returns whether a record was actually removed.
    pub async fn unregister_node(&self, node_id: &NodeId) -> bool {
        match self.registry.remove(node_id).await {
            Some(_) => {
                self.client.disconnect(node_id).await;
                self.status_cache.remove(node_id);
                chunknet_metrics::metrics().nodes_registered.dec();
                tracing::info!("node unregistered: {}", node_id);
                true
            }
            None => {
                tracing::warn!("cannot unregister node {} - not found", node_id);
                false
            }
        }
    }

    /// Registered node ids.
    pub async fn nodes(&self) -> Vec<NodeId> {
        self.registry.key_snapshot().await
    }

    /// Registered nodes with connection details.
    pub async fn node_details(&self) -> Vec<NodeRecord> {
        self.registry.records().await
    }

    pub async fn node_count(&self) -> usize {
        self.registry.len().await
    }

    // -----------------------------------------------------------------------
    // File distribution
    // -----------------------------------------------------------------------

    /// Read a file and distribute it across the network with replication.
    pub async fn distribute_file(
        &self,
        path: &Path,
        chunk_size_bytes: usize,
        replication_factor: usize,
    ) -> Result<ChunkDistribution, CoordinatorError> {
        let data = tokio::fs::read(path).await?;
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "file".to_string());
        self.distribute_bytes(&file_name, &data, chunk_size_bytes, replication_factor)
            .await
    }

    /// Distribute an in-memory byte sequence.
    ///
    /// Each chunk is placed on `min(replication_factor, node_count)`
    /// distinct nodes; per-replica failures are logged and tolerated, but a
    /// chunk losing every replica aborts the whole operation.
    pub async fn distribute_bytes(
        &self,
        file_name: &str,
        data: &[u8],
        chunk_size_bytes: usize,
        replication_factor: usize,
    ) -> Result<ChunkDistribution, CoordinatorError> {
        let op_id = uuid::Uuid::new_v4();
        let chunks = chunker::split_into_chunks(file_name, data, chunk_size_bytes);

        let node_ids = self.registry.key_snapshot().await;
        if node_ids.is_empty() {
            return Err(CoordinatorError::NoNodesAvailable);
        }

        let effective = replication_factor.min(node_ids.len()).max(1);
        if effective < replication_factor {
            tracing::warn!(
                "only {} node(s) available, replication factor reduced to {}",
                node_ids.len(),
                effective
            );
        }

        tracing::info!(
            "distributing {} ({}, {} chunk(s), {}x replication) [op {}]",
            file_name,
            format_bytes(data.len() as u64),
            chunks.len(),
            effective,
            op_id
        );

        let mut distribution = ChunkDistribution::new(file_name, chunks.len(), effective);

        for chunk in &chunks {
            let mut selected: Vec<NodeId> = Vec::with_capacity(effective);

            for replica in 0..effective {
                let candidates: Vec<NodeId> = node_ids
                    .iter()
                    .filter(|id| !selected.contains(id))
                    .cloned()
                    .collect();

                // Never place two replicas of one chunk on the same node
                // unless every node already holds one.
                let target = if candidates.is_empty() {
                    self.balancer.select(&node_ids)
                } else {
                    self.balancer.select(&candidates)
                }
                .expect("candidate list is non-empty");
                selected.push(target.clone());

                let Some(record) = self.registry.get(&target).await else {
                    // Evicted while we were distributing.
                    tracing::warn!(
                        "node {} disappeared during distribution of {}",
                        target,
                        chunk.chunk_id()
                    );
                    continue;
                };

                match self
                    .client
                    .store_chunk(&record, chunk.chunk_id(), chunk.data().to_vec())
                    .await
                {
                    Ok(()) => {
                        distribution.record_placement(target.clone(), chunk.chunk_id());
                        chunknet_metrics::metrics()
                            .bytes_distributed
                            .inc_by(chunk.size_bytes());
                        tracing::debug!(
                            "replica {}/{}: {} -> {}",
                            replica + 1,
                            effective,
                            chunk.chunk_id(),
                            target
                        );
                    }
                    Err(e) => {
                        tracing::warn!(
                            "failed to place {} on {}: {}",
                            chunk.chunk_id(),
                            target,
                            e
                        );
                    }
                }
            }

            // A chunk with zero surviving replicas makes the file
            // unreconstructable; that is fatal to the operation.
            if distribution.nodes_holding(chunk.chunk_id()).is_empty() {
                return Err(CoordinatorError::ChunkLost {
                    chunk_id: chunk.chunk_id().to_string(),
                });
            }
        }

        self.update_all_node_statuses().await;
        chunknet_metrics::metrics().distributions_total.inc();

        tracing::info!(
            "distribution of {} complete: {} placement(s), survives {} node failure(s) [op {}]",
            file_name,
            distribution.total_placements(),
            effective.saturating_sub(1),
            op_id
        );
        Ok(distribution)
    }

    /// Reassemble a previously distributed file by fetching each chunk from
    /// any node still holding a replica.
    pub async fn retrieve_file(
        &self,
        distribution: &ChunkDistribution,
    ) -> Result<Vec<u8>, CoordinatorError> {
        let mut data = Vec::new();

        for index in 0..distribution.total_chunks() {
            let chunk_id = chunker::chunk_id(distribution.file_name(), index);
            let mut holders = distribution.nodes_holding(&chunk_id);
            holders.sort();

            let mut recovered = None;
            for holder in &holders {
                let Some(record) = self.registry.get(holder).await else {
                    continue;
                };
                match self.client.retrieve_chunk(&record, &chunk_id).await {
                    Ok(bytes) => {
                        recovered = Some(bytes);
                        break;
                    }
                    Err(e) => {
                        tracing::warn!("replica of {} on {} unusable: {}", chunk_id, holder, e);
                    }
                }
            }

            match recovered {
                Some(bytes) => data.extend_from_slice(&bytes),
                None => return Err(CoordinatorError::ChunkLost { chunk_id }),
            }
        }

        Ok(data)
    }

    // -----------------------------------------------------------------------
    // Status polling & liveness
    // -----------------------------------------------------------------------

    /// Poll `get_status` on every registered node, refreshing the status
    /// cache. An unreachable node inside its grace period is retained;
    /// outside it, it is evicted. Iterates over a snapshot of the registry
    /// keys so concurrent eviction cannot disturb the walk.
    pub async fn update_all_node_statuses(&self) {
        for node_id in self.registry.key_snapshot().await {
            self.update_node_status(&node_id).await;
        }
    }

    async fn update_node_status(&self, node_id: &NodeId) {
        let Some(record) = self.registry.get(node_id).await else {
            return; // unregistered since the snapshot
        };

        match self.client.get_status(&record).await {
            Ok(status) => {
                self.status_cache.update(status);
            }
            Err(NodeClientError::Unavailable(reason)) => {
                let since_registration = record.registered_at.elapsed();
                if since_registration < self.config.grace_period {
                    tracing::debug!(
                        "node {} unavailable but within grace period ({:?} < {:?})",
                        node_id,
                        since_registration,
                        self.config.grace_period
                    );
                    return;
                }
                tracing::warn!(
                    "node {} unavailable ({}), evicting dead node",
                    node_id,
                    reason
                );
                self.unregister_node(node_id).await;
                chunknet_metrics::metrics().node_evictions.inc();
            }
            Err(e) => {
                tracing::error!("failed to get status from node {}: {}", node_id, e);
            }
        }
    }

    /// Spawn the periodic status poll.
    pub fn spawn_status_poll_task(self: &Arc<Self>) -> tokio::task::JoinHandle<()> {
        let coordinator = self.clone();
        let poll_interval = coordinator.config.poll_interval;
        tokio::spawn(async move {
            let mut tick = interval(poll_interval);
            tick.tick().await; // consume the immediate first tick
            loop {
                tick.tick().await;
                coordinator.update_all_node_statuses().await;
            }
        })
    }

    /// Reachability probe used by the launch helper.
    pub(crate) async fn client_probe(&self, record: &NodeRecord) -> bool {
        self.client.get_status(record).await.is_ok()
    }

    // -----------------------------------------------------------------------
    // Metrics
    // -----------------------------------------------------------------------

    /// Aggregated network metrics from the status cache.
    pub fn network_metrics(&self) -> NetworkMetrics {
        self.status_cache.network_metrics()
    }

    /// Most recent cached status for one node.
    pub fn cached_status(&self, node_id: &NodeId) -> Option<NodeStatus> {
        self.status_cache.get(node_id)
    }

    /// Reset the load balancer counter (tests).
    pub fn reset_balancer(&self) {
        self.balancer.reset();
    }
}
