//! gRPC client implementing the coordinator's `NodeClient`.
//!
//! Maintains a pool of tonic channels keyed by node id, creating new
//! connections on demand and invalidating them on failure. Connect errors
//! and `Unavailable` statuses map to `NodeClientError::Unavailable`, the
//! condition that feeds the coordinator's grace-period/eviction logic.

use crate::convert;
use chunknet_common::{NodeId, NodeStatus};
use chunknet_coordinator::{NodeClient, NodeClientError, NodeRecord};
use chunknet_proto::node::node_service_client::NodeServiceClient;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio::time::Duration;
use tonic::transport::Channel;

/// A gRPC-based node transport with per-node channel pooling.
#[derive(Debug)]
pub struct GrpcNodeClient {
    channels: Arc<RwLock<HashMap<NodeId, Channel>>>,
    rpc_timeout: Duration,
}

impl GrpcNodeClient {
    pub fn new(rpc_timeout: Duration) -> Self {
        Self {
            channels: Arc::new(RwLock::new(HashMap::new())),
            rpc_timeout,
        }
    }

    async fn get_channel(&self, target: &NodeRecord) -> Result<Channel, NodeClientError> {
        // Check cache first
        {
            let cache = self.channels.read().await;
            if let Some(channel) = cache.get(&target.node_id) {
                return Ok(channel.clone());
            }
        }

        // Create new connection
        let channel = Channel::from_shared(target.endpoint())
            .map_err(|e| NodeClientError::Rpc(format!("invalid endpoint: {}", e)))?
            .connect_timeout(self.rpc_timeout)
            .connect()
            .await
            .map_err(|e| NodeClientError::Unavailable(format!("connect failed: {}", e)))?;

        // Cache it
        {
            let mut cache = self.channels.write().await;
            cache.insert(target.node_id.clone(), channel.clone());
        }

        Ok(channel)
    }

    /// Remove a cached channel (on connection failure or unregister).
    async fn invalidate(&self, node_id: &NodeId) {
        let mut cache = self.channels.write().await;
        cache.remove(node_id);
    }

    /// Classify a tonic status: `Unavailable` is the eviction trigger,
    /// everything else is an ordinary RPC failure.
    fn classify(status: tonic::Status) -> NodeClientError {
        if status.code() == tonic::Code::Unavailable {
            NodeClientError::Unavailable(status.message().to_string())
        } else {
            NodeClientError::Rpc(status.to_string())
        }
    }

    async fn with_timeout<T>(
        &self,
        fut: impl std::future::Future<Output = Result<T, tonic::Status>>,
    ) -> Result<T, NodeClientError> {
        match tokio::time::timeout(self.rpc_timeout, fut).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(status)) => Err(Self::classify(status)),
            Err(_) => Err(NodeClientError::Timeout(self.rpc_timeout)),
        }
    }
}

#[async_trait::async_trait]
impl NodeClient for GrpcNodeClient {
    async fn store_chunk(
        &self,
        target: &NodeRecord,
        chunk_id: &str,
        data: Vec<u8>,
    ) -> Result<(), NodeClientError> {
        let m = chunknet_metrics::metrics();
        m.rpcs_sent.inc();
        m.rpcs_sent_by_type.with_label_values(&["store_chunk"]).inc();
        let _timer = chunknet_metrics::start_rpc_timer("store_chunk", "outbound");

        let channel = self.get_channel(target).await?;
        let mut client = NodeServiceClient::new(channel);

        let response = self
            .with_timeout(async {
                client
                    .store_chunk(chunknet_proto::node::StoreChunkRequest {
                        chunk_id: chunk_id.to_string(),
                        data,
                    })
                    .await
                    .map(tonic::Response::into_inner)
            })
            .await;

        match response {
            Ok(inner) if inner.success => Ok(()),
            Ok(inner) => Err(NodeClientError::Rejected(inner.message)),
            Err(e) => {
                if matches!(e, NodeClientError::Unavailable(_)) {
                    self.invalidate(&target.node_id).await;
                }
                Err(e)
            }
        }
    }

    async fn retrieve_chunk(
        &self,
        target: &NodeRecord,
        chunk_id: &str,
    ) -> Result<Vec<u8>, NodeClientError> {
        let m = chunknet_metrics::metrics();
        m.rpcs_sent.inc();
        m.rpcs_sent_by_type
            .with_label_values(&["retrieve_chunk"])
            .inc();
        let _timer = chunknet_metrics::start_rpc_timer("retrieve_chunk", "outbound");

        let channel = self.get_channel(target).await?;
        let mut client = NodeServiceClient::new(channel);

        let response = self
            .with_timeout(async {
                client
                    .retrieve_chunk(chunknet_proto::node::RetrieveChunkRequest {
                        chunk_id: chunk_id.to_string(),
                    })
                    .await
                    .map(tonic::Response::into_inner)
            })
            .await;

        match response {
            Ok(inner) if inner.success => Ok(inner.data),
            Ok(_) => Err(NodeClientError::NotFound(chunk_id.to_string())),
            Err(e) => {
                if matches!(e, NodeClientError::Unavailable(_)) {
                    self.invalidate(&target.node_id).await;
                }
                Err(e)
            }
        }
    }

    async fn get_status(&self, target: &NodeRecord) -> Result<NodeStatus, NodeClientError> {
        let m = chunknet_metrics::metrics();
        m.rpcs_sent.inc();
        m.rpcs_sent_by_type.with_label_values(&["get_status"]).inc();
        let _timer = chunknet_metrics::start_rpc_timer("get_status", "outbound");

        let channel = self.get_channel(target).await?;
        let mut client = NodeServiceClient::new(channel);

        let response = self
            .with_timeout(async {
                client
                    .get_status(chunknet_proto::node::StatusRequest {})
                    .await
                    .map(tonic::Response::into_inner)
            })
            .await;

        match response {
            Ok(inner) => {
                let status = inner
                    .status
                    .ok_or_else(|| NodeClientError::Rpc("missing status payload".into()))?;
                Ok(convert::node_status_from_proto(&status))
            }
            Err(e) => {
                if matches!(e, NodeClientError::Unavailable(_)) {
                    self.invalidate(&target.node_id).await;
                }
                Err(e)
            }
        }
    }

    async fn disconnect(&self, node_id: &NodeId) {
        self.invalidate(node_id).await;
    }
}
