//! gRPC service implementation for one storage node.
//!
//! Bridges the tonic-generated `NodeService` trait to the domain logic in
//! `chunknet-runtime`.

use crate::convert;
use chunknet_disk::DiskError;
use chunknet_runtime::{RuntimeError, StorageNodeRuntime};
use std::sync::Arc;

/// gRPC surface of one storage node.
#[derive(Debug)]
pub struct NodeServiceImpl {
    pub runtime: Arc<StorageNodeRuntime>,
}

#[tonic::async_trait]
impl chunknet_proto::node::node_service_server::NodeService for NodeServiceImpl {
    async fn store_chunk(
        &self,
        request: tonic::Request<chunknet_proto::node::StoreChunkRequest>,
    ) -> Result<tonic::Response<chunknet_proto::node::StoreChunkResponse>, tonic::Status> {
        let m = chunknet_metrics::metrics();
        m.rpcs_received.inc();
        m.rpcs_received_by_type
            .with_label_values(&["store_chunk"])
            .inc();
        let _timer = chunknet_metrics::start_rpc_timer("store_chunk", "inbound");
        let req = request.into_inner();

        if req.chunk_id.is_empty() {
            return Err(tonic::Status::invalid_argument("missing chunk_id"));
        }

        // Capacity and mount problems are negative results on the wire,
        // not transport errors.
        match self.runtime.store_chunk(&req.chunk_id, req.data).await {
            Ok(pid) => {
                m.chunks_stored.inc();
                Ok(tonic::Response::new(
                    chunknet_proto::node::StoreChunkResponse {
                        success: true,
                        message: format!("chunk accepted (pid {})", pid),
                    },
                ))
            }
            Err(RuntimeError::Disk(e @ DiskError::InsufficientSpace { .. }))
            | Err(RuntimeError::Disk(e @ DiskError::NotMounted(_))) => Ok(tonic::Response::new(
                chunknet_proto::node::StoreChunkResponse {
                    success: false,
                    message: e.to_string(),
                },
            )),
            Err(e) => Err(tonic::Status::internal(e.to_string())),
        }
    }

    async fn retrieve_chunk(
        &self,
        request: tonic::Request<chunknet_proto::node::RetrieveChunkRequest>,
    ) -> Result<tonic::Response<chunknet_proto::node::RetrieveChunkResponse>, tonic::Status> {
        let m = chunknet_metrics::metrics();
        m.rpcs_received.inc();
        m.rpcs_received_by_type
            .with_label_values(&["retrieve_chunk"])
            .inc();
        let _timer = chunknet_metrics::start_rpc_timer("retrieve_chunk", "inbound");
        let req = request.into_inner();

        match self.runtime.retrieve_chunk(&req.chunk_id).await {
            Ok(data) => {
                m.chunks_retrieved.inc();
                Ok(tonic::Response::new(
                    chunknet_proto::node::RetrieveChunkResponse {
                        success: true,
                        data,
                    },
                ))
            }
            Err(RuntimeError::Disk(DiskError::NotFound(_))) => Ok(tonic::Response::new(
                chunknet_proto::node::RetrieveChunkResponse {
                    success: false,
                    data: Vec::new(),
                },
            )),
            Err(e) => Err(tonic::Status::internal(e.to_string())),
        }
    }

    async fn get_status(
        &self,
        _request: tonic::Request<chunknet_proto::node::StatusRequest>,
    ) -> Result<tonic::Response<chunknet_proto::node::StatusResponse>, tonic::Status> {
        let m = chunknet_metrics::metrics();
        m.rpcs_received.inc();
        m.rpcs_received_by_type
            .with_label_values(&["get_status"])
            .inc();
        let _timer = chunknet_metrics::start_rpc_timer("get_status", "inbound");

        let status = self.runtime.node_status().await;
        Ok(tonic::Response::new(
            chunknet_proto::node::StatusResponse {
                status: Some(convert::node_status_to_proto(&status)),
            },
        ))
    }
}
