//! gRPC networking layer for chunknet.
//!
//! Provides:
//! - `NodeServiceImpl`: bridges the node proto to `StorageNodeRuntime`
//! - `GrpcNodeClient`: implements the coordinator's `NodeClient` over tonic
//! - `build_server`: assembles the node services into a tonic `Router`

pub mod client;
pub mod convert;
pub mod server;

pub use client::GrpcNodeClient;
pub use server::NodeServiceImpl;

use chunknet_proto::node::node_service_server::NodeServiceServer;
use chunknet_runtime::StorageNodeRuntime;
use std::sync::Arc;

/// Build a tonic `Router` serving the node-facing RPCs for `runtime`.
pub fn build_server(runtime: Arc<StorageNodeRuntime>) -> tonic::transport::server::Router {
    let node_svc = NodeServiceImpl { runtime };
    tonic::transport::Server::builder().add_service(NodeServiceServer::new(node_svc))
}
