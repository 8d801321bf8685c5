//! Generated gRPC code for chunknet protobuf definitions.

/// Common types (NodeStatus).
pub mod common {
    tonic::include_proto!("chunknet.common");
}

/// Node storage service (StoreChunk, RetrieveChunk, GetStatus).
pub mod node {
    tonic::include_proto!("chunknet.node");
}
