//! Conversions between proto and domain types.

use chunknet_common::{NodeId, NodeStatus};

pub fn node_status_to_proto(status: &NodeStatus) -> chunknet_proto::common::NodeStatus {
    chunknet_proto::common::NodeStatus {
        node_id: status.node_id.to_string(),
        used_bytes: status.used_bytes,
        total_bytes: status.total_bytes,
        chunk_count: status.chunk_count,
        utilization_percent: status.utilization_percent,
    }
}

pub fn node_status_from_proto(proto: &chunknet_proto::common::NodeStatus) -> NodeStatus {
    NodeStatus {
        node_id: NodeId::new(proto.node_id.clone()),
        used_bytes: proto.used_bytes,
        total_bytes: proto.total_bytes,
        chunk_count: proto.chunk_count,
        utilization_percent: proto.utilization_percent,
    }
}
