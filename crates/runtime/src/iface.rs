//! Virtual network identity allocation.
//!
//! An `AddressPool` hands out addresses from a fixed virtual subnet with
//! atomic allocate/release semantics. It is an explicit value owned by
//! whoever constructs the nodes (a coordinator, a test harness), passed by
//! reference rather than held as process-global state.

use chunknet_common::NodeId;
use std::collections::HashMap;
use std::net::Ipv4Addr;
use std::sync::Mutex;

/// Errors surfaced by identity allocation.
#[derive(Debug, thiserror::Error)]
pub enum PoolError {
    #[error("address pool exhausted (subnet {subnet})")]
    Exhausted { subnet: String },
}

/// A virtual network interface assigned to one node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkIdentity {
    pub node_id: NodeId,
    pub ip: Ipv4Addr,
    pub interface: String,
    pub mac: String,
}

/// Fixed pool of addresses in 192.168.100.10–254.
///
/// Released addresses return to a free list and are handed out again before
/// the high-water mark advances.
#[derive(Debug)]
pub struct AddressPool {
    inner: Mutex<PoolInner>,
}

#[derive(Debug)]
struct PoolInner {
    next_suffix: u16,
    free: Vec<u8>,
    assigned: HashMap<NodeId, NetworkIdentity>,
}

const SUBNET_PREFIX: [u8; 3] = [192, 168, 100];
const SUBNET_START: u16 = 10;
const SUBNET_END: u16 = 254;

impl AddressPool {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(PoolInner {
                next_suffix: SUBNET_START,
                free: Vec::new(),
                assigned: HashMap::new(),
            }),
        }
    }

    /// Allocate an identity for `node_id`. A node that already holds one
    /// gets the same identity back.
    pub fn allocate(&self, node_id: &NodeId) -> Result<NetworkIdentity, PoolError> {
        let mut inner = self.inner.lock().expect("address pool poisoned");

        if let Some(existing) = inner.assigned.get(node_id) {
            tracing::warn!("node {} already holds {}", node_id, existing.ip);
            return Ok(existing.clone());
        }

        let suffix = match inner.free.pop() {
            Some(s) => s,
            None => {
                if inner.next_suffix > SUBNET_END {
                    return Err(PoolError::Exhausted {
                        subnet: format!(
                            "{}.{}.{}.0/24",
                            SUBNET_PREFIX[0], SUBNET_PREFIX[1], SUBNET_PREFIX[2]
                        ),
                    });
                }
                let s = inner.next_suffix as u8;
                inner.next_suffix += 1;
                s
            }
        };

        let identity = NetworkIdentity {
            node_id: node_id.clone(),
            ip: Ipv4Addr::new(SUBNET_PREFIX[0], SUBNET_PREFIX[1], SUBNET_PREFIX[2], suffix),
            interface: "virtual-eth0".to_string(),
            mac: format!("02:00:00:00:00:{:02X}", suffix),
        };
        inner.assigned.insert(node_id.clone(), identity.clone());

        tracing::info!("assigned {} to node {}", identity.ip, node_id);
        Ok(identity)
    }

    /// Release the identity held by `node_id`. Idempotent.
    pub fn release(&self, node_id: &NodeId) -> bool {
        let mut inner = self.inner.lock().expect("address pool poisoned");
        match inner.assigned.remove(node_id) {
            Some(identity) => {
                inner.free.push(identity.ip.octets()[3]);
                tracing::info!("released {} from node {}", identity.ip, node_id);
                true
            }
            None => false,
        }
    }

    /// Identity currently held by `node_id`, if any.
    pub fn identity(&self, node_id: &NodeId) -> Option<NetworkIdentity> {
        self.inner
            .lock()
            .expect("address pool poisoned")
            .assigned
            .get(node_id)
            .cloned()
    }

    pub fn assigned_count(&self) -> usize {
        self.inner
            .lock()
            .expect("address pool poisoned")
            .assigned
            .len()
    }
}

impl Default for AddressPool {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allocate_and_release() {
        let pool = AddressPool::new();
        let id = NodeId::from("n1");

        let identity = pool.allocate(&id).unwrap();
        assert_eq!(identity.ip, Ipv4Addr::new(192, 168, 100, 10));
        assert_eq!(identity.mac, "02:00:00:00:00:0A");
        assert_eq!(pool.assigned_count(), 1);

        assert!(pool.release(&id));
        assert!(!pool.release(&id));
        assert_eq!(pool.assigned_count(), 0);
    }

    #[test]
    fn test_allocate_is_idempotent_per_node() {
        let pool = AddressPool::new();
        let id = NodeId::from("n1");
        let a = pool.allocate(&id).unwrap();
        let b = pool.allocate(&id).unwrap();
        assert_eq!(a, b);
        assert_eq!(pool.assigned_count(), 1);
    }

    #[test]
    fn test_released_addresses_are_reused() {
        let pool = AddressPool::new();
        let first = pool.allocate(&NodeId::from("n1")).unwrap();
        pool.release(&NodeId::from("n1"));

        let second = pool.allocate(&NodeId::from("n2")).unwrap();
        assert_eq!(first.ip, second.ip);
    }

    #[test]
    fn test_pool_exhaustion() {
        let pool = AddressPool::new();
        for i in 0..(SUBNET_END - SUBNET_START + 1) {
            pool.allocate(&NodeId::from(format!("n{}", i).as_str()))
                .unwrap();
        }
        let err = pool.allocate(&NodeId::from("overflow")).unwrap_err();
        assert!(matches!(err, PoolError::Exhausted { .. }));
    }
}
