//! The composed storage node runtime.

use crate::iface::{AddressPool, NetworkIdentity};
use crate::spec::NodeSpec;
use crate::RuntimeError;
use chunknet_common::{format_bytes, NodeId, NodeStatus};
use chunknet_disk::{DiskError, DiskStats, VirtualDisk};
use chunknet_lifecycle::{LifecycleInfo, LifecycleManager};
use chunknet_sched::{ProcessInfo, Scheduler};
use futures::FutureExt;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Composite snapshot of one node: lifecycle, disk, processes and the
/// declared hardware capacities.
#[derive(Debug, Clone)]
pub struct RuntimeStatus {
    pub node_id: NodeId,
    pub identity: NetworkIdentity,
    pub port: u16,
    pub lifecycle: LifecycleInfo,
    pub disk: DiskStats,
    pub processes: Vec<ProcessInfo>,
    pub ram_bytes: u64,
    pub cpu_cores: usize,
    pub bandwidth_mbps: u64,
}

/// One addressable storage unit: network identity + virtual disk +
/// lifecycle manager + process scheduler.
pub struct StorageNodeRuntime {
    spec: NodeSpec,
    node_id: NodeId,
    identity: NetworkIdentity,
    pool: Arc<AddressPool>,
    disk: Arc<RwLock<VirtualDisk>>,
    lifecycle: Arc<LifecycleManager>,
    scheduler: Arc<Scheduler>,
}

impl std::fmt::Debug for StorageNodeRuntime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StorageNodeRuntime")
            .field("node_id", &self.node_id)
            .field("identity", &self.identity)
            .finish_non_exhaustive()
    }
}

impl StorageNodeRuntime {
    /// Bring a node up: acquire identity, prepare the disk, activate the
    /// lifecycle, start the scheduler, in that order. On any failure every
    /// resource acquired so far is released before the error returns.
    pub async fn start(spec: NodeSpec, pool: Arc<AddressPool>) -> Result<Self, RuntimeError> {
        spec.validate()?;
        let node_id = NodeId::new(spec.node_id.clone());

        tracing::info!(
            "starting node {} (storage {}, {} cores)",
            node_id,
            format_bytes(spec.storage_bytes()),
            spec.cpu_cores
        );

        // 1. Network identity.
        let identity = pool.allocate(&node_id)?;

        // 2. Virtual disk: create, format unless already formatted, mount.
        let disk = match Self::prepare_disk(&spec) {
            Ok(disk) => disk,
            Err(e) => {
                pool.release(&node_id);
                return Err(e.into());
            }
        };

        // 3. Lifecycle manager.
        let lifecycle = match LifecycleManager::new(node_id.clone(), spec.heartbeat) {
            Ok(m) => Arc::new(m),
            Err(e) => {
                pool.release(&node_id);
                return Err(e.into());
            }
        };
        if let Err(e) = lifecycle.activate() {
            pool.release(&node_id);
            return Err(e.into());
        }

        // 4. Process scheduler.
        let scheduler = Arc::new(Scheduler::new(node_id.clone(), spec.scheduler_workers));

        tracing::info!("node {} started at {}", node_id, identity.ip);

        Ok(Self {
            spec,
            node_id,
            identity,
            pool,
            disk: Arc::new(RwLock::new(disk)),
            lifecycle,
            scheduler,
        })
    }

    fn prepare_disk(spec: &NodeSpec) -> Result<VirtualDisk, DiskError> {
        let disk_id = format!("{}-disk", spec.node_id);
        let mut disk = VirtualDisk::create(&disk_id, spec.storage_bytes(), &spec.data_dir)?;
        if !disk.is_formatted() {
            disk.format()?;
        }
        disk.mount()?;
        Ok(disk)
    }

    /// Accept a chunk for storage. The capacity precheck happens here; the
    /// durable write itself runs as a scheduled process so a large transfer
    /// never blocks the RPC dispatch path. The returned pid acknowledges
    /// submission; completion is observed through `status()` polls.
    pub async fn store_chunk(&self, chunk_id: &str, data: Vec<u8>) -> Result<u64, RuntimeError> {
        self.lifecycle.record_heartbeat();

        let stats = self.disk.read().await.stats();
        if !stats.mounted {
            return Err(DiskError::NotMounted(stats.disk_id).into());
        }
        // Conservative for overwrites: an existing entry's bytes are not
        // credited back until the scheduled write actually lands.
        let needed = data.len() as u64;
        let available = stats.total_size_bytes - stats.used_bytes;
        if needed > available {
            tracing::warn!(
                "node {} rejecting chunk {}: need {}, {} available",
                self.node_id,
                chunk_id,
                format_bytes(needed),
                format_bytes(available)
            );
            return Err(DiskError::InsufficientSpace {
                requested: needed,
                available,
            }
            .into());
        }

        let disk = self.disk.clone();
        let name = chunk_id.to_string();
        let size = data.len();
        let pid = self.scheduler.submit(
            format!("store-chunk-{}", chunk_id),
            5,
            async move {
                disk.write()
                    .await
                    .write(&name, &data)
                    .map_err(|e| Box::new(e) as chunknet_sched::TaskError)
            }
            .boxed(),
        )?;

        tracing::info!(
            "node {} accepted chunk {} ({}) as pid {}",
            self.node_id,
            chunk_id,
            format_bytes(size as u64),
            pid
        );
        Ok(pid)
    }

    /// Read a chunk synchronously from the disk.
    pub async fn retrieve_chunk(&self, chunk_id: &str) -> Result<Vec<u8>, RuntimeError> {
        self.lifecycle.record_heartbeat();
        let data = self.disk.read().await.read(chunk_id)?;
        Ok(data)
    }

    /// Remove a chunk from the disk.
    pub async fn delete_chunk(&self, chunk_id: &str) -> Result<(), RuntimeError> {
        self.disk.write().await.delete(chunk_id)?;
        Ok(())
    }

    /// Names of all chunks on the disk.
    pub async fn list_chunks(&self) -> Result<Vec<String>, RuntimeError> {
        let names = self.disk.read().await.list()?;
        Ok(names)
    }

    /// Composite runtime snapshot.
    pub async fn status(&self) -> RuntimeStatus {
        let disk = self.disk.read().await.stats();
        RuntimeStatus {
            node_id: self.node_id.clone(),
            identity: self.identity.clone(),
            port: self.spec.port,
            lifecycle: self.lifecycle.info(),
            disk,
            processes: self.scheduler.processes(),
            ram_bytes: self.spec.ram_bytes(),
            cpu_cores: self.spec.cpu_cores,
            bandwidth_mbps: self.spec.bandwidth_mbps,
        }
    }

    /// Flat wire-format status projection.
    pub async fn node_status(&self) -> NodeStatus {
        let disk = self.disk.read().await.stats();
        NodeStatus::new(
            self.node_id.clone(),
            disk.used_bytes,
            disk.total_size_bytes,
            disk.file_count as u64,
        )
    }

    /// Bring the node down, releasing resources in reverse acquisition
    /// order: lifecycle stop → scheduler drain → disk unmount → identity
    /// release.
    pub async fn stop(&self) {
        tracing::info!("stopping node {}", self.node_id);

        if let Err(e) = self.lifecycle.stop() {
            tracing::warn!("lifecycle stop for {}: {}", self.node_id, e);
        }
        self.scheduler.shutdown(self.spec.shutdown_timeout).await;
        self.disk.write().await.unmount();
        self.pool.release(&self.node_id);

        tracing::info!("node {} stopped", self.node_id);
    }

    pub fn node_id(&self) -> &NodeId {
        &self.node_id
    }

    pub fn identity(&self) -> &NetworkIdentity {
        &self.identity
    }

    pub fn lifecycle(&self) -> &LifecycleManager {
        &self.lifecycle
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chunknet_lifecycle::NodeState;
    use chunknet_sched::ProcessState;
    use tempfile::TempDir;
    use tokio::time::{sleep, Duration};

    fn spec_in(dir: &TempDir, node_id: &str) -> NodeSpec {
        NodeSpec {
            node_id: node_id.to_string(),
            port: 7000,
            data_dir: dir.path().to_path_buf(),
            storage_gb: 1,
            scheduler_workers: 2,
            shutdown_timeout: Duration::from_secs(5),
            ..NodeSpec::default()
        }
    }

    async fn wait_for_chunk(rt: &StorageNodeRuntime, chunk_id: &str) -> Vec<u8> {
        for _ in 0..200 {
            if let Ok(data) = rt.retrieve_chunk(chunk_id).await {
                return data;
            }
            sleep(Duration::from_millis(5)).await;
        }
        panic!("chunk {} never became readable", chunk_id);
    }

    #[tokio::test]
    async fn test_start_acquires_identity_and_mounts() {
        let dir = TempDir::new().unwrap();
        let pool = Arc::new(AddressPool::new());
        let rt = StorageNodeRuntime::start(spec_in(&dir, "n1"), pool.clone())
            .await
            .unwrap();

        assert_eq!(pool.assigned_count(), 1);
        let status = rt.status().await;
        assert!(status.disk.mounted);
        assert_eq!(status.node_id, NodeId::from("n1"));
        assert_eq!(status.cpu_cores, 4);

        rt.stop().await;
        assert_eq!(pool.assigned_count(), 0, "stop must release the identity");
    }

    #[tokio::test]
    async fn test_invalid_spec_leaves_pool_untouched() {
        let pool = Arc::new(AddressPool::new());
        let err = StorageNodeRuntime::start(NodeSpec::default(), pool.clone())
            .await
            .unwrap_err();
        assert!(matches!(err, RuntimeError::InvalidSpec(_)));
        assert_eq!(pool.assigned_count(), 0);
    }

    #[tokio::test]
    async fn test_disk_failure_rolls_back_identity() {
        let dir = TempDir::new().unwrap();
        let pool = Arc::new(AddressPool::new());

        // Pre-create the disk with a different capacity so reopening fails.
        VirtualDisk::create("n1-disk", 1024 * 1024, dir.path()).unwrap();

        let err = StorageNodeRuntime::start(spec_in(&dir, "n1"), pool.clone())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            RuntimeError::Disk(DiskError::CapacityMismatch { .. })
        ));
        assert_eq!(
            pool.assigned_count(),
            0,
            "failed start must not retain the identity"
        );
    }

    #[tokio::test]
    async fn test_store_then_retrieve_roundtrip() {
        let dir = TempDir::new().unwrap();
        let pool = Arc::new(AddressPool::new());
        let rt = StorageNodeRuntime::start(spec_in(&dir, "n1"), pool)
            .await
            .unwrap();

        let payload = b"the quick brown fox".to_vec();
        let pid = rt.store_chunk("f_chunk_0", payload.clone()).await.unwrap();

        let data = wait_for_chunk(&rt, "f_chunk_0").await;
        assert_eq!(data, payload);

        // The write ran as a tracked process.
        for _ in 0..200 {
            if rt.scheduler().process_info(pid).map(|i| i.state)
                == Some(ProcessState::Terminated)
            {
                break;
            }
            sleep(Duration::from_millis(5)).await;
        }
        let info = rt.scheduler().process_info(pid).unwrap();
        assert_eq!(info.state, ProcessState::Terminated);
        assert!(info.failure.is_none());

        let status = rt.node_status().await;
        assert_eq!(status.used_bytes, payload.len() as u64);
        assert_eq!(status.chunk_count, 1);

        rt.stop().await;
    }

    #[tokio::test]
    async fn test_retrieve_missing_chunk() {
        let dir = TempDir::new().unwrap();
        let pool = Arc::new(AddressPool::new());
        let rt = StorageNodeRuntime::start(spec_in(&dir, "n1"), pool)
            .await
            .unwrap();

        let err = rt.retrieve_chunk("ghost").await.unwrap_err();
        assert!(matches!(err, RuntimeError::Disk(DiskError::NotFound(_))));
        rt.stop().await;
    }

    #[tokio::test]
    async fn test_delete_chunk() {
        let dir = TempDir::new().unwrap();
        let pool = Arc::new(AddressPool::new());
        let rt = StorageNodeRuntime::start(spec_in(&dir, "n1"), pool)
            .await
            .unwrap();

        rt.store_chunk("gone_chunk_0", vec![7u8; 64]).await.unwrap();
        wait_for_chunk(&rt, "gone_chunk_0").await;

        rt.delete_chunk("gone_chunk_0").await.unwrap();
        assert!(rt.retrieve_chunk("gone_chunk_0").await.is_err());
        assert_eq!(rt.node_status().await.used_bytes, 0);
        rt.stop().await;
    }

    #[tokio::test]
    async fn test_stop_reaches_stopped_state() {
        let dir = TempDir::new().unwrap();
        let pool = Arc::new(AddressPool::new());
        let rt = StorageNodeRuntime::start(spec_in(&dir, "n1"), pool)
            .await
            .unwrap();

        rt.stop().await;
        assert_eq!(rt.lifecycle().state(), NodeState::Stopped);
        assert!(!rt.status().await.disk.mounted);
    }

    #[tokio::test]
    async fn test_restart_sees_persisted_chunks() {
        let dir = TempDir::new().unwrap();
        let pool = Arc::new(AddressPool::new());

        {
            let rt = StorageNodeRuntime::start(spec_in(&dir, "n1"), pool.clone())
                .await
                .unwrap();
            rt.store_chunk("keep_chunk_0", b"survives".to_vec())
                .await
                .unwrap();
            wait_for_chunk(&rt, "keep_chunk_0").await;
            rt.stop().await;
        }

        let rt = StorageNodeRuntime::start(spec_in(&dir, "n1"), pool)
            .await
            .unwrap();
        let data = rt.retrieve_chunk("keep_chunk_0").await.unwrap();
        assert_eq!(data, b"survives");
        rt.stop().await;
    }
}
