//! chunknet-node: entry point for a storage node daemon.
//!
//! Loads config, brings up the node runtime (network identity, virtual
//! disk, lifecycle, scheduler), then serves the node gRPC surface on the
//! configured listen address until Ctrl+C.

use chunknet_lifecycle::HeartbeatConfig;
use chunknet_runtime::{AddressPool, NodeSpec, StorageNodeRuntime};
use std::sync::Arc;
use tokio::time::Duration;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    chunknet_metrics::init_tracing();

    // Load config: first CLI arg is the YAML config path
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "config.yaml".to_string());

    let config =
        chunknet_config::load_from_file(std::path::Path::new(&config_path)).unwrap_or_else(|e| {
            tracing::warn!(
                "failed to load config from {}: {}, using defaults",
                config_path,
                e
            );
            chunknet_config::load_from_str("node_id: \"node1\"\nlisten: \"127.0.0.1:7000\"\n")
                .expect("hardcoded default config must parse")
        });

    let spec = NodeSpec {
        node_id: config.node_id.clone(),
        port: config.listen.port(),
        data_dir: config.disk.data_dir.clone(),
        storage_gb: config.capacity.storage_gb,
        ram_gb: config.capacity.ram_gb,
        cpu_cores: config.capacity.cpu_cores,
        bandwidth_mbps: config.capacity.bandwidth_mbps,
        heartbeat: HeartbeatConfig {
            interval: Duration::from_millis(config.lifecycle.heartbeat_interval_ms),
            dead_threshold: Duration::from_millis(config.lifecycle.dead_threshold_ms),
        },
        scheduler_workers: config.scheduler_workers(),
        shutdown_timeout: Duration::from_secs(config.scheduler.shutdown_timeout_secs),
    };

    // Each daemon owns its identity pool; the coordinator sees the node
    // only through its listen address.
    let pool = Arc::new(AddressPool::new());
    let runtime = Arc::new(StorageNodeRuntime::start(spec, pool).await?);
    tracing::info!(
        "node {} listening on {}",
        config.node_id,
        config.listen
    );

    // Spawn metrics HTTP server if configured
    if let Some(metrics_port) = config.metrics_port {
        let metrics_addr: std::net::SocketAddr = format!("0.0.0.0:{}", metrics_port)
            .parse()
            .expect("valid metrics address");
        tokio::spawn(async move {
            if let Err(e) = chunknet_metrics::serve_metrics(metrics_addr).await {
                tracing::warn!("metrics server failed: {}", e);
            }
        });
    }

    // Build gRPC server
    let router = chunknet_net::build_server(runtime.clone());

    // Serve with graceful shutdown on Ctrl+C
    tracing::info!("serving gRPC on {}", config.listen);
    tokio::select! {
        result = router.serve(config.listen) => {
            result?;
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("received Ctrl+C, shutting down");
        }
    }

    runtime.stop().await;
    Ok(())
}
