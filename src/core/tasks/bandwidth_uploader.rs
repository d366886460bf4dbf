// src/core/tasks/bandwidth_uploader.rs

//! A background task that drives the bandwidth aggregator's upload tick.

use crate::core::rpc::RpcClient;
use crate::core::stats::BandwidthStatManager;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{error, info};

/// The upload cadence. Cells cover 5 minutes; ticking faster uploads a
/// finished cell soon after its slot closes.
const UPLOAD_INTERVAL: Duration = Duration::from_secs(60);

pub struct BandwidthUploaderTask {
    manager: Arc<BandwidthStatManager>,
    rpc: Arc<dyn RpcClient>,
    region_id: i64,
}

impl BandwidthUploaderTask {
    pub fn new(manager: Arc<BandwidthStatManager>, rpc: Arc<dyn RpcClient>, region_id: i64) -> Self {
        Self {
            manager,
            rpc,
            region_id,
        }
    }

    pub async fn run(self, mut shutdown_rx: broadcast::Receiver<()>) {
        info!("Bandwidth uploader task started.");
        let mut interval = tokio::time::interval(UPLOAD_INTERVAL);
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    if let Err(e) = self.manager.upload(self.rpc.as_ref(), self.region_id).await {
                        // The control plane being briefly unreachable is
                        // routine; the batch is retained for the next tick.
                        if !e.is_conn_error() {
                            error!("bandwidth stat upload failed: {e}");
                        }
                    }
                }
                _ = shutdown_rx.recv() => {
                    info!("Bandwidth uploader task shutting down.");
                    return;
                }
            }
        }
    }
}
