// src/core/tasks/purge_queue.rs

//! The cross-node purge queue. Local purges enqueue `(domain, key)` jobs;
//! a small worker pool forwards them to the control plane, coalescing
//! duplicates within a short window so a purge storm against one resource
//! does not become an RPC storm.

use crate::core::rpc::{PurgeServerCacheRequest, RpcClient};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, error, info};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PurgeJob {
    pub domain: String,
    pub key: String,
}

pub struct CrossNodePurger {
    tx: mpsc::Sender<PurgeJob>,
}

impl CrossNodePurger {
    /// Starts the worker pool and returns the enqueue handle.
    pub fn start(
        rpc: Arc<dyn RpcClient>,
        workers: usize,
        queue_size: usize,
        coalesce_window: Duration,
        shutdown: &broadcast::Sender<()>,
    ) -> Arc<Self> {
        let (tx, rx) = mpsc::channel::<PurgeJob>(queue_size.max(1));
        let rx = Arc::new(tokio::sync::Mutex::new(rx));
        let recent: Arc<Mutex<HashMap<PurgeJob, Instant>>> = Arc::new(Mutex::new(HashMap::new()));

        for _ in 0..workers.max(1) {
            let rx = rx.clone();
            let rpc = rpc.clone();
            let recent = recent.clone();
            let mut shutdown_rx = shutdown.subscribe();
            tokio::spawn(async move {
                loop {
                    let job = tokio::select! {
                        job = async { rx.lock().await.recv().await } => job,
                        _ = shutdown_rx.recv() => {
                            info!("Cross-node purge worker shutting down.");
                            return;
                        }
                    };
                    let Some(job) = job else {
                        return;
                    };
                    if !claim(&recent, &job, coalesce_window) {
                        continue;
                    }
                    let request = PurgeServerCacheRequest {
                        domains: vec![job.domain.clone()],
                        keys: vec![job.key.clone()],
                        prefixes: Vec::new(),
                    };
                    if let Err(e) = rpc.purge_server_cache(request).await {
                        error!("purge failed: {e}");
                    }
                }
            });
        }

        Arc::new(Self { tx })
    }

    /// Enqueues a cross-node purge. Never blocks the request path: when the
    /// queue is full the job is dropped, and peers converge through normal
    /// expiry instead.
    pub fn enqueue(&self, domain: String, key: String) {
        if self.tx.try_send(PurgeJob { domain, key }).is_err() {
            debug!("cross-node purge queue full, dropping job");
        }
    }
}

/// Whether the job should be forwarded, registering it as seen. Duplicates
/// inside the window are skipped.
fn claim(
    recent: &Mutex<HashMap<PurgeJob, Instant>>,
    job: &PurgeJob,
    window: Duration,
) -> bool {
    let now = Instant::now();
    let mut recent = recent.lock();
    recent.retain(|_, seen| now.duration_since(*seen) < window);
    match recent.get(job) {
        Some(_) => false,
        None => {
            recent.insert(job.clone(), now);
            true
        }
    }
}
