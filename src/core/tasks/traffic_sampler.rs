// src/core/tasks/traffic_sampler.rs

//! A background task that folds the connection traffic counters into the
//! monitor value queue once a minute.

use crate::connection::{IN_TRAFFIC_BYTES, OUT_TRAFFIC_BYTES};
use crate::core::monitor::{NodeValueItem, SHARED_VALUE_QUEUE, ValueQueue};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::info;

const SAMPLE_INTERVAL: Duration = Duration::from_secs(60);

pub struct TrafficSamplerTask;

impl TrafficSamplerTask {
    pub fn new() -> Self {
        Self
    }

    pub async fn run(self, mut shutdown_rx: broadcast::Receiver<()>) {
        info!("Traffic sampler task started.");
        let mut interval = tokio::time::interval(SAMPLE_INTERVAL);
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    sample(&IN_TRAFFIC_BYTES, &OUT_TRAFFIC_BYTES, &SHARED_VALUE_QUEUE);
                }
                _ = shutdown_rx.recv() => {
                    info!("Traffic sampler task shutting down.");
                    return;
                }
            }
        }
    }
}

impl Default for TrafficSamplerTask {
    fn default() -> Self {
        Self::new()
    }
}

/// Takes one sample of both counters. The snapshot-and-reset is a single
/// atomic exchange per counter, so bytes counted concurrently land in the
/// next sample instead of vanishing. Zero samples are not emitted.
pub fn sample(in_counter: &AtomicU64, out_counter: &AtomicU64, queue: &ValueQueue) {
    let in_bytes = in_counter.swap(0, Ordering::Relaxed);
    if in_bytes > 0 {
        queue.add(NodeValueItem::traffic_in(in_bytes));
    }
    let out_bytes = out_counter.swap(0, Ordering::Relaxed);
    if out_bytes > 0 {
        queue.add(NodeValueItem::traffic_out(out_bytes));
    }
}
