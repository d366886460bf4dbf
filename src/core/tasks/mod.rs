// src/core/tasks/mod.rs

//! This module contains the long-running background tasks of the cache-read
//! and accounting cores: the bandwidth upload tick, the traffic sampler,
//! and the cross-node purge queue.

pub mod bandwidth_uploader;
pub mod purge_queue;
pub mod traffic_sampler;

pub use bandwidth_uploader::BandwidthUploaderTask;
pub use purge_queue::CrossNodePurger;
pub use traffic_sampler::TrafficSamplerTask;
