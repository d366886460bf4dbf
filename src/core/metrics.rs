// src/core/metrics.rs

//! Defines and registers Prometheus metrics for the cache-read path.
//!
//! This module uses `lazy_static` to ensure that metrics are registered only
//! once globally for the entire process lifecycle.

use lazy_static::lazy_static;
use prometheus::{Counter, CounterVec, register_counter, register_counter_vec};

lazy_static! {
    /// Successful cache reads, labeled HIT or STALE.
    pub static ref CACHE_READ_HITS_TOTAL: CounterVec = register_counter_vec!(
        "edgecache_read_hits_total",
        "Total number of cache reads served from storage, labeled by status.",
        &["status"]
    )
    .unwrap();

    /// Cache reads that found no usable entry.
    pub static ref CACHE_READ_MISSES_TOTAL: Counter = register_counter!(
        "edgecache_read_misses_total",
        "Total number of cache reads that missed."
    )
    .unwrap();

    /// PURGE sweeps handled locally.
    pub static ref CACHE_PURGES_TOTAL: Counter = register_counter!(
        "edgecache_purges_total",
        "Total number of PURGE requests handled."
    )
    .unwrap();

    /// Range responses (single and multipart) served from cache.
    pub static ref CACHE_RANGE_RESPONSES_TOTAL: Counter = register_counter!(
        "edgecache_range_responses_total",
        "Total number of 206 responses served from cache."
    )
    .unwrap();
}
