// src/core/stats/bandwidth.rs

//! The bandwidth aggregator. Request processing feeds it through two hot
//! entry points (`add_bandwidth`, `add_traffic`); a one-minute tick drains
//! finished cells into control-plane upload records.
//!
//! Peak detection works on a rolling 2-second window: bytes reported within
//! the same window accumulate into `current_bytes`, and the cell keeps the
//! largest window ever seen. `max_bytes / 2` is therefore the peak
//! bytes-per-second of the cell.

use crate::core::errors::EdgeError;
use crate::core::rpc::{RpcClient, ServerBandwidthStat, UploadServerBandwidthStatsRequest};
use crate::core::utils::time::{format_day, format_time_slot};
use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::info;

/// Length of the peak-detection window in seconds.
pub const BANDWIDTH_TIMESTAMP_DELIM: i64 = 2;

/// Unuploaded samples older than this many seconds are dropped.
const RETAIN_SECONDS: i64 = 1200;

/// Approximate TCP/IP framing overhead: 20 bytes of header per 1500-byte
/// MTU, applied once a sample exceeds one MTU.
const MTU: i64 = 1500;
const TCP_HEADER_SIZE: i64 = 20;

/// The process-wide aggregator.
pub static SHARED_BANDWIDTH_STATS: Lazy<Arc<BandwidthStatManager>> =
    Lazy::new(|| Arc::new(BandwidthStatManager::new()));

/// One (server, day, 5-minute) cell.
#[derive(Debug, Clone, Default, Serialize)]
pub struct BandwidthStat {
    pub day: String,
    pub time_at: String,
    pub user_id: i64,
    pub server_id: i64,

    pub current_bytes: i64,
    pub current_timestamp: i64,
    pub max_bytes: i64,
    pub total_bytes: i64,

    pub cached_bytes: i64,
    pub attack_bytes: i64,
    pub count_requests: i64,
    pub count_cached_requests: i64,
    pub count_attack_requests: i64,
}

#[derive(Default)]
struct Inner {
    /// serverId@day@time => cell
    m: HashMap<String, BandwidthStat>,
    /// Records from a failed upload, waiting for the next tick.
    pending: Vec<ServerBandwidthStat>,
    /// The slot the upload loop last ran for.
    last_time: String,
}

#[derive(Default)]
pub struct BandwidthStatManager {
    inner: Mutex<Inner>,
}

impl BandwidthStatManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records bytes moved for a server. `peek_bytes` feeds peak detection,
    /// `total_bytes` the volume counter.
    pub fn add_bandwidth(&self, user_id: i64, server_id: i64, peek_bytes: i64, total_bytes: i64) {
        self.add_bandwidth_at(Utc::now(), user_id, server_id, peek_bytes, total_bytes)
    }

    pub fn add_bandwidth_at(
        &self,
        now: DateTime<Utc>,
        user_id: i64,
        server_id: i64,
        mut peek_bytes: i64,
        total_bytes: i64,
    ) {
        if server_id <= 0 || (peek_bytes == 0 && total_bytes == 0) {
            return;
        }

        let unix = now.timestamp();
        let timestamp = unix / BANDWIDTH_TIMESTAMP_DELIM * BANDWIDTH_TIMESTAMP_DELIM;
        let day = format_day(now);
        let time_at = format_time_slot(unix);
        let key = cell_key(server_id, &day, &time_at);

        if peek_bytes > MTU {
            peek_bytes += peek_bytes * TCP_HEADER_SIZE / MTU;
        }

        let mut inner = self.inner.lock();
        match inner.m.get_mut(&key) {
            Some(stat) => {
                // A changed user id is ignored until the next slot opens a
                // fresh cell.
                if stat.current_timestamp == timestamp {
                    stat.current_bytes += peek_bytes;
                } else {
                    stat.current_bytes = peek_bytes;
                    stat.current_timestamp = timestamp;
                }
                if stat.current_bytes > stat.max_bytes {
                    stat.max_bytes = stat.current_bytes;
                }
                stat.total_bytes += total_bytes;
            }
            None => {
                inner.m.insert(
                    key,
                    BandwidthStat {
                        day,
                        time_at,
                        user_id,
                        server_id,
                        current_bytes: peek_bytes,
                        current_timestamp: timestamp,
                        max_bytes: peek_bytes,
                        total_bytes,
                        ..Default::default()
                    },
                );
            }
        }
    }

    /// Records request outcomes for a server. Traffic counts piggy-back on
    /// bandwidth presence: without an existing cell the sample is dropped,
    /// so a request finishing exactly on a slot boundary may go uncounted.
    pub fn add_traffic(
        &self,
        server_id: i64,
        cached_bytes: i64,
        count_requests: i64,
        count_cached_requests: i64,
        count_attacks: i64,
        attack_bytes: i64,
    ) {
        self.add_traffic_at(
            Utc::now(),
            server_id,
            cached_bytes,
            count_requests,
            count_cached_requests,
            count_attacks,
            attack_bytes,
        )
    }

    #[allow(clippy::too_many_arguments)]
    pub fn add_traffic_at(
        &self,
        now: DateTime<Utc>,
        server_id: i64,
        cached_bytes: i64,
        count_requests: i64,
        count_cached_requests: i64,
        count_attacks: i64,
        attack_bytes: i64,
    ) {
        let unix = now.timestamp();
        let day = format_day(now);
        let time_at = format_time_slot(unix);
        let key = cell_key(server_id, &day, &time_at);

        let mut inner = self.inner.lock();
        if let Some(stat) = inner.m.get_mut(&key) {
            stat.cached_bytes += cached_bytes;
            stat.count_requests += count_requests;
            stat.count_cached_requests += count_cached_requests;
            stat.count_attack_requests += count_attacks;
            stat.attack_bytes += attack_bytes;
        }
    }

    /// One upload tick: drains every cell older than the current slot and
    /// ships the batch. Failed batches are kept for later ticks, up to the
    /// retention limit, so samples are neither lost early nor
    /// double-counted.
    pub async fn upload(&self, rpc: &dyn RpcClient, region_id: i64) -> Result<(), EdgeError> {
        self.upload_at(Utc::now(), rpc, region_id).await
    }

    pub async fn upload_at(
        &self,
        now: DateTime<Utc>,
        rpc: &dyn RpcClient,
        region_id: i64,
    ) -> Result<(), EdgeError> {
        let unix = now.timestamp();
        let day = format_day(now);
        let current_time = format_time_slot(unix);

        let mut stats: Vec<ServerBandwidthStat> = Vec::new();
        {
            let mut inner = self.inner.lock();
            if inner.last_time == current_time {
                return Ok(());
            }
            inner.last_time = current_time.clone();

            // Reintroduce records from the last failed upload, dropping
            // anything past the retention window.
            if !inner.pending.is_empty() {
                let expired_unix = unix - RETAIN_SECONDS;
                let expired_day = format_day(DateTime::from_timestamp(expired_unix, 0).unwrap_or(now));
                let expired_time = format_time_slot(expired_unix);
                let pending = std::mem::take(&mut inner.pending);
                stats.extend(pending.into_iter().filter(|stat| {
                    (stat.day.as_str(), stat.time_at.as_str())
                        > (expired_day.as_str(), expired_time.as_str())
                }));
            }

            let drained: Vec<String> = inner
                .m
                .iter()
                .filter(|(_, stat)| stat.day < day || stat.time_at < current_time)
                .map(|(key, _)| key.clone())
                .collect();
            for key in drained {
                if let Some(mut stat) = inner.m.remove(&key) {
                    if stat.cached_bytes > stat.total_bytes {
                        stat.cached_bytes = stat.total_bytes;
                    }
                    if stat.attack_bytes > stat.total_bytes {
                        stat.attack_bytes = stat.total_bytes;
                    }
                    stats.push(ServerBandwidthStat {
                        id: 0,
                        user_id: stat.user_id,
                        server_id: stat.server_id,
                        day: stat.day,
                        time_at: stat.time_at,
                        bytes: stat.max_bytes / BANDWIDTH_TIMESTAMP_DELIM,
                        total_bytes: stat.total_bytes,
                        cached_bytes: stat.cached_bytes,
                        attack_bytes: stat.attack_bytes,
                        count_requests: stat.count_requests,
                        count_cached_requests: stat.count_cached_requests,
                        count_attack_requests: stat.count_attack_requests,
                        node_region_id: region_id,
                    });
                }
            }
        }

        if stats.is_empty() {
            return Ok(());
        }

        let request = UploadServerBandwidthStatsRequest {
            server_bandwidth_stats: stats.clone(),
        };
        if let Err(e) = rpc.upload_server_bandwidth_stats(request).await {
            self.inner.lock().pending = stats;
            return Err(e);
        }
        Ok(())
    }

    /// Peak bytes-per-second per server over the live cells.
    pub fn map(&self) -> HashMap<i64, i64> {
        let inner = self.inner.lock();
        inner
            .m
            .values()
            .map(|stat| (stat.server_id, stat.max_bytes / BANDWIDTH_TIMESTAMP_DELIM))
            .collect()
    }

    /// Logs a JSON snapshot of the live cells.
    pub fn inspect(&self) {
        let inner = self.inner.lock();
        match serde_json::to_string_pretty(&inner.m) {
            Ok(snapshot) => info!("bandwidth cells: {snapshot}"),
            Err(e) => info!("bandwidth cells unavailable: {e}"),
        }
    }

    /// Number of live cells, for admin views.
    pub fn cell_count(&self) -> usize {
        self.inner.lock().m.len()
    }
}

fn cell_key(server_id: i64, day: &str, time_at: &str) -> String {
    let mut server_buf = itoa::Buffer::new();
    let mut key = String::with_capacity(24);
    key.push_str(server_buf.format(server_id));
    key.push('@');
    key.push_str(day);
    key.push('@');
    key.push_str(time_at);
    key
}
