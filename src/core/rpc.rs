// src/core/rpc.rs

//! The control-plane RPC contract consumed by this crate: cross-node cache
//! purging and bandwidth statistics upload. The concrete client lives with
//! the node runtime; tests provide recording stubs.

use crate::core::errors::EdgeError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// One uploaded bandwidth record for a (server, day, 5-minute) cell.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct ServerBandwidthStat {
    pub id: i64,
    pub user_id: i64,
    pub server_id: i64,
    /// `YYYYMMDD`
    pub day: String,
    /// `HHMM`, floored to the 5-minute slot.
    pub time_at: String,
    /// Peak bytes over the cell divided by the 2-second window, i.e.
    /// bytes per second.
    pub bytes: i64,
    pub total_bytes: i64,
    pub cached_bytes: i64,
    pub attack_bytes: i64,
    pub count_requests: i64,
    pub count_cached_requests: i64,
    pub count_attack_requests: i64,
    pub node_region_id: i64,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct UploadServerBandwidthStatsRequest {
    pub server_bandwidth_stats: Vec<ServerBandwidthStat>,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct PurgeServerCacheRequest {
    pub domains: Vec<String>,
    pub keys: Vec<String>,
    pub prefixes: Vec<String>,
}

/// The RPC surface this crate calls on the control plane.
#[async_trait]
pub trait RpcClient: Send + Sync {
    /// Purges the given keys on peer nodes serving the same domains.
    async fn purge_server_cache(&self, req: PurgeServerCacheRequest) -> Result<(), EdgeError>;

    /// Uploads a batch of drained bandwidth cells.
    async fn upload_server_bandwidth_stats(
        &self,
        req: UploadServerBandwidthStatsRequest,
    ) -> Result<(), EdgeError>;
}
