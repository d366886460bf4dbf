use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use edgecache::core::EdgeError;
use edgecache::core::rpc::{
    PurgeServerCacheRequest, RpcClient, UploadServerBandwidthStatsRequest,
};
use edgecache::core::stats::BandwidthStatManager;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

// 2023-11-14 22:13:20 UTC, inside the 22:10 five-minute slot.
const BASE_UNIX: i64 = 1700000000;

fn at(unix: i64) -> chrono::DateTime<Utc> {
    Utc.timestamp_opt(unix, 0).unwrap()
}

#[derive(Default)]
struct MockRpc {
    uploads: Mutex<Vec<UploadServerBandwidthStatsRequest>>,
    fail_uploads: AtomicBool,
}

#[async_trait]
impl RpcClient for MockRpc {
    async fn purge_server_cache(&self, _req: PurgeServerCacheRequest) -> Result<(), EdgeError> {
        Ok(())
    }

    async fn upload_server_bandwidth_stats(
        &self,
        req: UploadServerBandwidthStatsRequest,
    ) -> Result<(), EdgeError> {
        if self.fail_uploads.load(Ordering::SeqCst) {
            return Err(EdgeError::RpcConnection("connect refused".to_string()));
        }
        self.uploads.lock().push(req);
        Ok(())
    }
}

#[tokio::test]
async fn test_add_bandwidth_accumulates_within_window() {
    let manager = BandwidthStatManager::new();

    // Two samples inside one 2-second window. 3000 bytes exceeds the MTU,
    // so each inflates to 3000 + 3000*20/1500 = 3040.
    manager.add_bandwidth_at(at(BASE_UNIX), 1, 5, 3000, 3000);
    manager.add_bandwidth_at(at(BASE_UNIX + 1), 1, 5, 3000, 3000);

    let map = manager.map();
    assert_eq!(map.get(&5), Some(&3040)); // 6080 / 2

    let rpc = MockRpc::default();
    manager
        .upload_at(at(BASE_UNIX + 300), &rpc, 9)
        .await
        .unwrap();

    let uploads = rpc.uploads.lock();
    assert_eq!(uploads.len(), 1);
    let stats = &uploads[0].server_bandwidth_stats;
    assert_eq!(stats.len(), 1);
    assert_eq!(stats[0].server_id, 5);
    assert_eq!(stats[0].user_id, 1);
    assert_eq!(stats[0].day, "20231114");
    assert_eq!(stats[0].time_at, "2210");
    assert_eq!(stats[0].bytes, 3040);
    assert_eq!(stats[0].total_bytes, 6000);
    assert_eq!(stats[0].node_region_id, 9);
}

#[tokio::test]
async fn test_new_window_resets_current_bytes() {
    let manager = BandwidthStatManager::new();

    manager.add_bandwidth_at(at(BASE_UNIX), 1, 5, 1000, 1000);
    // Four seconds later, a new window: current resets, max stays.
    manager.add_bandwidth_at(at(BASE_UNIX + 4), 1, 5, 400, 400);

    let map = manager.map();
    assert_eq!(map.get(&5), Some(&500)); // max 1000 / 2
}

#[tokio::test]
async fn test_small_samples_skip_overhead_inflation() {
    let manager = BandwidthStatManager::new();

    manager.add_bandwidth_at(at(BASE_UNIX), 1, 5, 1500, 1500);

    assert_eq!(manager.map().get(&5), Some(&750)); // exactly one MTU, no inflation
}

#[tokio::test]
async fn test_add_bandwidth_ignores_invalid_input() {
    let manager = BandwidthStatManager::new();

    manager.add_bandwidth_at(at(BASE_UNIX), 1, 0, 1000, 1000);
    manager.add_bandwidth_at(at(BASE_UNIX), 1, 5, 0, 0);

    assert_eq!(manager.cell_count(), 0);
}

#[tokio::test]
async fn test_user_change_is_ignored_within_slot() {
    let manager = BandwidthStatManager::new();

    manager.add_bandwidth_at(at(BASE_UNIX), 1, 5, 100, 100);
    manager.add_bandwidth_at(at(BASE_UNIX + 1), 2, 5, 100, 100);

    let rpc = MockRpc::default();
    manager
        .upload_at(at(BASE_UNIX + 300), &rpc, 0)
        .await
        .unwrap();
    let uploads = rpc.uploads.lock();
    assert_eq!(uploads[0].server_bandwidth_stats[0].user_id, 1);
}

#[tokio::test]
async fn test_add_traffic_requires_existing_cell() {
    let manager = BandwidthStatManager::new();

    // No bandwidth recorded yet: the traffic sample is dropped.
    manager.add_traffic_at(at(BASE_UNIX), 5, 100, 1, 1, 0, 0);
    assert_eq!(manager.cell_count(), 0);

    manager.add_bandwidth_at(at(BASE_UNIX), 1, 5, 1000, 1000);
    manager.add_traffic_at(at(BASE_UNIX + 1), 5, 400, 3, 2, 1, 50);

    let rpc = MockRpc::default();
    manager
        .upload_at(at(BASE_UNIX + 300), &rpc, 0)
        .await
        .unwrap();
    let uploads = rpc.uploads.lock();
    let stat = &uploads[0].server_bandwidth_stats[0];
    assert_eq!(stat.cached_bytes, 400);
    assert_eq!(stat.count_requests, 3);
    assert_eq!(stat.count_cached_requests, 2);
    assert_eq!(stat.count_attack_requests, 1);
    assert_eq!(stat.attack_bytes, 50);
}

#[tokio::test]
async fn test_drained_cells_clamp_byte_counters() {
    let manager = BandwidthStatManager::new();

    manager.add_bandwidth_at(at(BASE_UNIX), 1, 5, 1000, 1000);
    // More cached/attack bytes than total ever moved.
    manager.add_traffic_at(at(BASE_UNIX + 1), 5, 5000, 1, 1, 1, 7000);

    let rpc = MockRpc::default();
    manager
        .upload_at(at(BASE_UNIX + 300), &rpc, 0)
        .await
        .unwrap();
    let uploads = rpc.uploads.lock();
    let stat = &uploads[0].server_bandwidth_stats[0];
    assert_eq!(stat.total_bytes, 1000);
    assert_eq!(stat.cached_bytes, 1000);
    assert_eq!(stat.attack_bytes, 1000);
}

#[tokio::test]
async fn test_upload_skips_unfinished_slot() {
    let manager = BandwidthStatManager::new();

    manager.add_bandwidth_at(at(BASE_UNIX), 1, 5, 1000, 1000);

    // Same slot as the sample: the cell is still accumulating.
    let rpc = MockRpc::default();
    manager.upload_at(at(BASE_UNIX + 1), &rpc, 0).await.unwrap();
    assert!(rpc.uploads.lock().is_empty());
    assert_eq!(manager.cell_count(), 1);
}

#[tokio::test]
async fn test_failed_upload_retries_next_tick_without_double_counting() {
    let manager = BandwidthStatManager::new();
    let rpc = MockRpc::default();

    manager.add_bandwidth_at(at(BASE_UNIX), 1, 5, 1000, 1000);

    rpc.fail_uploads.store(true, Ordering::SeqCst);
    let err = manager.upload_at(at(BASE_UNIX + 300), &rpc, 0).await;
    assert!(err.is_err());
    assert!(err.unwrap_err().is_conn_error());

    // The cell was drained; a retry must come from the retained batch.
    assert_eq!(manager.cell_count(), 0);

    rpc.fail_uploads.store(false, Ordering::SeqCst);
    manager
        .upload_at(at(BASE_UNIX + 600), &rpc, 0)
        .await
        .unwrap();

    let uploads = rpc.uploads.lock();
    assert_eq!(uploads.len(), 1);
    assert_eq!(uploads[0].server_bandwidth_stats.len(), 1);
    assert_eq!(uploads[0].server_bandwidth_stats[0].bytes, 500);
}

#[tokio::test]
async fn test_stale_pending_records_are_dropped() {
    let manager = BandwidthStatManager::new();
    let rpc = MockRpc::default();

    manager.add_bandwidth_at(at(BASE_UNIX), 1, 5, 1000, 1000);

    // The upload 25 minutes later fails; by then the sample is already
    // nearly past the retention window.
    rpc.fail_uploads.store(true, Ordering::SeqCst);
    assert!(
        manager
            .upload_at(at(BASE_UNIX + 1500), &rpc, 0)
            .await
            .is_err()
    );

    // A fresh cell keeps later ticks flowing; the stale pending record
    // must not ride along.
    rpc.fail_uploads.store(false, Ordering::SeqCst);
    manager.add_bandwidth_at(at(BASE_UNIX + 1500), 1, 6, 2000, 2000);
    manager
        .upload_at(at(BASE_UNIX + 1800), &rpc, 0)
        .await
        .unwrap();

    let uploads = rpc.uploads.lock();
    assert_eq!(uploads.len(), 1);
    let stats = &uploads[0].server_bandwidth_stats;
    assert_eq!(stats.len(), 1);
    assert_eq!(stats[0].server_id, 6);
}
