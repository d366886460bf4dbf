use edgecache::connection::{CountingStream, IN_TRAFFIC_BYTES, OUT_TRAFFIC_BYTES};
use edgecache::core::monitor::{NodeValueKind, ValueQueue};
use edgecache::core::tasks::traffic_sampler::sample;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::io::{AsyncReadExt, AsyncWriteExt};

#[tokio::test]
async fn test_counting_stream_counts_both_directions() {
    let (client, mut server) = tokio::io::duplex(1024);
    let mut stream = CountingStream::wrap(client);

    let out_before = OUT_TRAFFIC_BYTES.load(Ordering::Relaxed);
    let in_before = IN_TRAFFIC_BYTES.load(Ordering::Relaxed);

    stream.write_all(b"hello").await.unwrap();
    let mut buf = [0u8; 5];
    server.read_exact(&mut buf).await.unwrap();
    assert_eq!(&buf, b"hello");

    server.write_all(b"worlds!").await.unwrap();
    let mut buf = [0u8; 7];
    stream.read_exact(&mut buf).await.unwrap();
    assert_eq!(&buf, b"worlds!");

    assert_eq!(OUT_TRAFFIC_BYTES.load(Ordering::Relaxed) - out_before, 5);
    assert_eq!(IN_TRAFFIC_BYTES.load(Ordering::Relaxed) - in_before, 7);

    assert!(!stream.is_closed());
    stream.shutdown().await.unwrap();
    assert!(stream.is_closed());
}

#[test]
fn test_sample_exchanges_counters_and_emits_items() {
    let in_counter = AtomicU64::new(1500);
    let out_counter = AtomicU64::new(2500);
    let queue = ValueQueue::new();
    let mut rx = queue.take_receiver().unwrap();

    sample(&in_counter, &out_counter, &queue);

    // Snapshot-and-reset is atomic; both counters restart at zero.
    assert_eq!(in_counter.load(Ordering::Relaxed), 0);
    assert_eq!(out_counter.load(Ordering::Relaxed), 0);

    let item = rx.try_recv().unwrap();
    assert_eq!(item.kind, NodeValueKind::TrafficIn);
    assert_eq!(item.payload["total"], 1500);
    let item = rx.try_recv().unwrap();
    assert_eq!(item.kind, NodeValueKind::TrafficOut);
    assert_eq!(item.payload["total"], 2500);
}

#[test]
fn test_sample_skips_zero_counters() {
    let in_counter = AtomicU64::new(0);
    let out_counter = AtomicU64::new(10);
    let queue = ValueQueue::new();
    let mut rx = queue.take_receiver().unwrap();

    sample(&in_counter, &out_counter, &queue);

    let item = rx.try_recv().unwrap();
    assert_eq!(item.kind, NodeValueKind::TrafficOut);
    assert!(rx.try_recv().is_err());
}
