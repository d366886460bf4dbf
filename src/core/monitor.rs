// src/core/monitor.rs

//! The node value queue: a process-wide channel carrying periodic samples
//! (traffic counters and similar) toward the monitoring uploader, which is
//! out of scope here and simply drains the receiver.

use once_cell::sync::Lazy;
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::json;
use tokio::sync::mpsc;

/// The process-wide value queue.
pub static SHARED_VALUE_QUEUE: Lazy<ValueQueue> = Lazy::new(ValueQueue::new);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum NodeValueKind {
    TrafficIn,
    TrafficOut,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NodeValueItem {
    pub kind: NodeValueKind,
    pub payload: serde_json::Value,
}

impl NodeValueItem {
    pub fn traffic_in(total: u64) -> Self {
        Self {
            kind: NodeValueKind::TrafficIn,
            payload: json!({ "total": total }),
        }
    }

    pub fn traffic_out(total: u64) -> Self {
        Self {
            kind: NodeValueKind::TrafficOut,
            payload: json!({ "total": total }),
        }
    }
}

pub struct ValueQueue {
    tx: mpsc::UnboundedSender<NodeValueItem>,
    rx: Mutex<Option<mpsc::UnboundedReceiver<NodeValueItem>>>,
}

impl ValueQueue {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            tx,
            rx: Mutex::new(Some(rx)),
        }
    }

    /// Enqueues an item. Dropped silently if the consumer is gone; samples
    /// are periodic and the next one supersedes a lost one.
    pub fn add(&self, item: NodeValueItem) {
        let _ = self.tx.send(item);
    }

    /// Hands the receiving end to the single monitoring consumer.
    pub fn take_receiver(&self) -> Option<mpsc::UnboundedReceiver<NodeValueItem>> {
        self.rx.lock().take()
    }
}

impl Default for ValueQueue {
    fn default() -> Self {
        Self::new()
    }
}
