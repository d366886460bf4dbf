// src/core/caches/manager.rs

//! Maps cache-policy ids to their storage backends. Registration happens at
//! configuration load; the request path only performs lookups.

use super::Storage;
use dashmap::DashMap;
use std::sync::Arc;

#[derive(Default)]
pub struct StorageManager {
    storages: DashMap<i64, Arc<dyn Storage>>,
}

impl StorageManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, policy_id: i64, storage: Arc<dyn Storage>) {
        self.storages.insert(policy_id, storage);
    }

    pub fn find_storage_with_policy(&self, policy_id: i64) -> Option<Arc<dyn Storage>> {
        self.storages.get(&policy_id).map(|s| s.value().clone())
    }

    pub fn remove(&self, policy_id: i64) {
        self.storages.remove(&policy_id);
    }
}
