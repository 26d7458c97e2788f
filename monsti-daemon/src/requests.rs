//! In-flight request descriptors shared with handler processes by id.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::RwLock;

use monsti_core::Request;

#[derive(Debug, Default)]
pub struct RequestTable {
    next_id: AtomicU64,
    requests: RwLock<HashMap<u64, Request>>,
}

impl RequestTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores `request` under a fresh id and returns the id. Any id already
    /// set on the request is overwritten.
    pub async fn insert(&self, mut request: Request) -> u64 {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        request.id = id;
        self.requests.write().await.insert(id, request);
        id
    }

    pub async fn get(&self, id: u64) -> Option<Request> {
        self.requests.read().await.get(&id).cloned()
    }

    pub async fn remove(&self, id: u64) -> Option<Request> {
        self.requests.write().await.remove(&id)
    }
}
