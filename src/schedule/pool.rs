use std::collections::{HashMap, VecDeque};
use tokio::sync::Mutex;
use tracing::debug;

use crate::schedule::scheduler::Scheduler;

struct PoolInner {
    schedulers: HashMap<u32, Scheduler>,
    /// Round-robin order of batch ids. The head is served next.
    order: VecDeque<u32>,
}

/// Round-robin pool of per-batch schedulers. Each drain request serves the
/// batch at the head of the rotation and moves it to the tail, so no batch
/// can starve the others.
pub struct SchedulerPool {
    inner: Mutex<PoolInner>,
}

impl SchedulerPool {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(PoolInner {
                schedulers: HashMap::new(),
                order: VecDeque::new(),
            }),
        }
    }

    /// Register or replace a batch's scheduler. A known batch id keeps its
    /// position in the rotation.
    pub async fn put(&self, scheduler: Scheduler) {
        let mut inner = self.inner.lock().await;
        let batch_id = scheduler.batch_id();
        let known = inner.schedulers.insert(batch_id, scheduler).is_some();
        if !known {
            inner.order.push_back(batch_id);
        }
    }

    /// Drop a batch from the pool and the rotation
    pub async fn remove(&self, batch_id: u32) -> Option<Scheduler> {
        let mut inner = self.inner.lock().await;
        inner.order.retain(|id| *id != batch_id);
        inner.schedulers.remove(&batch_id)
    }

    /// Take up to `count` keys from the next batch in the rotation. Batch
    /// ids that linger in the rotation without a scheduler are dropped, not
    /// re-queued. Returns the serving batch id with its keys.
    pub async fn random_fetch_items(&self, count: usize) -> Option<(u32, Vec<String>)> {
        let mut inner = self.inner.lock().await;
        while let Some(batch_id) = inner.order.pop_front() {
            if let Some(scheduler) = inner.schedulers.get_mut(&batch_id) {
                let keys = scheduler.poll(count);
                inner.order.push_back(batch_id);
                return Some((batch_id, keys));
            }
            debug!("Dropping stale batch {} from rotation", batch_id);
        }
        None
    }

    /// Keys still queued across every batch
    pub async fn total_pending(&self) -> usize {
        let inner = self.inner.lock().await;
        inner.schedulers.values().map(|s| s.len()).sum()
    }

    pub async fn scheduler_count(&self) -> usize {
        self.inner.lock().await.schedulers.len()
    }
}

impl Default for SchedulerPool {
    fn default() -> Self {
        Self::new()
    }
}
