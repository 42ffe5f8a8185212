use std::collections::{HashSet, VecDeque};

/// FIFO queue of page keys for one crawl batch. Keys are deduplicated for
/// the lifetime of the scheduler so a page is handed out at most once.
#[derive(Debug)]
pub struct Scheduler {
    batch_id: u32,
    queue: VecDeque<String>,
    seen: HashSet<String>,
}

impl Scheduler {
    pub fn new(batch_id: u32) -> Self {
        Self {
            batch_id,
            queue: VecDeque::new(),
            seen: HashSet::new(),
        }
    }

    pub fn batch_id(&self) -> u32 {
        self.batch_id
    }

    /// Enqueue a key. Returns false when the key was already offered.
    pub fn push(&mut self, key: impl Into<String>) -> bool {
        let key = key.into();
        if !self.seen.insert(key.clone()) {
            return false;
        }
        self.queue.push_back(key);
        true
    }

    /// Drain up to `count` keys from the head of the queue
    pub fn poll(&mut self, count: usize) -> Vec<String> {
        let take = count.min(self.queue.len());
        self.queue.drain(..take).collect()
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}
