use std::sync::atomic::{AtomicBool, Ordering};
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::utils::cancel::CancelToken;

/// Reference to the crawl-side page record a task originates from
#[derive(Debug, Clone, Default)]
pub struct PageRef {
    pub key: String,
    pub prev_fetch_at: Option<DateTime<Utc>>,
}

/// One unit of fetch work. Tasks are cheap to share; cancellation and
/// completion are observable from any holder.
#[derive(Debug)]
pub struct FetchTask {
    id: Uuid,
    batch_id: u32,
    url: String,
    n_retries: u32,
    page: PageRef,
    cancel: CancelToken,
    done: AtomicBool,
}

impl FetchTask {
    pub fn new(batch_id: u32, url: impl Into<String>) -> Self {
        let url = url.into();
        Self {
            id: Uuid::new_v4(),
            batch_id,
            page: PageRef {
                key: url.clone(),
                prev_fetch_at: None,
            },
            url,
            n_retries: 0,
            cancel: CancelToken::new(),
            done: AtomicBool::new(false),
        }
    }

    /// Same task at a later attempt. Gets a fresh cancel token so a
    /// cancellation of the failed attempt does not poison the retry.
    pub fn with_retries(batch_id: u32, url: impl Into<String>, n_retries: u32) -> Self {
        let mut task = Self::new(batch_id, url);
        task.n_retries = n_retries;
        task
    }

    /// Attach the crawl-side page record
    pub fn with_page(mut self, page: PageRef) -> Self {
        self.page = page;
        self
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn batch_id(&self) -> u32 {
        self.batch_id
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn n_retries(&self) -> u32 {
        self.n_retries
    }

    pub fn page(&self) -> &PageRef {
        &self.page
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_canceled(&self) -> bool {
        self.cancel.is_canceled()
    }

    pub fn cancel_token(&self) -> &CancelToken {
        &self.cancel
    }

    /// Mark the work item consumed so schedulers and retry logic skip it
    pub fn mark_done(&self) {
        self.done.store(true, Ordering::SeqCst);
    }

    pub fn is_done(&self) -> bool {
        self.done.load(Ordering::SeqCst)
    }
}
