use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::fetch::error::FetchError;

/// How far back a failed fetch should be retried
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetryScope {
    /// Re-plan the page at the crawl level
    Crawl,
    /// Rotate to a fresh browsing identity first
    Privacy,
    /// Retry over the same protocol path
    Protocol,
}

/// Terminal status of one fetch attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "scope")]
pub enum ProtocolStatus {
    Success,
    Canceled,
    Retry(RetryScope),
    Failed(RetryScope),
}

impl ProtocolStatus {
    pub fn is_success(&self) -> bool {
        matches!(self, ProtocolStatus::Success)
    }

    /// Scope attached to a retryable or failed status
    pub fn retry_scope(&self) -> Option<RetryScope> {
        match self {
            ProtocolStatus::Retry(scope) | ProtocolStatus::Failed(scope) => Some(*scope),
            _ => None,
        }
    }
}

/// Signal extracted from the rendered DOM: the final ready state plus any
/// outgoing links the feature probe collected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DomSignal {
    pub ready_state: String,
    pub urls: Vec<String>,
}

impl DomSignal {
    /// Parse the probe payload, `status|url url ...`. A bare status with no
    /// separator carries no links; an empty payload is no signal at all.
    pub fn parse(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        if raw.is_empty() {
            return None;
        }
        match raw.split_once('|') {
            Some((status, urls)) => Some(Self {
                ready_state: status.to_string(),
                urls: urls
                    .split_whitespace()
                    .map(|u| u.to_string())
                    .collect(),
            }),
            None => Some(Self {
                ready_state: raw.to_string(),
                urls: Vec::new(),
            }),
        }
    }
}

/// Rendered payload of a completed navigation
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FetchResponse {
    pub status: Option<ProtocolStatus>,
    pub signal: Option<DomSignal>,
    pub content: Option<String>,
}

/// Everything the caller learns about one fetch attempt
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchResult {
    pub task_id: Uuid,
    pub batch_id: u32,
    pub url: String,
    pub n_retries: u32,
    pub response: FetchResponse,
    pub error: Option<FetchError>,
    pub fetched_at: DateTime<Utc>,
}

impl FetchResult {
    pub fn status(&self) -> ProtocolStatus {
        self.response.status.unwrap_or(ProtocolStatus::Canceled)
    }

    pub fn is_success(&self) -> bool {
        self.status().is_success()
    }
}
