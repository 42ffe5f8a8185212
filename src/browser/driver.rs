use std::sync::{Arc, Mutex as StdMutex};
use std::time::{Duration, Instant};
use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

#[cfg(test)]
use mockall::automock;

use crate::browser::privacy::BrowserId;

/// Failure taxonomy reported by every driver operation
#[derive(Debug, Error)]
pub enum DriverError {
    #[error("browser session lost: {0}")]
    SessionLost(String),

    #[error("connection refused by automation endpoint: {0}")]
    ConnectionRefused(String),

    #[error("operation timed out: {0}")]
    Timeout(String),

    #[error("driver error: {0}")]
    Other(String),
}

/// Per-session timeout configuration pushed to the browser
#[derive(Debug, Clone)]
pub struct TimeoutSettings {
    pub page_load: Duration,
    pub script: Duration,
    pub implicit: Duration,
}

impl Default for TimeoutSettings {
    fn default() -> Self {
        Self {
            page_load: Duration::from_secs(30),
            script: Duration::from_secs(30),
            implicit: Duration::from_secs(5),
        }
    }
}

/// Shared navigation timestamp for all tabs of one browser profile. The
/// throttle in the navigation state machine reads it; `navigate_to` updates
/// it. Tracked per profile because every attempt gets a fresh tab.
pub type NavClock = Arc<StdMutex<Option<Instant>>>;

/// Create an empty navigation clock
pub fn nav_clock() -> NavClock {
    Arc::new(StdMutex::new(None))
}

/// One controllable browser tab bound to a `BrowserId`.
///
/// Lifecycle: Created -> Active -> Retired/Closed. A retired driver must
/// never be handed out again; the owning pool discards it.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait Driver: Send + Sync {
    /// Unique id of this tab
    fn id(&self) -> Uuid;

    /// Identity of the profile this tab belongs to
    fn browser_id(&self) -> BrowserId;

    /// Navigate the tab to a URL
    async fn navigate_to(&self, url: &str) -> Result<(), DriverError>;

    /// Evaluate a script under the caller-supplied time limit. Exceeding the
    /// limit is reported as `DriverError::Timeout`, never swallowed. A
    /// null/undefined script result maps to `None`.
    async fn evaluate(&self, script: &str, limit: Duration)
        -> Result<Option<String>, DriverError>;

    /// Read the current page source
    async fn page_source(&self) -> Result<String, DriverError>;

    /// Push timeout configuration to the session
    async fn set_timeouts(&self, timeouts: &TimeoutSettings) -> Result<(), DriverError>;

    /// Whether this driver has been retired or closed
    fn is_quit(&self) -> bool;

    /// Mark the driver retired without closing it. A session-lost driver is
    /// retired first and discarded by the pool.
    fn retire(&self);

    /// When this profile last navigated, if ever
    fn last_navigate_at(&self) -> Option<Instant>;

    /// Close the underlying tab/session
    async fn quit(&self) -> Result<(), DriverError>;
}

/// Creates drivers for a profile and owns the backend-specific launch and
/// teardown of the underlying automation runtime.
#[async_trait]
pub trait DriverFactory: Send + Sync {
    /// One-time launch of the automation runtime for a profile. Invoked
    /// under the owning browser's pool lock.
    async fn launch(&self, id: &BrowserId) -> Result<(), DriverError>;

    /// Open a fresh tab bound to the profile
    async fn open_tab(
        &self,
        id: &BrowserId,
        clock: NavClock,
    ) -> Result<Arc<dyn Driver>, DriverError>;

    /// Best-effort teardown of the profile's runtime. Must not fail.
    async fn shutdown(&self, id: &BrowserId);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn mocked_driver_satisfies_the_trait() {
        let mut mock = MockDriver::new();
        mock.expect_navigate_to().returning(|_| Ok(()));
        mock.expect_evaluate()
            .returning(|_, _| Ok(Some("complete".to_string())));
        mock.expect_is_quit().return_const(false);

        mock.navigate_to("https://example.com/").await.expect("navigate");
        let value = mock
            .evaluate("return document.readyState;", Duration::from_secs(1))
            .await
            .expect("evaluate");
        assert_eq!(value.as_deref(), Some("complete"));
        assert!(!mock.is_quit());
    }

    #[test]
    fn timeout_defaults_are_conservative() {
        let timeouts = TimeoutSettings::default();
        assert!(timeouts.page_load >= timeouts.implicit);
        assert!(timeouts.script >= timeouts.implicit);
    }
}
