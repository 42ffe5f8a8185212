use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::browser::driver::{nav_clock, Driver, DriverError, DriverFactory, NavClock};
use crate::browser::privacy::BrowserId;

enum LaunchState {
    NotLaunched,
    Ready,
    Failed(String),
}

struct PoolState {
    launch: LaunchState,
    drivers: Vec<Arc<dyn Driver>>,
}

/// Pool of drivers backed by one isolated browser profile. All pool
/// mutations go through a single mutex, including the one-time launch of the
/// underlying automation runtime.
pub struct Browser {
    id: BrowserId,
    factory: Arc<dyn DriverFactory>,
    clock: NavClock,
    state: Mutex<PoolState>,
}

impl Browser {
    /// Create a browser for one profile. Nothing is launched until the first
    /// driver is requested.
    pub fn new(id: BrowserId, factory: Arc<dyn DriverFactory>) -> Self {
        Self {
            id,
            factory,
            clock: nav_clock(),
            state: Mutex::new(PoolState {
                launch: LaunchState::NotLaunched,
                drivers: Vec::new(),
            }),
        }
    }

    pub fn id(&self) -> &BrowserId {
        &self.id
    }

    /// Create a fresh driver, launching the underlying runtime on first use.
    /// Concurrent callers block on the pool lock during the launch and all
    /// observe the same outcome; a failed launch stays failed until the
    /// browser is forcibly destroyed.
    pub async fn new_driver(&self) -> Result<Arc<dyn Driver>, DriverError> {
        let mut state = self.state.lock().await;

        match &state.launch {
            LaunchState::Ready => {}
            LaunchState::Failed(message) => {
                return Err(DriverError::ConnectionRefused(message.clone()));
            }
            LaunchState::NotLaunched => match self.factory.launch(&self.id).await {
                Ok(()) => {
                    debug!("Launched browser {}", self.id);
                    state.launch = LaunchState::Ready;
                }
                Err(e) => {
                    warn!("Launch of browser {} failed: {}", self.id, e);
                    state.launch = LaunchState::Failed(e.to_string());
                    return Err(e);
                }
            },
        }

        let driver = self.factory.open_tab(&self.id, self.clock.clone()).await?;
        state.drivers.push(driver.clone());
        Ok(driver)
    }

    /// Retire a driver, drop it from the pool, and close its tab. Close
    /// failures are logged, never surfaced.
    pub async fn destroy_driver(&self, driver: &Arc<dyn Driver>) {
        driver.retire();
        {
            let mut state = self.state.lock().await;
            state.drivers.retain(|d| d.id() != driver.id());
        }
        if let Err(e) = driver.quit().await {
            debug!("Error closing driver {}: {}", driver.id(), e);
        }
    }

    /// Retire a driver and drop it from the pool without talking to the
    /// browser. Used when the session is already gone.
    pub async fn discard_driver(&self, driver: &Arc<dyn Driver>) {
        driver.retire();
        let mut state = self.state.lock().await;
        state.drivers.retain(|d| d.id() != driver.id());
    }

    /// Best-effort teardown of every driver and the underlying runtime.
    /// Never fails; the launch state is reset so the browser can relaunch.
    pub async fn destroy_forcibly(&self) {
        let drivers = {
            let mut state = self.state.lock().await;
            state.launch = LaunchState::NotLaunched;
            std::mem::take(&mut state.drivers)
        };

        for driver in drivers {
            driver.retire();
            if let Err(e) = driver.quit().await {
                debug!("Error closing driver {} during teardown: {}", driver.id(), e);
            }
        }

        self.factory.shutdown(&self.id).await;
        debug!("Browser {} destroyed", self.id);
    }

    /// True when no driver is active
    pub async fn is_idle(&self) -> bool {
        self.state.lock().await.drivers.is_empty()
    }

    /// Whether the pool currently holds a driver with this id
    pub async fn contains_driver(&self, id: Uuid) -> bool {
        self.state
            .lock()
            .await
            .drivers
            .iter()
            .any(|d| d.id() == id)
    }

    /// Number of active drivers
    pub async fn driver_count(&self) -> usize {
        self.state.lock().await.drivers.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::browser::testing::{FakeDriverFactory, FakeTabPlan};
    use std::path::PathBuf;

    fn test_id() -> BrowserId {
        BrowserId {
            uuid: Uuid::new_v4(),
            data_dir: PathBuf::from("/tmp/rendercrawl-test/profile"),
            fingerprint: "linux_chrome".to_string(),
        }
    }

    #[tokio::test]
    async fn launches_once_and_pools_drivers() {
        let factory = Arc::new(FakeDriverFactory::new(FakeTabPlan::default()));
        let browser = Browser::new(test_id(), factory.clone());

        assert!(browser.is_idle().await);
        let first = browser.new_driver().await.expect("first driver");
        let second = browser.new_driver().await.expect("second driver");

        assert_eq!(factory.launch_count(), 1);
        assert_eq!(browser.driver_count().await, 2);
        assert!(!browser.is_idle().await);
        assert!(browser.contains_driver(first.id()).await);

        browser.destroy_driver(&first).await;
        assert!(!browser.contains_driver(first.id()).await);
        assert!(first.is_quit());
        let _ = second;
    }

    #[tokio::test]
    async fn launch_failure_is_sticky_until_forced_teardown() {
        let factory = Arc::new(FakeDriverFactory::failing_launch());
        let browser = Browser::new(test_id(), factory.clone());

        assert!(browser.new_driver().await.is_err());
        assert!(browser.new_driver().await.is_err());
        // Only the first call actually attempted the launch
        assert_eq!(factory.launch_count(), 1);

        browser.destroy_forcibly().await;
        factory.set_fail_launch(false);
        assert!(browser.new_driver().await.is_ok());
    }

    #[tokio::test]
    async fn concurrent_driver_requests_share_one_launch() {
        let factory = Arc::new(FakeDriverFactory::new(FakeTabPlan::default()));
        let browser = Arc::new(Browser::new(test_id(), factory.clone()));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let browser = browser.clone();
            handles.push(tokio::spawn(async move { browser.new_driver().await }));
        }
        for handle in handles {
            assert!(handle.await.expect("join").is_ok());
        }

        assert_eq!(factory.launch_count(), 1);
        assert_eq!(browser.driver_count().await, 8);
    }

    #[tokio::test]
    async fn destroy_forcibly_clears_pool_even_when_quit_fails() {
        let plan = FakeTabPlan {
            fail_quit: true,
            ..FakeTabPlan::default()
        };
        let factory = Arc::new(FakeDriverFactory::new(plan));
        let browser = Browser::new(test_id(), factory.clone());

        let driver = browser.new_driver().await.expect("driver");
        browser.destroy_forcibly().await;

        assert!(browser.is_idle().await);
        assert!(driver.is_quit());
        assert_eq!(factory.shutdown_count(), 1);
    }
}
