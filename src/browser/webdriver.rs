use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use async_trait::async_trait;
use thirtyfour::prelude::*;
use thirtyfour::ChromeCapabilities;
use tokio::sync::Mutex;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::browser::driver::{Driver, DriverError, DriverFactory, NavClock, TimeoutSettings};
use crate::browser::privacy::BrowserId;
use crate::cli::config::BrowserSettings;

/// Translate a thirtyfour failure into the driver taxonomy. Matching on the
/// rendered message keeps this stable across thirtyfour minor versions.
fn map_webdriver_err(err: thirtyfour::error::WebDriverError) -> DriverError {
    let text = err.to_string();
    let lower = text.to_lowercase();

    if lower.contains("invalid session id")
        || lower.contains("no such session")
        || lower.contains("session not created")
        || lower.contains("session is deleted")
    {
        DriverError::SessionLost(text)
    } else if lower.contains("connection refused")
        || lower.contains("connection reset")
        || lower.contains("error sending request")
    {
        DriverError::ConnectionRefused(text)
    } else {
        DriverError::Other(text)
    }
}

fn retired_err() -> DriverError {
    DriverError::SessionLost("driver has been retired".to_string())
}

fn json_to_text(value: &serde_json::Value) -> Option<String> {
    match value {
        serde_json::Value::Null => None,
        serde_json::Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

/// Driver factory backed by a WebDriver endpoint (chromedriver or a
/// Selenium-compatible hub).
pub struct WebDriverFactory {
    settings: BrowserSettings,
    client: reqwest::Client,
}

impl WebDriverFactory {
    /// Create a new factory for the configured endpoint
    pub fn new(settings: BrowserSettings) -> Self {
        Self {
            settings,
            client: reqwest::Client::new(),
        }
    }

    fn capabilities(&self, id: &BrowserId) -> Result<ChromeCapabilities, DriverError> {
        let mut caps = DesiredCapabilities::chrome();

        if let Some(fingerprint) = self
            .settings
            .fingerprints
            .iter()
            .find(|f| f.name == id.fingerprint)
        {
            caps.add_chrome_arg(&format!("--user-agent={}", fingerprint.user_agent))
                .map_err(map_webdriver_err)?;
            caps.add_chrome_arg(&format!(
                "--lang={}",
                fingerprint
                    .accept_language
                    .split(',')
                    .next()
                    .unwrap_or("en-US")
            ))
            .map_err(map_webdriver_err)?;
        } else {
            warn!("Unknown fingerprint {} for {}", id.fingerprint, id);
        }

        // Profile isolation: one data directory per identity
        caps.add_chrome_arg(&format!("--user-data-dir={}", id.data_dir.display()))
            .map_err(map_webdriver_err)?;

        if self.settings.headless {
            caps.set_headless().map_err(map_webdriver_err)?;
        }

        caps.add_chrome_arg("--disable-blink-features=AutomationControlled")
            .map_err(map_webdriver_err)?;
        caps.add_chrome_arg("--disable-dev-shm-usage")
            .map_err(map_webdriver_err)?;

        Ok(caps)
    }
}

#[async_trait]
impl DriverFactory for WebDriverFactory {
    async fn launch(&self, id: &BrowserId) -> Result<(), DriverError> {
        let status_url = format!(
            "{}/status",
            self.settings.webdriver_url.trim_end_matches('/')
        );

        let response = self.client.get(&status_url).send().await.map_err(|e| {
            if e.is_connect() {
                DriverError::ConnectionRefused(e.to_string())
            } else {
                DriverError::Other(e.to_string())
            }
        })?;

        if !response.status().is_success() {
            return Err(DriverError::ConnectionRefused(format!(
                "webdriver status endpoint returned {}",
                response.status()
            )));
        }

        debug!("WebDriver endpoint ready for {}", id);
        Ok(())
    }

    async fn open_tab(
        &self,
        id: &BrowserId,
        clock: NavClock,
    ) -> Result<Arc<dyn Driver>, DriverError> {
        let caps = self.capabilities(id)?;
        let driver = WebDriver::new(&self.settings.webdriver_url, caps)
            .await
            .map_err(map_webdriver_err)?;

        debug!("Opened WebDriver tab for {}", id);

        Ok(Arc::new(WebDriverTab {
            id: Uuid::new_v4(),
            browser_id: id.clone(),
            inner: Mutex::new(Some(driver)),
            retired: AtomicBool::new(false),
            clock,
        }))
    }

    async fn shutdown(&self, id: &BrowserId) {
        // Sessions are closed tab by tab; the webdriver server owns the
        // browser process itself.
        debug!("WebDriver shutdown for {}", id);
    }
}

/// One WebDriver session treated as a single controllable tab
pub struct WebDriverTab {
    id: Uuid,
    browser_id: BrowserId,
    inner: Mutex<Option<WebDriver>>,
    retired: AtomicBool,
    clock: NavClock,
}

#[async_trait]
impl Driver for WebDriverTab {
    fn id(&self) -> Uuid {
        self.id
    }

    fn browser_id(&self) -> BrowserId {
        self.browser_id.clone()
    }

    async fn navigate_to(&self, url: &str) -> Result<(), DriverError> {
        let guard = self.inner.lock().await;
        let driver = guard.as_ref().ok_or_else(retired_err)?;

        driver.goto(url).await.map_err(map_webdriver_err)?;

        if let Ok(mut at) = self.clock.lock() {
            *at = Some(Instant::now());
        }
        Ok(())
    }

    async fn evaluate(
        &self,
        script: &str,
        limit: Duration,
    ) -> Result<Option<String>, DriverError> {
        let guard = self.inner.lock().await;
        let driver = guard.as_ref().ok_or_else(retired_err)?;

        match tokio::time::timeout(limit, driver.execute(script, Vec::new())).await {
            Err(_) => Err(DriverError::Timeout(format!(
                "script evaluation exceeded {:?}",
                limit
            ))),
            Ok(Err(e)) => Err(map_webdriver_err(e)),
            Ok(Ok(ret)) => Ok(json_to_text(ret.json())),
        }
    }

    async fn page_source(&self) -> Result<String, DriverError> {
        let guard = self.inner.lock().await;
        let driver = guard.as_ref().ok_or_else(retired_err)?;
        driver.source().await.map_err(map_webdriver_err)
    }

    async fn set_timeouts(&self, timeouts: &TimeoutSettings) -> Result<(), DriverError> {
        let guard = self.inner.lock().await;
        let driver = guard.as_ref().ok_or_else(retired_err)?;

        driver
            .set_page_load_timeout(timeouts.page_load)
            .await
            .map_err(map_webdriver_err)?;
        driver
            .set_script_timeout(timeouts.script)
            .await
            .map_err(map_webdriver_err)?;
        driver
            .set_implicit_wait_timeout(timeouts.implicit)
            .await
            .map_err(map_webdriver_err)?;
        Ok(())
    }

    fn is_quit(&self) -> bool {
        self.retired.load(Ordering::SeqCst)
    }

    fn retire(&self) {
        self.retired.store(true, Ordering::SeqCst);
    }

    fn last_navigate_at(&self) -> Option<Instant> {
        self.clock.lock().ok().and_then(|at| *at)
    }

    async fn quit(&self) -> Result<(), DriverError> {
        self.retired.store(true, Ordering::SeqCst);
        let driver = self.inner.lock().await.take();
        if let Some(driver) = driver {
            driver.quit().await.map_err(map_webdriver_err)?;
        }
        Ok(())
    }
}
