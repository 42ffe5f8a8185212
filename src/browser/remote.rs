use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use crate::browser::driver::{Driver, DriverError, DriverFactory, NavClock, TimeoutSettings};
use crate::browser::privacy::BrowserId;
use crate::cli::config::BrowserSettings;

#[derive(Debug, Serialize)]
struct SessionRequest<'a> {
    profile: String,
    fingerprint: &'a str,
    headless: bool,
}

#[derive(Debug, Deserialize)]
struct SessionResponse {
    session_id: String,
}

#[derive(Debug, Deserialize)]
struct EvaluateResponse {
    value: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SourceResponse {
    source: String,
}

fn map_reqwest_err(err: reqwest::Error) -> DriverError {
    if err.is_connect() {
        DriverError::ConnectionRefused(err.to_string())
    } else if err.is_timeout() {
        DriverError::Timeout(err.to_string())
    } else {
        DriverError::Other(err.to_string())
    }
}

fn check_session_status(status: reqwest::StatusCode) -> Result<(), DriverError> {
    if status == reqwest::StatusCode::NOT_FOUND || status == reqwest::StatusCode::GONE {
        Err(DriverError::SessionLost(format!(
            "browser service returned {}",
            status
        )))
    } else if !status.is_success() {
        Err(DriverError::Other(format!(
            "browser service returned {}",
            status
        )))
    } else {
        Ok(())
    }
}

/// Driver factory backed by a remote browser-service speaking a small HTTP
/// session protocol. The service owns the browser processes; this side only
/// drives sessions.
pub struct RemoteBrowserFactory {
    client: Client,
    base_url: String,
    headless: bool,
}

impl RemoteBrowserFactory {
    /// Create a new factory. The base URL can be overridden with the
    /// BROWSER_SERVICE_URL environment variable.
    pub fn new(settings: &BrowserSettings) -> Self {
        let base_url = std::env::var("BROWSER_SERVICE_URL")
            .unwrap_or_else(|_| settings.remote_url.clone());

        let client = Client::builder()
            .timeout(Duration::from_secs(120))
            .build()
            .unwrap_or_default();

        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            headless: settings.headless,
        }
    }

    /// Create a factory for an explicit base URL
    pub fn with_base_url(base_url: &str, headless: bool) -> Self {
        Self {
            client: Client::builder()
                .timeout(Duration::from_secs(120))
                .build()
                .unwrap_or_default(),
            base_url: base_url.trim_end_matches('/').to_string(),
            headless,
        }
    }
}

#[async_trait]
impl DriverFactory for RemoteBrowserFactory {
    async fn launch(&self, id: &BrowserId) -> Result<(), DriverError> {
        let endpoint = format!("{}/health", self.base_url);
        let response = self
            .client
            .get(&endpoint)
            .send()
            .await
            .map_err(map_reqwest_err)?;

        if !response.status().is_success() {
            return Err(DriverError::ConnectionRefused(format!(
                "browser service health check returned {}",
                response.status()
            )));
        }

        debug!("Browser service ready for {}", id);
        Ok(())
    }

    async fn open_tab(
        &self,
        id: &BrowserId,
        clock: NavClock,
    ) -> Result<Arc<dyn Driver>, DriverError> {
        let endpoint = format!("{}/session", self.base_url);
        let request = SessionRequest {
            profile: id.data_dir.display().to_string(),
            fingerprint: &id.fingerprint,
            headless: self.headless,
        };

        let response = self
            .client
            .post(&endpoint)
            .json(&request)
            .send()
            .await
            .map_err(map_reqwest_err)?;
        check_session_status(response.status())?;

        let session: SessionResponse = response
            .json()
            .await
            .map_err(|e| DriverError::Other(format!("invalid session response: {}", e)))?;

        debug!("Opened remote session {} for {}", session.session_id, id);

        Ok(Arc::new(RemoteTab {
            id: Uuid::new_v4(),
            browser_id: id.clone(),
            session_id: session.session_id,
            client: self.client.clone(),
            base_url: self.base_url.clone(),
            retired: AtomicBool::new(false),
            clock,
        }))
    }

    async fn shutdown(&self, id: &BrowserId) {
        let endpoint = format!("{}/profile/{}/shutdown", self.base_url, id.uuid);
        if let Err(e) = self.client.post(&endpoint).send().await {
            debug!("Browser service shutdown for {} failed: {}", id, e);
        }
    }
}

/// One tab driven through the remote browser-service protocol
pub struct RemoteTab {
    id: Uuid,
    browser_id: BrowserId,
    session_id: String,
    client: Client,
    base_url: String,
    retired: AtomicBool,
    clock: NavClock,
}

impl RemoteTab {
    fn session_url(&self, tail: &str) -> String {
        format!("{}/session/{}/{}", self.base_url, self.session_id, tail)
    }

    fn ensure_live(&self) -> Result<(), DriverError> {
        if self.retired.load(Ordering::SeqCst) {
            Err(DriverError::SessionLost(
                "driver has been retired".to_string(),
            ))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl Driver for RemoteTab {
    fn id(&self) -> Uuid {
        self.id
    }

    fn browser_id(&self) -> BrowserId {
        self.browser_id.clone()
    }

    async fn navigate_to(&self, url: &str) -> Result<(), DriverError> {
        self.ensure_live()?;
        let response = self
            .client
            .post(self.session_url("navigate"))
            .json(&serde_json::json!({ "url": url }))
            .send()
            .await
            .map_err(map_reqwest_err)?;
        check_session_status(response.status())?;

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
        self.ensure_live()?;
        let request = self
            .client
            .post(self.session_url("evaluate"))
            .json(&serde_json::json!({ "script": script }))
            .send();

        let response = match tokio::time::timeout(limit, request).await {
            Err(_) => {
                return Err(DriverError::Timeout(format!(
                    "script evaluation exceeded {:?}",
                    limit
                )))
            }
            Ok(Err(e)) => return Err(map_reqwest_err(e)),
            Ok(Ok(response)) => response,
        };
        check_session_status(response.status())?;

        let body: EvaluateResponse = response
            .json()
            .await
            .map_err(|e| DriverError::Other(format!("invalid evaluate response: {}", e)))?;
        Ok(body.value)
    }

    async fn page_source(&self) -> Result<String, DriverError> {
        self.ensure_live()?;
        let response = self
            .client
            .get(self.session_url("source"))
            .send()
            .await
            .map_err(map_reqwest_err)?;
        check_session_status(response.status())?;

        let body: SourceResponse = response
            .json()
            .await
            .map_err(|e| DriverError::Other(format!("invalid source response: {}", e)))?;
        Ok(body.source)
    }

    async fn set_timeouts(&self, timeouts: &TimeoutSettings) -> Result<(), DriverError> {
        self.ensure_live()?;
        let response = self
            .client
            .post(self.session_url("timeouts"))
            .json(&serde_json::json!({
                "page_load_ms": timeouts.page_load.as_millis() as u64,
                "script_ms": timeouts.script.as_millis() as u64,
                "implicit_ms": timeouts.implicit.as_millis() as u64,
            }))
            .send()
            .await
            .map_err(map_reqwest_err)?;
        check_session_status(response.status())
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
        let endpoint = format!("{}/session/{}", self.base_url, self.session_id);
        let response = self
            .client
            .delete(&endpoint)
            .send()
            .await
            .map_err(map_reqwest_err)?;
        check_session_status(response.status())
    }
}
