use std::sync::Arc;
use std::time::Duration;
use chrono::Utc;
use tracing::{debug, info};

use crate::browser::driver::{DriverFactory, TimeoutSettings};
use crate::browser::pool::Browser;
use crate::browser::privacy::PrivacyManager;
use crate::browser::registry::BrowserRegistry;
use crate::browser::remote::RemoteBrowserFactory;
use crate::browser::webdriver::WebDriverFactory;
use crate::cli::config::{EngineConfig, FetchSettings};
use crate::fetch::classify::{classify, status_for};
use crate::fetch::error::FetchError;
use crate::fetch::handlers::HandlerChain;
use crate::fetch::navigate::{InteractResult, NavigateConfig, NavigateTask};
use crate::fetch::result::{FetchResponse, FetchResult, ProtocolStatus, RetryScope};
use crate::fetch::task::FetchTask;
use crate::utils::cancel::CancelToken;
use crate::utils::metrics::{FetchMetrics, MetricsSnapshot};

/// Orchestrates one fetch attempt end to end: identity selection, browser
/// checkout, the driven navigation, and the classification of whatever came
/// back.
pub struct FetchEngine {
    settings: FetchSettings,
    handlers: HandlerChain,
    privacy: Arc<PrivacyManager>,
    registry: Arc<BrowserRegistry>,
    metrics: Arc<FetchMetrics>,
    active: CancelToken,
}

impl FetchEngine {
    /// Build an engine with the backend named in the configuration
    pub fn new(config: &EngineConfig) -> Self {
        let factory: Arc<dyn DriverFactory> = if config.browser.backend == "remote" {
            Arc::new(RemoteBrowserFactory::new(&config.browser))
        } else {
            Arc::new(WebDriverFactory::new(config.browser.clone()))
        };
        Self::with_factory(config, factory)
    }

    pub fn with_factory(config: &EngineConfig, factory: Arc<dyn DriverFactory>) -> Self {
        Self {
            settings: config.fetch.clone(),
            handlers: HandlerChain::new(),
            privacy: Arc::new(PrivacyManager::new(
                config.privacy.clone(),
                config.browser.fingerprints.clone(),
            )),
            registry: Arc::new(BrowserRegistry::new(factory)),
            metrics: Arc::new(FetchMetrics::new()),
            active: CancelToken::new(),
        }
    }

    /// Install navigation phase handlers
    pub fn with_handlers(mut self, handlers: HandlerChain) -> Self {
        self.handlers = handlers;
        self
    }

    pub fn privacy(&self) -> &Arc<PrivacyManager> {
        &self.privacy
    }

    pub fn registry(&self) -> &Arc<BrowserRegistry> {
        &self.registry
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    /// Stop accepting work and tear down every browser. In-flight fetches
    /// end with a canceled status at their next suspension point.
    pub async fn shutdown(&self) {
        info!("Fetch engine shutting down");
        self.active.cancel();
        self.registry.shutdown_all().await;
    }

    /// Run one task to completion. Never panics and never returns an error;
    /// every outcome is folded into the result.
    pub async fn fetch(&self, task: &FetchTask) -> FetchResult {
        if self.active.is_canceled() || task.is_canceled() {
            self.metrics.record_cancellation();
            return self.result_of(task, InteractResult::canceled(), None);
        }

        if task.n_retries() > self.settings.max_retries {
            let error = FetchError::MaxRetriesExceeded(task.n_retries());
            self.metrics.record_failure();
            task.mark_done();
            return self.result_of(
                task,
                InteractResult::failed(RetryScope::Crawl),
                Some(error),
            );
        }

        let selection = self.privacy.select().await;
        if let Some(evicted) = &selection.evicted {
            self.registry.evict(evicted).await;
        }

        let browser = self.registry.checkout(&selection.id).await;
        let outcome = self.attempt(task, &browser).await;
        self.registry.checkin(&selection.id).await;

        match outcome {
            Ok(interact) => {
                if interact.status.retry_scope() == Some(RetryScope::Privacy) {
                    self.privacy.mark_degraded(&selection.id).await;
                }
                match interact.status {
                    ProtocolStatus::Success => self.metrics.record_success(),
                    ProtocolStatus::Retry(_) => self.metrics.record_retry(),
                    ProtocolStatus::Failed(_) => self.metrics.record_failure(),
                    ProtocolStatus::Canceled => {}
                }
                if interact.status != ProtocolStatus::Canceled {
                    task.mark_done();
                }
                self.result_of(task, interact, None)
            }
            Err(error) => {
                let classified = classify(&error);
                if classified.scope == RetryScope::Privacy {
                    self.privacy.mark_degraded(&selection.id).await;
                }
                let status = status_for(&error);
                match status {
                    ProtocolStatus::Retry(_) => self.metrics.record_retry(),
                    ProtocolStatus::Failed(_) => self.metrics.record_failure(),
                    _ => {}
                }
                task.mark_done();
                let interact = InteractResult {
                    status,
                    signal: None,
                    content: None,
                };
                self.result_of(task, interact, Some(error))
            }
        }
    }

    /// One attempt against a checked-out browser. Every driver this opens
    /// is retired before returning, whatever happened.
    async fn attempt(
        &self,
        task: &FetchTask,
        browser: &Arc<Browser>,
    ) -> Result<InteractResult, FetchError> {
        let driver = browser.new_driver().await.map_err(FetchError::from)?;

        let timeouts = TimeoutSettings {
            page_load: Duration::from_secs(self.settings.page_load_timeout_secs),
            script: Duration::from_secs(self.settings.script_timeout_secs),
            ..TimeoutSettings::default()
        };
        if let Err(e) = driver.set_timeouts(&timeouts).await {
            debug!("Could not push session timeouts: {}", e);
        }

        let nav = NavigateTask::new(
            task,
            driver.clone(),
            NavigateConfig::from_settings(&self.settings),
            &self.handlers,
            self.metrics.clone(),
            self.active.clone(),
        );

        match nav.run().await {
            Ok(out) => {
                browser.destroy_driver(&driver).await;
                Ok(out)
            }
            Err(error) => {
                // The classifier decides whether the session is still worth
                // a graceful quit
                if classify(&error).retire_driver {
                    browser.discard_driver(&driver).await;
                } else {
                    browser.destroy_driver(&driver).await;
                }
                Err(error)
            }
        }
    }

    fn result_of(
        &self,
        task: &FetchTask,
        interact: InteractResult,
        error: Option<FetchError>,
    ) -> FetchResult {
        FetchResult {
            task_id: task.id(),
            batch_id: task.batch_id(),
            url: task.url().to_string(),
            n_retries: task.n_retries(),
            response: FetchResponse {
                status: Some(interact.status),
                signal: interact.signal,
                content: interact.content,
            },
            error,
            fetched_at: Utc::now(),
        }
    }
}
