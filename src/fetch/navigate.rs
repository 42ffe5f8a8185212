use std::sync::{Arc, OnceLock};
use std::time::Duration;
use chrono::Utc;
use rand::Rng;
use regex::Regex;
use tracing::{debug, warn};

use crate::browser::driver::{Driver, DriverError};
use crate::cli::config::FetchSettings;
use crate::fetch::error::FetchError;
use crate::fetch::handlers::{HandlerChain, HandlerFlow, Phase, PhaseContext};
use crate::fetch::result::{DomSignal, ProtocolStatus, RetryScope};
use crate::fetch::scripts;
use crate::fetch::task::FetchTask;
use crate::utils::cancel::{self, Bounded, CancelToken};
use crate::utils::metrics::FetchMetrics;

/// Error-page codes worth retrying over the same protocol path. Anything
/// else on an error page is treated as a hard protocol failure.
const RETRYABLE_MARKERS: [&str; 4] = [
    "ERR_CONNECTION_REFUSED",
    "ERR_CONNECTION_RESET",
    "ERR_TIMED_OUT",
    "ERR_NETWORK_CHANGED",
];

static ERROR_PAGE: OnceLock<Regex> = OnceLock::new();

fn error_page_pattern() -> &'static Regex {
    ERROR_PAGE.get_or_init(|| {
        Regex::new(r"chrome-error://|about:neterror|net::|ERR_[A-Z_]+").expect("valid pattern")
    })
}

/// Timing and behavior knobs for one navigation
#[derive(Debug, Clone)]
pub struct NavigateConfig {
    pub script_timeout: Duration,
    pub eval_timeout: Duration,
    pub scroll_down_count: u32,
    pub js_invading_enabled: bool,
    pub poll_interval: Duration,
    pub nav_throttle: Duration,
}

impl NavigateConfig {
    pub fn from_settings(settings: &FetchSettings) -> Self {
        Self {
            script_timeout: Duration::from_secs(settings.script_timeout_secs),
            eval_timeout: Duration::from_secs(settings.eval_timeout_secs),
            scroll_down_count: settings.scroll_down_count,
            js_invading_enabled: settings.js_invading_enabled,
            poll_interval: Duration::from_millis(settings.poll_interval_ms),
            nav_throttle: Duration::from_secs(settings.nav_throttle_secs),
        }
    }

    /// Readiness poll rounds. Leaves a five second margin under the script
    /// timeout so the last probe still has room to return.
    pub fn max_round(&self) -> u64 {
        self.script_timeout.as_secs().saturating_sub(5).max(1)
    }
}

impl Default for NavigateConfig {
    fn default() -> Self {
        Self {
            script_timeout: Duration::from_secs(60),
            eval_timeout: Duration::from_secs(10),
            scroll_down_count: 5,
            js_invading_enabled: true,
            poll_interval: Duration::from_millis(500),
            nav_throttle: Duration::from_secs(0),
        }
    }
}

/// Outcome of one driven navigation
#[derive(Debug, Clone, PartialEq)]
pub struct InteractResult {
    pub status: ProtocolStatus,
    pub signal: Option<DomSignal>,
    pub content: Option<String>,
}

impl InteractResult {
    pub fn canceled() -> Self {
        Self {
            status: ProtocolStatus::Canceled,
            signal: None,
            content: None,
        }
    }

    pub fn failed(scope: RetryScope) -> Self {
        Self {
            status: ProtocolStatus::Failed(scope),
            signal: None,
            content: None,
        }
    }
}

enum ReadyOutcome {
    Ready(String),
    /// The page never finished loading but produced a DOM; proceed with
    /// what rendered so far
    PartialLoad,
    /// The document never even grew a body
    NoSignal,
    ErrorPage(ProtocolStatus, DomSignal),
    Aborted(InteractResult),
}

/// Drives one task through a driver: throttle, navigate, poll readiness,
/// scroll, extract features, capture content. Cancellation is checked at
/// every suspension point.
pub struct NavigateTask<'a> {
    task: &'a FetchTask,
    driver: Arc<dyn Driver>,
    config: NavigateConfig,
    handlers: &'a HandlerChain,
    metrics: Arc<FetchMetrics>,
    active: CancelToken,
}

impl<'a> NavigateTask<'a> {
    pub fn new(
        task: &'a FetchTask,
        driver: Arc<dyn Driver>,
        config: NavigateConfig,
        handlers: &'a HandlerChain,
        metrics: Arc<FetchMetrics>,
        active: CancelToken,
    ) -> Self {
        Self {
            task,
            driver,
            config,
            handlers,
            metrics,
            active,
        }
    }

    pub async fn run(&self) -> Result<InteractResult, FetchError> {
        if let Some(out) = self.checkpoint()? {
            return Ok(out);
        }

        let ctx = PhaseContext {
            phase: Phase::WillNavigate,
            url: self.task.url(),
            ready_state: None,
        };
        match self.handlers.run(&ctx) {
            HandlerFlow::Continue => {}
            HandlerFlow::Break => {
                return Ok(InteractResult {
                    status: ProtocolStatus::Success,
                    signal: None,
                    content: None,
                })
            }
            HandlerFlow::Fail(scope) => return Ok(InteractResult::failed(scope)),
        }

        self.throttle().await;
        if let Some(out) = self.checkpoint()? {
            return Ok(out);
        }

        self.driver
            .navigate_to(self.task.url())
            .await
            .map_err(FetchError::from)?;
        self.metrics.record_navigation();

        let ready_state = match self.wait_for_ready().await? {
            ReadyOutcome::Ready(state) => Some(state),
            ReadyOutcome::PartialLoad => {
                debug!("Page {} loaded partially, continuing", self.task.url());
                None
            }
            ReadyOutcome::NoSignal => {
                warn!("No DOM signal from {}", self.task.url());
                return Ok(InteractResult::failed(RetryScope::Privacy));
            }
            ReadyOutcome::ErrorPage(status, signal) => {
                return Ok(InteractResult {
                    status,
                    signal: Some(signal),
                    content: None,
                })
            }
            ReadyOutcome::Aborted(out) => return Ok(out),
        };

        if let Some(out) = self.checkpoint()? {
            return Ok(out);
        }

        let ctx = PhaseContext {
            phase: Phase::DocumentReady,
            url: self.task.url(),
            ready_state: ready_state.as_deref(),
        };
        match self.handlers.run(&ctx) {
            HandlerFlow::Continue => {}
            HandlerFlow::Break => return Ok(self.finish(None).await),
            HandlerFlow::Fail(scope) => return Ok(InteractResult::failed(scope)),
        }

        if self.config.js_invading_enabled {
            self.scroll().await;
            if let Some(out) = self.checkpoint()? {
                return Ok(out);
            }
        }

        let signal = self.compute_features().await?;

        let ctx = PhaseContext {
            phase: Phase::FeatureComputed,
            url: self.task.url(),
            ready_state: signal.as_ref().map(|s| s.ready_state.as_str()),
        };
        if let HandlerFlow::Fail(scope) = self.handlers.run(&ctx) {
            return Ok(InteractResult::failed(scope));
        }

        Ok(self.finish(signal).await)
    }

    /// Engine shutdown ends the attempt with a canceled result; a canceled
    /// task is an error so the classifier can route the retry.
    fn checkpoint(&self) -> Result<Option<InteractResult>, FetchError> {
        if self.active.is_canceled() {
            self.metrics.record_cancellation();
            return Ok(Some(InteractResult::canceled()));
        }
        if self.task.is_canceled() {
            self.metrics.record_cancellation();
            return Err(FetchError::Canceled);
        }
        Ok(None)
    }

    /// Sleep that wakes early on either cancellation signal
    async fn pause(&self, delay: Duration) {
        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            _ = self.active.cancelled() => {}
            _ = self.task.cancel_token().cancelled() => {}
        }
    }

    /// Hold back when the profile navigated too recently. A profile with no
    /// navigation yet falls back to the crawl-side fetch record. The jitter
    /// keeps request spacing from looking mechanical.
    async fn throttle(&self) {
        if self.config.nav_throttle.is_zero() {
            return;
        }
        let pending = match self.driver.last_navigate_at() {
            Some(last) => {
                let elapsed = last.elapsed();
                (elapsed < self.config.nav_throttle).then(|| self.config.nav_throttle - elapsed)
            }
            None => self.task.page().prev_fetch_at.and_then(|prev| {
                let age = Utc::now().signed_duration_since(prev).to_std().ok()?;
                (age < self.config.nav_throttle).then(|| self.config.nav_throttle - age)
            }),
        };
        if let Some(wait) = pending {
            let jitter = rand::thread_rng().gen_range(250..=750);
            let wait = wait + Duration::from_millis(jitter);
            debug!("Throttling {} for {:?}", self.task.url(), wait);
            self.pause(wait).await;
        }
    }

    async fn wait_for_ready(&self) -> Result<ReadyOutcome, FetchError> {
        let max_round = self.config.max_round();
        let mut last: Option<String> = None;

        for _ in 0..max_round {
            if self.active.is_canceled() {
                self.metrics.record_cancellation();
                return Ok(ReadyOutcome::Aborted(InteractResult::canceled()));
            }
            if self.task.is_canceled() {
                self.metrics.record_cancellation();
                return Err(FetchError::Canceled);
            }

            let probe = self
                .driver
                .evaluate(scripts::READY_PROBE, self.config.eval_timeout);
            match cancel::bounded(probe, self.config.eval_timeout, self.task.cancel_token()).await
            {
                Bounded::Completed(Ok(Some(value))) => {
                    if let Some(href) = value.strip_prefix("error:") {
                        return Ok(self.classify_error_page(href));
                    }
                    if value == "timeout" {
                        last = Some(value);
                    } else {
                        return Ok(ReadyOutcome::Ready(value));
                    }
                }
                Bounded::Completed(Ok(None)) => last = None,
                Bounded::Completed(Err(e)) => return Err(FetchError::from(e)),
                Bounded::TimedOut => {
                    return Err(FetchError::ScriptTimeout(
                        "readiness probe exceeded its budget".to_string(),
                    ))
                }
                Bounded::Canceled => {
                    self.metrics.record_cancellation();
                    return Err(FetchError::Canceled);
                }
            }

            self.pause(self.config.poll_interval).await;
        }

        if last.as_deref() == Some("timeout") {
            return Ok(ReadyOutcome::PartialLoad);
        }
        if self.driver.is_quit() {
            return Err(FetchError::SessionLost(
                "driver went away during readiness wait".to_string(),
            ));
        }
        Ok(ReadyOutcome::NoSignal)
    }

    fn classify_error_page(&self, href: &str) -> ReadyOutcome {
        let code = error_page_pattern()
            .find(href)
            .map(|m| m.as_str())
            .unwrap_or("unknown");
        warn!("Error page at {}: {} ({})", self.task.url(), href, code);

        let retryable = RETRYABLE_MARKERS.iter().any(|m| href.contains(m));
        let status = if retryable {
            ProtocolStatus::Retry(RetryScope::Protocol)
        } else {
            ProtocolStatus::Failed(RetryScope::Protocol)
        };
        let signal = DomSignal {
            ready_state: "error".to_string(),
            urls: vec![href.to_string()],
        };
        ReadyOutcome::ErrorPage(status, signal)
    }

    /// Best-effort reader emulation. A failed scroll step never fails the
    /// fetch.
    async fn scroll(&self) {
        let jitter: i64 = rand::thread_rng().gen_range(-1..=2);
        let count = (self.config.scroll_down_count as i64 + jitter).max(3) as u32;

        for step in 1..=count {
            if self.active.is_canceled() || self.task.is_canceled() {
                return;
            }
            let script = scripts::scroll_script(step, count);
            if let Err(e) = self.driver.evaluate(&script, self.config.eval_timeout).await {
                debug!("Scroll step {} of {} failed: {}", step, count, e);
                return;
            }
            let dwell = Duration::from_millis(rand::thread_rng().gen_range(300..=800));
            self.pause(dwell).await;
        }
    }

    async fn compute_features(&self) -> Result<Option<DomSignal>, FetchError> {
        match self
            .driver
            .evaluate(scripts::FEATURE_PROBE, self.config.eval_timeout)
            .await
        {
            Ok(payload) => {
                self.metrics.record_evaluation();
                Ok(payload.as_deref().and_then(DomSignal::parse))
            }
            Err(DriverError::Timeout(msg)) => Err(FetchError::ScriptTimeout(msg)),
            Err(e) => {
                let err = FetchError::from(e);
                if let FetchError::ElementNotFound(msg) = &err {
                    warn!("Feature probe matched nothing on {}: {}", self.task.url(), msg);
                    return Ok(None);
                }
                Err(err)
            }
        }
    }

    async fn finish(&self, signal: Option<DomSignal>) -> InteractResult {
        let content = match self.driver.page_source().await {
            Ok(source) => Some(source),
            Err(e) => {
                debug!("Could not capture page source for {}: {}", self.task.url(), e);
                None
            }
        };
        InteractResult {
            status: ProtocolStatus::Success,
            signal,
            content,
        }
    }
}
