//! Scripted driver fakes shared by the pool, state machine, and engine tests.

use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::{Duration, Instant};
use async_trait::async_trait;
use uuid::Uuid;

use crate::browser::driver::{nav_clock, Driver, DriverError, DriverFactory, NavClock, TimeoutSettings};
use crate::browser::privacy::BrowserId;

pub(crate) fn test_browser_id() -> BrowserId {
    BrowserId {
        uuid: Uuid::new_v4(),
        data_dir: PathBuf::from("/tmp/rendercrawl-test/profile"),
        fingerprint: "linux_chrome".to_string(),
    }
}

/// One scripted evaluation outcome
#[derive(Debug, Clone)]
pub(crate) enum EvalStep {
    Value(Option<String>),
    SessionLost,
    Timeout,
    Refused,
    Fail(String),
}

impl EvalStep {
    fn into_result(self) -> Result<Option<String>, DriverError> {
        match self {
            EvalStep::Value(v) => Ok(v),
            EvalStep::SessionLost => Err(DriverError::SessionLost(
                "invalid session id: session deleted".to_string(),
            )),
            EvalStep::Timeout => Err(DriverError::Timeout(
                "script evaluation exceeded limit".to_string(),
            )),
            EvalStep::Refused => Err(DriverError::ConnectionRefused(
                "connection refused".to_string(),
            )),
            EvalStep::Fail(message) => Err(DriverError::Other(message)),
        }
    }
}

/// Behavior template for the tabs a fake factory produces
#[derive(Debug, Clone)]
pub(crate) struct FakeTabPlan {
    /// Readiness-probe results, consumed in order; `ready_default` repeats
    /// once the queue is empty
    pub ready_results: Vec<EvalStep>,
    pub ready_default: EvalStep,
    pub feature: EvalStep,
    pub scroll: EvalStep,
    pub page_source: String,
    pub fail_navigate: bool,
    pub fail_quit: bool,
}

impl Default for FakeTabPlan {
    fn default() -> Self {
        Self {
            ready_results: Vec::new(),
            ready_default: EvalStep::Value(Some("complete".to_string())),
            feature: EvalStep::Value(Some(
                "complete|https://example.com/a https://example.com/b".to_string(),
            )),
            scroll: EvalStep::Value(Some("ok".to_string())),
            page_source: "<html><body>ok</body></html>".to_string(),
            fail_navigate: false,
            fail_quit: false,
        }
    }
}

/// Scripted in-memory driver
pub(crate) struct FakeDriver {
    id: Uuid,
    browser_id: BrowserId,
    retired: AtomicBool,
    clock: NavClock,
    ready: StdMutex<VecDeque<EvalStep>>,
    ready_default: EvalStep,
    feature: EvalStep,
    scroll: EvalStep,
    page_source: String,
    fail_navigate: bool,
    fail_quit: bool,
    pub navigations: AtomicUsize,
    pub ready_evals: AtomicUsize,
    pub scrolls: AtomicUsize,
    pub quits: AtomicUsize,
}

impl FakeDriver {
    pub fn new(browser_id: BrowserId, plan: FakeTabPlan, clock: NavClock) -> Self {
        Self {
            id: Uuid::new_v4(),
            browser_id,
            retired: AtomicBool::new(false),
            clock,
            ready: StdMutex::new(plan.ready_results.into_iter().collect()),
            ready_default: plan.ready_default,
            feature: plan.feature,
            scroll: plan.scroll,
            page_source: plan.page_source,
            fail_navigate: plan.fail_navigate,
            fail_quit: plan.fail_quit,
            navigations: AtomicUsize::new(0),
            ready_evals: AtomicUsize::new(0),
            scrolls: AtomicUsize::new(0),
            quits: AtomicUsize::new(0),
        }
    }

    pub fn from_plan(plan: FakeTabPlan) -> Self {
        Self::new(test_browser_id(), plan, nav_clock())
    }
}

#[async_trait]
impl Driver for FakeDriver {
    fn id(&self) -> Uuid {
        self.id
    }

    fn browser_id(&self) -> BrowserId {
        self.browser_id.clone()
    }

    async fn navigate_to(&self, _url: &str) -> Result<(), DriverError> {
        if self.fail_navigate {
            return Err(DriverError::Other("navigation refused by fake".to_string()));
        }
        self.navigations.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut at) = self.clock.lock() {
            *at = Some(Instant::now());
        }
        Ok(())
    }

    async fn evaluate(
        &self,
        script: &str,
        _limit: Duration,
    ) -> Result<Option<String>, DriverError> {
        if script.contains("scrollTo") {
            self.scrolls.fetch_add(1, Ordering::SeqCst);
            return self.scroll.clone().into_result();
        }
        if script.contains("querySelectorAll") {
            return self.feature.clone().into_result();
        }

        self.ready_evals.fetch_add(1, Ordering::SeqCst);
        let step = self
            .ready
            .lock()
            .expect("ready queue")
            .pop_front()
            .unwrap_or_else(|| self.ready_default.clone());
        step.into_result()
    }

    async fn page_source(&self) -> Result<String, DriverError> {
        Ok(self.page_source.clone())
    }

    async fn set_timeouts(&self, _timeouts: &TimeoutSettings) -> Result<(), DriverError> {
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
        self.quits.fetch_add(1, Ordering::SeqCst);
        if self.fail_quit {
            Err(DriverError::Other("quit refused by fake".to_string()))
        } else {
            Ok(())
        }
    }
}

/// Factory producing scripted tabs from a shared plan
pub(crate) struct FakeDriverFactory {
    plan: StdMutex<FakeTabPlan>,
    fail_launch: AtomicBool,
    launches: AtomicUsize,
    shutdowns: AtomicUsize,
    opened: StdMutex<Vec<Arc<FakeDriver>>>,
}

impl FakeDriverFactory {
    pub fn new(plan: FakeTabPlan) -> Self {
        Self {
            plan: StdMutex::new(plan),
            fail_launch: AtomicBool::new(false),
            launches: AtomicUsize::new(0),
            shutdowns: AtomicUsize::new(0),
            opened: StdMutex::new(Vec::new()),
        }
    }

    pub fn failing_launch() -> Self {
        let factory = Self::new(FakeTabPlan::default());
        factory.fail_launch.store(true, Ordering::SeqCst);
        factory
    }

    pub fn set_fail_launch(&self, fail: bool) {
        self.fail_launch.store(fail, Ordering::SeqCst);
    }

    pub fn launch_count(&self) -> usize {
        self.launches.load(Ordering::SeqCst)
    }

    pub fn shutdown_count(&self) -> usize {
        self.shutdowns.load(Ordering::SeqCst)
    }

    pub fn opened_drivers(&self) -> Vec<Arc<FakeDriver>> {
        self.opened.lock().expect("opened list").clone()
    }
}

#[async_trait]
impl DriverFactory for FakeDriverFactory {
    async fn launch(&self, _id: &BrowserId) -> Result<(), DriverError> {
        self.launches.fetch_add(1, Ordering::SeqCst);
        if self.fail_launch.load(Ordering::SeqCst) {
            Err(DriverError::ConnectionRefused(
                "connection refused".to_string(),
            ))
        } else {
            Ok(())
        }
    }

    async fn open_tab(
        &self,
        id: &BrowserId,
        clock: NavClock,
    ) -> Result<Arc<dyn Driver>, DriverError> {
        let plan = self.plan.lock().expect("plan").clone();
        let driver = Arc::new(FakeDriver::new(id.clone(), plan, clock));
        self.opened.lock().expect("opened list").push(driver.clone());
        Ok(driver)
    }

    async fn shutdown(&self, _id: &BrowserId) {
        self.shutdowns.fetch_add(1, Ordering::SeqCst);
    }
}
