use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::debug;

use crate::browser::driver::DriverFactory;
use crate::browser::pool::Browser;
use crate::browser::privacy::BrowserId;

struct Entry {
    browser: Arc<Browser>,
    refs: usize,
    evicting: bool,
}

/// Process-scoped registry of browsers keyed by profile identity. Reference
/// counting decides when an evicted browser's runtime is actually torn down;
/// idle browsers stay cached so consecutive fetches reuse the launch.
pub struct BrowserRegistry {
    factory: Arc<dyn DriverFactory>,
    inner: Mutex<HashMap<BrowserId, Entry>>,
}

impl BrowserRegistry {
    pub fn new(factory: Arc<dyn DriverFactory>) -> Self {
        Self {
            factory,
            inner: Mutex::new(HashMap::new()),
        }
    }

    /// Get (or create) the browser for an identity and take a reference on it
    pub async fn checkout(&self, id: &BrowserId) -> Arc<Browser> {
        let mut inner = self.inner.lock().await;
        let entry = inner.entry(id.clone()).or_insert_with(|| {
            debug!("Registering browser {}", id);
            Entry {
                browser: Arc::new(Browser::new(id.clone(), self.factory.clone())),
                refs: 0,
                evicting: false,
            }
        });
        entry.refs += 1;
        entry.browser.clone()
    }

    /// Release a reference. A zero-ref browser flagged for eviction is
    /// forcibly destroyed and removed.
    pub async fn checkin(&self, id: &BrowserId) {
        let doomed = {
            let mut inner = self.inner.lock().await;
            match inner.get_mut(id) {
                Some(entry) => {
                    entry.refs = entry.refs.saturating_sub(1);
                    if entry.refs == 0 && entry.evicting {
                        inner.remove(id).map(|e| e.browser)
                    } else {
                        None
                    }
                }
                None => None,
            }
        };

        if let Some(browser) = doomed {
            browser.destroy_forcibly().await;
        }
    }

    /// Schedule an identity's browser for teardown. Destroys immediately
    /// when nothing holds a reference, otherwise on the last checkin.
    pub async fn evict(&self, id: &BrowserId) {
        let doomed = {
            let mut inner = self.inner.lock().await;
            match inner.get_mut(id) {
                Some(entry) if entry.refs == 0 => inner.remove(id).map(|e| e.browser),
                Some(entry) => {
                    entry.evicting = true;
                    None
                }
                None => None,
            }
        };

        if let Some(browser) = doomed {
            debug!("Evicting browser {}", id);
            browser.destroy_forcibly().await;
        }
    }

    /// Forcibly destroy every registered browser. Used on engine shutdown.
    pub async fn shutdown_all(&self) {
        let browsers: Vec<Arc<Browser>> = {
            let mut inner = self.inner.lock().await;
            inner.drain().map(|(_, entry)| entry.browser).collect()
        };

        for browser in browsers {
            browser.destroy_forcibly().await;
        }
    }

    /// Number of registered browsers
    pub async fn len(&self) -> usize {
        self.inner.lock().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::browser::testing::{test_browser_id, FakeDriverFactory, FakeTabPlan};

    #[tokio::test]
    async fn checkout_caches_browsers_per_identity() {
        let factory = Arc::new(FakeDriverFactory::new(FakeTabPlan::default()));
        let registry = BrowserRegistry::new(factory);
        let id = test_browser_id();

        let first = registry.checkout(&id).await;
        let second = registry.checkout(&id).await;
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(registry.len().await, 1);

        registry.checkin(&id).await;
        registry.checkin(&id).await;
        // Not evicting, so the idle browser stays cached
        assert_eq!(registry.len().await, 1);
    }

    #[tokio::test]
    async fn evict_waits_for_the_last_reference() {
        let factory = Arc::new(FakeDriverFactory::new(FakeTabPlan::default()));
        let registry = BrowserRegistry::new(factory.clone());
        let id = test_browser_id();

        let browser = registry.checkout(&id).await;
        let _driver = browser.new_driver().await.expect("driver");

        registry.evict(&id).await;
        // Still referenced: the entry survives until checkin
        assert_eq!(registry.len().await, 1);

        registry.checkin(&id).await;
        assert_eq!(registry.len().await, 0);
        assert_eq!(factory.shutdown_count(), 1);
        assert!(browser.is_idle().await);
    }

    #[tokio::test]
    async fn evict_of_unreferenced_identity_is_immediate() {
        let factory = Arc::new(FakeDriverFactory::new(FakeTabPlan::default()));
        let registry = BrowserRegistry::new(factory.clone());
        let id = test_browser_id();

        let _ = registry.checkout(&id).await;
        registry.checkin(&id).await;
        registry.evict(&id).await;
        assert_eq!(registry.len().await, 0);
    }

    #[tokio::test]
    async fn shutdown_all_destroys_everything() {
        let factory = Arc::new(FakeDriverFactory::new(FakeTabPlan::default()));
        let registry = BrowserRegistry::new(factory.clone());

        let a = registry.checkout(&test_browser_id()).await;
        let b = registry.checkout(&test_browser_id()).await;
        let _da = a.new_driver().await.expect("driver a");
        let _db = b.new_driver().await.expect("driver b");

        registry.shutdown_all().await;
        assert_eq!(registry.len().await, 0);
        assert_eq!(factory.shutdown_count(), 2);
        assert!(a.is_idle().await);
        assert!(b.is_idle().await);
    }
}
