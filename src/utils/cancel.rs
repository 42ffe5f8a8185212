use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;

/// Cooperative cancellation token shared between a task owner and the
/// suspension points inside a fetch attempt.
#[derive(Clone, Debug)]
pub struct CancelToken {
    inner: Arc<Inner>,
}

#[derive(Debug)]
struct Inner {
    flag: AtomicBool,
    notify: Notify,
}

impl CancelToken {
    /// Create a new, un-canceled token
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                flag: AtomicBool::new(false),
                notify: Notify::new(),
            }),
        }
    }

    /// Request cancellation and wake every waiter
    pub fn cancel(&self) {
        self.inner.flag.store(true, Ordering::SeqCst);
        self.inner.notify.notify_waiters();
    }

    /// Check the flag without suspending
    pub fn is_canceled(&self) -> bool {
        self.inner.flag.load(Ordering::SeqCst)
    }

    /// Suspend until the token is canceled
    pub async fn cancelled(&self) {
        loop {
            if self.is_canceled() {
                return;
            }
            let notified = self.inner.notify.notified();
            // Re-check after registering so a cancel between the check and
            // the registration cannot be missed
            if self.is_canceled() {
                return;
            }
            notified.await;
        }
    }
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}

/// Outcome of racing an operation against a timer and a cancellation token
#[derive(Debug)]
pub enum Bounded<T> {
    Completed(T),
    TimedOut,
    Canceled,
}

/// Race `fut` against `limit` and `cancel`. The losing operation is dropped,
/// so a canceled wait never leaks the underlying future.
pub async fn bounded<F>(fut: F, limit: Duration, cancel: &CancelToken) -> Bounded<F::Output>
where
    F: Future,
{
    tokio::select! {
        out = fut => Bounded::Completed(out),
        _ = tokio::time::sleep(limit) => Bounded::TimedOut,
        _ = cancel.cancelled() => Bounded::Canceled,
    }
}

/// Cancellable sleep. Returns false if the token fired before the delay
/// elapsed.
pub async fn idle(delay: Duration, cancel: &CancelToken) -> bool {
    tokio::select! {
        _ = tokio::time::sleep(delay) => true,
        _ = cancel.cancelled() => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn bounded_times_out() {
        let cancel = CancelToken::new();
        let never = std::future::pending::<()>();
        match bounded(never, Duration::from_secs(2), &cancel).await {
            Bounded::TimedOut => {}
            other => panic!("expected timeout, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn bounded_completes() {
        let cancel = CancelToken::new();
        match bounded(async { 7 }, Duration::from_secs(2), &cancel).await {
            Bounded::Completed(7) => {}
            other => panic!("expected completion, got {:?}", other),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn bounded_observes_cancellation() {
        let cancel = CancelToken::new();
        let waiter = cancel.clone();
        let handle = tokio::spawn(async move {
            bounded(std::future::pending::<()>(), Duration::from_secs(60), &waiter).await
        });
        tokio::time::sleep(Duration::from_millis(10)).await;
        cancel.cancel();
        match handle.await.expect("join") {
            Bounded::Canceled => {}
            other => panic!("expected canceled, got {:?}", other),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn idle_aborts_on_cancel() {
        let cancel = CancelToken::new();
        let waiter = cancel.clone();
        let handle = tokio::spawn(async move { idle(Duration::from_secs(30), &waiter).await });
        tokio::time::sleep(Duration::from_millis(5)).await;
        cancel.cancel();
        assert!(!handle.await.expect("join"));
    }

    #[test]
    fn cancel_is_sticky() {
        let token = CancelToken::new();
        assert!(!token.is_canceled());
        token.cancel();
        assert!(token.is_canceled());
        token.cancel();
        assert!(token.is_canceled());
    }
}
