//! A `sync.WaitGroup`-style counter for async code.
//!
//! [`tokio::sync::Notify`] gives us a wake-up primitive but not a "wait until
//! the counter drains to zero" primitive, so this wraps one around an atomic
//! counter. Used both for the module-level outstanding-task count and for the
//! scheduler's `queueInflight` dispatch ticket.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use tokio::sync::Notify;

#[derive(Clone)]
pub struct WaitGroup {
    inner: Arc<Inner>,
}

struct Inner {
    count: AtomicI64,
    zero: Notify,
}

impl WaitGroup {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                count: AtomicI64::new(0),
                zero: Notify::new(),
            }),
        }
    }

    /// Add `n` (may be negative) to the outstanding count.
    pub fn add(&self, n: i64) {
        let prev = self.inner.count.fetch_add(n, Ordering::AcqRel);
        if prev + n <= 0 {
            self.inner.zero.notify_waiters();
        }
    }

    pub fn done(&self) {
        self.add(-1);
    }

    pub fn count(&self) -> i64 {
        self.inner.count.load(Ordering::Acquire)
    }

    /// Resolves once the counter is at or below zero. If the counter is
    /// already drained, resolves immediately without waiting on a
    /// notification (otherwise a `notify_waiters` that happened before this
    /// call would be missed).
    pub async fn wait(&self) {
        loop {
            if self.inner.count.load(Ordering::Acquire) <= 0 {
                return;
            }
            let notified = self.inner.zero.notified();
            // Re-check after subscribing to avoid a lost wakeup between the
            // load above and registering interest.
            if self.inner.count.load(Ordering::Acquire) <= 0 {
                return;
            }
            notified.await;
        }
    }
}

impl Default for WaitGroup {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn wait_returns_immediately_when_empty() {
        let wg = WaitGroup::new();
        tokio::time::timeout(Duration::from_millis(50), wg.wait())
            .await
            .expect("wait should not block on an empty group");
    }

    #[tokio::test]
    async fn wait_blocks_until_drained() {
        let wg = WaitGroup::new();
        wg.add(2);

        let waiter = wg.clone();
        let handle = tokio::spawn(async move {
            waiter.wait().await;
        });

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!handle.is_finished());

        wg.done();
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!handle.is_finished());

        wg.done();
        handle.await.expect("waiter task should finish");
    }
}
