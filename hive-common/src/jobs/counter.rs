use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use tokio::sync::Notify;

/// Tracks the completion status of a set of jobs. Every job that attaches to
/// a counter increases it once; every finished job (success or failure)
/// decreases it exactly once. A counter at zero means all attached jobs have
/// finished.
pub struct JobCounter {
    count: AtomicI64,
    notify: Notify,
}

impl JobCounter {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            count: AtomicI64::new(0),
            notify: Notify::new(),
        })
    }

    pub fn increase(&self) {
        self.count.fetch_add(1, Ordering::SeqCst);
    }

    pub fn decrease(&self) {
        let previous = self.count.fetch_sub(1, Ordering::SeqCst);
        if previous - 1 <= 0 {
            self.notify.notify_waiters();
        }
    }

    pub fn is_finished(&self) -> bool {
        self.count.load(Ordering::SeqCst) <= 0
    }

    /// Suspends until the counter reaches zero. This never blocks the
    /// underlying thread: it is the task-runtime equivalent of a fiber
    /// yielding repeatedly while polling readiness.
    pub async fn wait(&self) {
        loop {
            if self.is_finished() {
                return;
            }
            let notified = self.notify.notified();
            if self.is_finished() {
                return;
            }
            notified.await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn starts_finished() {
        let counter = JobCounter::new();
        assert!(counter.is_finished());
        counter.wait().await;
    }

    #[tokio::test]
    async fn increase_then_decrease_unblocks_waiters() {
        let counter = JobCounter::new();
        counter.increase();
        counter.increase();
        assert!(!counter.is_finished());

        let waiter_counter = counter.clone();
        let waiter = tokio::spawn(async move {
            waiter_counter.wait().await;
        });

        tokio::task::yield_now().await;
        counter.decrease();
        tokio::task::yield_now().await;
        assert!(!counter.is_finished());

        counter.decrease();
        waiter.await.unwrap();
        assert!(counter.is_finished());
    }
}
