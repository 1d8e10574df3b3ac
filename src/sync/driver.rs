//! Subscription driver.
//!
//! Runs one [`PollCycle`] on a fixed interval. The cycle is awaited inline,
//! so a new cycle never starts before the previous one finished, and
//! missed ticks are delayed rather than bursted.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use super::SyncError;
use crate::codes;

#[derive(Debug, Default)]
struct CancelInner {
    cancelled: AtomicBool,
    notify: Notify,
}

/// Cooperative cancellation flag shared by a subscription and its owner.
#[derive(Debug, Clone, Default)]
pub struct Cancellation {
    inner: Arc<CancelInner>,
}

impl Cancellation {
    /// New, not cancelled.
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation and wake any waiter.
    pub fn cancel(&self) {
        self.inner.cancelled.store(true, Ordering::SeqCst);
        self.inner.notify.notify_waiters();
    }

    /// Whether cancellation was requested.
    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::SeqCst)
    }

    /// Fail with [`SyncError::Cancelled`] once cancelled.
    ///
    /// Called immediately before every durable write.
    pub fn check(&self) -> Result<(), SyncError> {
        if self.is_cancelled() {
            Err(SyncError::Cancelled)
        } else {
            Ok(())
        }
    }

    /// Resolve once cancelled.
    pub async fn cancelled(&self) {
        loop {
            let notified = self.inner.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if self.is_cancelled() {
                return;
            }
            notified.await;
        }
    }
}

/// One unit of periodic sync work.
pub trait PollCycle: Send + 'static {
    /// Label for logs.
    fn name(&self) -> &'static str;

    /// Run a single cycle. Must check `cancel` before each write.
    fn run_cycle(
        &mut self,
        cancel: &Cancellation,
    ) -> impl Future<Output = Result<(), SyncError>> + Send;
}

/// Owner side of a running subscription.
#[derive(Debug)]
pub struct SubscriptionHandle {
    cancel: Cancellation,
    join: JoinHandle<()>,
}

impl SubscriptionHandle {
    /// Stop scheduling cycles and wait for the current one to unwind.
    pub async fn shutdown(self) {
        self.cancel.cancel();
        if let Err(e) = self.join.await {
            warn!(error = %e, "subscription task ended abnormally");
        }
    }
}

/// Spawn `cycle` on a tokio task, running every `period`.
pub fn spawn_subscription<P: PollCycle>(mut cycle: P, period: Duration) -> SubscriptionHandle {
    let cancel = Cancellation::new();
    let task_cancel = cancel.clone();

    let join = tokio::spawn(async move {
        let name = cycle.name();
        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!(subscription = name, period_ms = period.as_millis() as u64, "subscription started");

        loop {
            tokio::select! {
                _ = task_cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }
            if task_cancel.is_cancelled() {
                break;
            }
            match cycle.run_cycle(&task_cancel).await {
                Ok(()) => {}
                Err(SyncError::Cancelled) => break,
                Err(e @ SyncError::Store(_)) => {
                    error!(
                        code = codes::STORE_WRITE_FAILED,
                        subscription = name,
                        error = %e,
                        "persisting sync state failed"
                    );
                }
                Err(e) => {
                    warn!(
                        code = codes::EVENT_POLL_FAILED,
                        subscription = name,
                        error = %e,
                        "poll cycle failed"
                    )
                }
            }
        }

        debug!(subscription = name, "subscription stopped");
    });

    SubscriptionHandle { cancel, join }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    struct Counter {
        runs: Arc<AtomicUsize>,
        concurrent: Arc<AtomicUsize>,
        max_concurrent: Arc<AtomicUsize>,
    }

    impl PollCycle for Counter {
        fn name(&self) -> &'static str {
            "counter"
        }

        async fn run_cycle(&mut self, cancel: &Cancellation) -> Result<(), SyncError> {
            let now = self.concurrent.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_concurrent.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(15)).await;
            self.concurrent.fetch_sub(1, Ordering::SeqCst);
            cancel.check()?;
            self.runs.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_cycles_never_overlap() {
        let runs = Arc::new(AtomicUsize::new(0));
        let max_concurrent = Arc::new(AtomicUsize::new(0));
        let handle = spawn_subscription(
            Counter {
                runs: runs.clone(),
                concurrent: Arc::new(AtomicUsize::new(0)),
                max_concurrent: max_concurrent.clone(),
            },
            Duration::from_millis(1),
        );

        tokio::time::sleep(Duration::from_millis(120)).await;
        handle.shutdown().await;

        assert!(runs.load(Ordering::SeqCst) >= 2);
        assert_eq!(max_concurrent.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_shutdown_stops_scheduling() {
        let runs = Arc::new(AtomicUsize::new(0));
        let handle = spawn_subscription(
            Counter {
                runs: runs.clone(),
                concurrent: Arc::new(AtomicUsize::new(0)),
                max_concurrent: Arc::new(AtomicUsize::new(0)),
            },
            Duration::from_millis(1),
        );
        tokio::time::sleep(Duration::from_millis(40)).await;
        handle.shutdown().await;

        let after = runs.load(Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(40)).await;
        assert_eq!(runs.load(Ordering::SeqCst), after);
    }

    #[tokio::test]
    async fn test_cancellation_wakes_waiter() {
        let cancel = Cancellation::new();
        let waiter = {
            let cancel = cancel.clone();
            tokio::spawn(async move { cancel.cancelled().await })
        };
        assert!(cancel.check().is_ok());
        cancel.cancel();
        waiter.await.unwrap();
        assert!(matches!(cancel.check(), Err(SyncError::Cancelled)));
    }
}
