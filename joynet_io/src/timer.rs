//! # Delayed Tasks
//!
//! A [`DelayedTask`] runs a future once after a fixed delay unless it is cancelled first. It is the
//! building block for per-link watchdogs: arm one when a link degrades, drop it when the link recovers.
//!
//! Cancellation (explicit or through `Drop`) only has an effect while the delay is still pending. Once
//! the delay has elapsed the future runs to completion, so a watchdog that clears its own slot while
//! firing does not abort itself halfway through. Callers that need to stop an in-flight callback
//! should race it against a [`CancellationToken`](crate::CancellationToken).

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::AbortHandle;

pub struct DelayedTask {
    handle: AbortHandle,
    pending: Arc<AtomicBool>,
    delay: Duration,
}

impl DelayedTask {
    /// Schedules `task` to run after `delay` on the current runtime
    pub fn schedule<Fut>(delay: Duration, task: Fut) -> Self
    where
        Fut: Future<Output = ()> + Send + 'static,
    {
        let pending = Arc::new(AtomicBool::new(true));
        let pending_task = pending.clone();
        let handle = tokio::task::spawn(async move {
            tokio::time::sleep(delay).await;
            // past this point cancel() is a no-op
            if pending_task.swap(false, Ordering::SeqCst) {
                task.await
            }
        })
        .abort_handle();

        Self {
            handle,
            pending,
            delay,
        }
    }

    /// Cancels the task if it has not fired yet. Returns true if this call prevented it from firing
    pub fn cancel(&self) -> bool {
        if self.pending.swap(false, Ordering::SeqCst) {
            self.handle.abort();
            true
        } else {
            false
        }
    }

    /// True while the delay has not yet elapsed and the task was not cancelled
    pub fn is_pending(&self) -> bool {
        self.pending.load(Ordering::SeqCst)
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }
}

impl Drop for DelayedTask {
    fn drop(&mut self) {
        let _ = self.cancel();
    }
}

impl std::fmt::Debug for DelayedTask {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DelayedTask")
            .field("delay", &self.delay)
            .field("pending", &self.is_pending())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn counter() -> (Arc<AtomicUsize>, impl Future<Output = ()> + Send + 'static) {
        let count = Arc::new(AtomicUsize::new(0));
        let count_task = count.clone();
        (count, async move {
            count_task.fetch_add(1, Ordering::SeqCst);
        })
    }

    #[tokio::test(start_paused = true)]
    async fn fires_once_after_delay() {
        joynet_logging::setup_log();
        let (count, task) = counter();
        let delayed = DelayedTask::schedule(Duration::from_secs(5), task);

        tokio::time::sleep(Duration::from_millis(4999)).await;
        assert_eq!(count.load(Ordering::SeqCst), 0);
        assert!(delayed.is_pending());

        tokio::time::sleep(Duration::from_millis(2)).await;
        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert!(!delayed.is_pending());
        assert!(!delayed.cancel());
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_before_deadline_prevents_firing() {
        joynet_logging::setup_log();
        let (count, task) = counter();
        let delayed = DelayedTask::schedule(Duration::from_secs(5), task);

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert!(delayed.cancel());
        assert!(!delayed.cancel());

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn drop_cancels_pending_task() {
        joynet_logging::setup_log();
        let (count, task) = counter();
        drop(DelayedTask::schedule(Duration::from_secs(5), task));

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }
}
