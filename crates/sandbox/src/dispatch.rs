//! Bounded offload of sandbox work.
//!
//! The agent's event-consumption loop is single-threaded and cooperative;
//! it must never wait on container I/O inline. Every sandbox call is
//! dispatched here instead: the work runs on its own task, gated by a
//! semaphore that bounds how many sandbox calls are in flight at once,
//! while the caller suspends on the handle.
//!
//! Because each caller awaits its own dispatched handle before returning,
//! results are observed in issuance order within a turn. Dropping the
//! awaiting future aborts the dispatched task, which in turn drops any
//! session guard it holds.

use std::future::Future;
use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinHandle;

use pycell_core::{Error, Result};

/// Semaphore-gated task dispatcher for slow sandbox calls.
pub struct Dispatcher {
    permits: Arc<Semaphore>,
}

impl Dispatcher {
    pub fn new(max_concurrent: usize) -> Self {
        Self {
            permits: Arc::new(Semaphore::new(max_concurrent.max(1))),
        }
    }

    /// Run `work` on a separate task and await its result.
    ///
    /// Suspends until a permit is free, so at most `max_concurrent`
    /// dispatched calls run at any instant; queued callers proceed in
    /// permit-grant order.
    pub async fn dispatch<T, F>(&self, work: F) -> Result<T>
    where
        F: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        let permit = self
            .permits
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| Error::internal("dispatcher closed"))?;

        let task = AbortOnDrop(tokio::spawn(async move {
            let _permit = permit;
            work.await
        }));
        task.join().await
    }
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new(4)
    }
}

/// Join handle wrapper that aborts the task when dropped, propagating
/// caller cancellation into the dispatched work.
struct AbortOnDrop<T>(JoinHandle<T>);

impl<T> AbortOnDrop<T> {
    async fn join(mut self) -> Result<T> {
        (&mut self.0)
            .await
            .map_err(|e| Error::internal(format!("dispatched task failed: {}", e)))
    }
}

impl<T> Drop for AbortOnDrop<T> {
    fn drop(&mut self) {
        self.0.abort();
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn test_dispatch_returns_result() {
        let dispatcher = Dispatcher::new(2);
        let out = dispatcher.dispatch(async { 41 + 1 }).await.unwrap();
        assert_eq!(out, 42);
    }

    #[tokio::test]
    async fn test_concurrency_is_bounded() {
        let dispatcher = Arc::new(Dispatcher::new(2));
        let in_flight = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let mut tasks = Vec::new();
        for _ in 0..8 {
            let dispatcher = dispatcher.clone();
            let in_flight = in_flight.clone();
            let peak = peak.clone();
            tasks.push(tokio::spawn(async move {
                dispatcher
                    .dispatch(async move {
                        let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                        peak.fetch_max(now, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(10)).await;
                        in_flight.fetch_sub(1, Ordering::SeqCst);
                    })
                    .await
                    .unwrap();
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }

        assert!(peak.load(Ordering::SeqCst) <= 2);
    }

    #[tokio::test]
    async fn test_cancelling_caller_aborts_work() {
        let dispatcher = Arc::new(Dispatcher::new(1));
        let finished = Arc::new(AtomicUsize::new(0));

        let caller = {
            let dispatcher = dispatcher.clone();
            let finished = finished.clone();
            tokio::spawn(async move {
                dispatcher
                    .dispatch(async move {
                        tokio::time::sleep(Duration::from_secs(60)).await;
                        finished.fetch_add(1, Ordering::SeqCst);
                    })
                    .await
            })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        caller.abort();
        let _ = caller.await;

        // The permit must be free again: a fresh dispatch completes.
        dispatcher.dispatch(async {}).await.unwrap();
        assert_eq!(finished.load(Ordering::SeqCst), 0);
    }
}
