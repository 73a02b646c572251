//! Bounded container pool.
//!
//! The `PoolManager` owns every container in the process. Containers are
//! provisioned lazily up to `max_size`, optionally prewarmed at startup to
//! hide first-call latency, and reused across leases until they are retired
//! as unhealthy or the pool shuts down.
//!
//! Locking discipline: all bookkeeping lives behind a `std::sync::Mutex`
//! that is never held across an await point. This keeps `release` callable
//! from `Drop`, which is what makes lease release unconditional under
//! cancellation.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use rand::Rng;
use tokio::sync::Notify;

use pycell_core::{
    ContainerPayload, Error, EventEmitter, EventEnvelope, EventSeverity, EventType, Result,
};

use crate::runtime::{ContainerHandle, ContainerRuntime, RuntimeConfig};

/// Pool sizing and provisioning policy.
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Containers provisioned eagerly by `prewarm`.
    pub min_size: usize,
    /// Hard ceiling on live containers (idle + leased + provisioning).
    pub max_size: usize,
    /// Default deadline for `acquire`.
    pub acquire_timeout: Duration,
    /// Transient provisioning failures retried up to this count.
    pub provision_retries: u32,
    /// Base backoff between provisioning retries (jittered, scaled by attempt).
    pub provision_backoff: Duration,
    /// Container creation parameters.
    pub runtime: RuntimeConfig,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            min_size: 1,
            max_size: 4,
            acquire_timeout: Duration::from_secs(30),
            provision_retries: 3,
            provision_backoff: Duration::from_millis(500),
            runtime: RuntimeConfig::default(),
        }
    }
}

/// A leased pool member.
///
/// Handed out by `acquire`; must come back through `release`. The
/// installed-library set of a container mutates in place over its lifetime
/// and is never rolled back between leases.
#[derive(Debug)]
pub struct Container {
    pub handle: ContainerHandle,
    pub image: String,
}

/// Statistics about the pool state.
#[derive(Debug, Clone)]
pub struct PoolStats {
    /// Containers idle and ready for assignment.
    pub idle: usize,
    /// Containers currently leased to sessions.
    pub leased: usize,
    /// All live containers (idle + leased + provisioning).
    pub live: usize,
    /// Maximum pool size.
    pub max_size: usize,
}

struct PoolState {
    idle: Vec<Container>,
    /// Live containers: idle + leased + currently provisioning. The
    /// `0 <= leased <= live <= max_size` invariant is enforced here by
    /// reserving a live slot before any create call starts.
    live: usize,
    closed: bool,
}

/// Thread-safe bounded pool of reusable containers.
///
/// Exactly one `PoolManager` exists per process; it is constructed in
/// `main` and passed explicitly to every consumer.
pub struct PoolManager {
    runtime: Arc<dyn ContainerRuntime>,
    config: PoolConfig,
    state: Mutex<PoolState>,
    /// Signalled on every release and on close, waking blocked acquirers.
    released: Notify,
    emitter: Option<Arc<dyn EventEmitter>>,
}

impl PoolManager {
    pub fn new(runtime: Arc<dyn ContainerRuntime>, config: PoolConfig) -> Self {
        Self {
            runtime,
            config,
            state: Mutex::new(PoolState {
                idle: Vec::new(),
                live: 0,
                closed: false,
            }),
            released: Notify::new(),
            emitter: None,
        }
    }

    /// Set an event emitter for instrumenting container churn.
    pub fn with_event_emitter(mut self, emitter: Arc<dyn EventEmitter>) -> Self {
        self.emitter = Some(emitter);
        self
    }

    /// The runtime boundary this pool provisions against.
    pub fn runtime(&self) -> &Arc<dyn ContainerRuntime> {
        &self.runtime
    }

    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    /// Acquire a ready container, waiting up to the configured deadline.
    pub async fn acquire(&self) -> Result<Container> {
        self.acquire_timeout(self.config.acquire_timeout).await
    }

    /// Acquire a ready container, waiting up to `timeout`.
    ///
    /// Prefers an idle container; provisions a new one when below
    /// `max_size`; otherwise blocks the calling task until a lease is
    /// released or the deadline passes (`Error::PoolExhausted`).
    pub async fn acquire_timeout(&self, timeout: Duration) -> Result<Container> {
        enum Plan {
            Ready(Container),
            Provision,
        }

        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            // Register interest before inspecting state so a release between
            // the unlock and the await cannot be missed.
            let released = self.released.notified();
            tokio::pin!(released);
            released.as_mut().enable();

            let plan = {
                let mut state = self.state.lock().unwrap();
                if state.closed {
                    return Err(Error::PoolClosed);
                }
                if let Some(container) = state.idle.pop() {
                    Some(Plan::Ready(container))
                } else if state.live < self.config.max_size {
                    // Reserve the slot now; released on provisioning failure.
                    state.live += 1;
                    Some(Plan::Provision)
                } else {
                    None
                }
            };

            match plan {
                Some(Plan::Ready(container)) => {
                    tracing::debug!(container = %container.handle, "Container leased from idle set");
                    return Ok(container);
                }
                Some(Plan::Provision) => {
                    return match self.provision().await {
                        Ok(container) => Ok(container),
                        Err(e) => {
                            let mut state = self.state.lock().unwrap();
                            state.live -= 1;
                            drop(state);
                            // The freed slot may unblock a waiter.
                            self.released.notify_waiters();
                            Err(e)
                        }
                    };
                }
                None => {
                    if tokio::time::timeout_at(deadline, released).await.is_err() {
                        self.emit(
                            EventEnvelope::new(
                                EventType::PoolExhausted,
                                serde_json::json!({ "timeout_ms": timeout.as_millis() as u64 }),
                            )
                            .with_actor("pool")
                            .with_severity(EventSeverity::Warning),
                        );
                        return Err(Error::pool_exhausted(timeout));
                    }
                }
            }
        }
    }

    /// Return a leased container to the pool.
    ///
    /// Healthy containers rejoin the idle set; unhealthy ones are destroyed
    /// and leave the live set. A replacement is not provisioned here: the
    /// next `acquire` does that lazily.
    ///
    /// Synchronous so the session Drop guard can call it on every exit path.
    pub fn release(&self, container: Container, healthy: bool) {
        let retired = {
            let mut state = self.state.lock().unwrap();
            if healthy && !state.closed {
                tracing::debug!(container = %container.handle, "Container released back to pool");
                state.idle.push(container);
                None
            } else {
                state.live -= 1;
                Some(container)
            }
        };

        if let Some(container) = retired {
            let reason = if healthy { "pool closed" } else { "unhealthy" };
            tracing::info!(container = %container.handle, reason, "Retiring container");
            self.spawn_destroy(container, reason);
        }

        self.released.notify_waiters();
    }

    /// Eagerly provision up to `n` containers at startup.
    ///
    /// Failures are logged and skipped: a cold pool is degraded, not broken.
    pub async fn prewarm(&self, n: usize) {
        let target = n.min(self.config.max_size);
        tracing::info!(count = target, "Prewarming container pool");

        for i in 0..target {
            let reserved = {
                let mut state = self.state.lock().unwrap();
                if state.closed || state.live >= self.config.max_size {
                    false
                } else {
                    state.live += 1;
                    true
                }
            };
            if !reserved {
                break;
            }

            match self.provision().await {
                Ok(container) => {
                    let mut state = self.state.lock().unwrap();
                    if state.closed {
                        state.live -= 1;
                        drop(state);
                        self.spawn_destroy(container, "pool closed");
                        break;
                    }
                    state.idle.push(container);
                }
                Err(e) => {
                    let mut state = self.state.lock().unwrap();
                    state.live -= 1;
                    drop(state);
                    tracing::warn!(error = %e, "Failed to prewarm container {}/{}", i + 1, target);
                }
            }
        }

        let stats = self.stats();
        tracing::info!(idle = stats.idle, "Pool prewarm complete");
    }

    /// Get current pool statistics.
    pub fn stats(&self) -> PoolStats {
        let state = self.state.lock().unwrap();
        PoolStats {
            idle: state.idle.len(),
            leased: state.live - state.idle.len(),
            live: state.live,
            max_size: self.config.max_size,
        }
    }

    /// Drain and destroy every live container. Idempotent; safe to call
    /// from a shutdown hook. Containers still leased are destroyed when
    /// their sessions release them.
    pub async fn close(&self) {
        let drained = {
            let mut state = self.state.lock().unwrap();
            if state.closed {
                return;
            }
            state.closed = true;
            let drained: Vec<Container> = state.idle.drain(..).collect();
            state.live -= drained.len();
            drained
        };

        tracing::info!(count = drained.len(), "Closing container pool");
        for container in drained {
            if let Err(e) = self.runtime.destroy(&container.handle).await {
                tracing::warn!(container = %container.handle, error = %e, "Failed to destroy container during close");
            }
            self.emit_destroyed(&container.handle, "pool closed");
        }

        self.emit(
            EventEnvelope::new(EventType::PoolClosed, serde_json::json!({})).with_actor("pool"),
        );
        // Wake blocked acquirers so they observe the closed flag.
        self.released.notify_waiters();
    }

    /// Create one container, retrying transient failures with jittered
    /// backoff. The caller has already reserved the live slot.
    async fn provision(&self) -> Result<Container> {
        let mut attempt: u32 = 0;
        loop {
            match self.runtime.create(&self.config.runtime).await {
                Ok(handle) => {
                    tracing::info!(container = %handle, "Container provisioned");
                    self.emit(
                        EventEnvelope::new(
                            EventType::ContainerCreated,
                            serde_json::to_value(ContainerPayload {
                                container_id: handle.to_string(),
                                image: self.config.runtime.image.clone(),
                                reason: None,
                            })
                            .unwrap_or_default(),
                        )
                        .with_actor("pool"),
                    );
                    return Ok(Container {
                        handle,
                        image: self.config.runtime.image.clone(),
                    });
                }
                Err(e) if attempt < self.config.provision_retries => {
                    attempt += 1;
                    let base = self.config.provision_backoff.as_millis() as u64;
                    let jitter = rand::thread_rng().gen_range(0..=base / 2 + 1);
                    let delay = Duration::from_millis(base * attempt as u64 + jitter);
                    tracing::warn!(
                        error = %e,
                        attempt,
                        retries = self.config.provision_retries,
                        delay_ms = delay.as_millis() as u64,
                        "Container provisioning failed; retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => {
                    return Err(Error::provisioning(format!(
                        "gave up after {} attempts: {}",
                        attempt + 1,
                        e
                    )));
                }
            }
        }
    }

    fn spawn_destroy(&self, container: Container, reason: &'static str) {
        let runtime = self.runtime.clone();
        let emitter = self.emitter.clone();
        tokio::spawn(async move {
            if let Err(e) = runtime.destroy(&container.handle).await {
                tracing::warn!(container = %container.handle, error = %e, "Failed to destroy container");
            }
            if let Some(emitter) = emitter {
                emitter
                    .emit(
                        EventEnvelope::new(
                            EventType::ContainerDestroyed,
                            serde_json::to_value(ContainerPayload {
                                container_id: container.handle.to_string(),
                                image: container.image.clone(),
                                reason: Some(reason.to_string()),
                            })
                            .unwrap_or_default(),
                        )
                        .with_actor("pool"),
                    )
                    .await;
            }
        });
    }

    fn emit_destroyed(&self, handle: &ContainerHandle, reason: &str) {
        self.emit(
            EventEnvelope::new(
                EventType::ContainerDestroyed,
                serde_json::to_value(ContainerPayload {
                    container_id: handle.to_string(),
                    image: self.config.runtime.image.clone(),
                    reason: Some(reason.to_string()),
                })
                .unwrap_or_default(),
            )
            .with_actor("pool"),
        );
    }

    /// Fire-and-forget emission; the sink must never block pool progress.
    fn emit(&self, event: EventEnvelope) {
        if let Some(emitter) = &self.emitter {
            let emitter = emitter.clone();
            tokio::spawn(async move { emitter.emit(event).await });
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::MockRuntime;

    fn pool_with(max_size: usize, runtime: Arc<MockRuntime>) -> PoolManager {
        PoolManager::new(
            runtime,
            PoolConfig {
                min_size: 1,
                max_size,
                acquire_timeout: Duration::from_millis(200),
                provision_retries: 2,
                provision_backoff: Duration::from_millis(1),
                runtime: RuntimeConfig::default(),
            },
        )
    }

    #[tokio::test]
    async fn test_acquire_provisions_lazily() {
        let runtime = Arc::new(MockRuntime::default());
        let pool = pool_with(2, runtime.clone());

        let c = pool.acquire().await.unwrap();
        assert_eq!(runtime.created_count(), 1);
        assert_eq!(pool.stats().leased, 1);

        pool.release(c, true);
        assert_eq!(pool.stats().idle, 1);
        assert_eq!(pool.stats().leased, 0);

        // Reuses the idle container instead of provisioning.
        let c = pool.acquire().await.unwrap();
        assert_eq!(runtime.created_count(), 1);
        pool.release(c, true);
    }

    #[tokio::test]
    async fn test_acquire_blocks_until_release() {
        let runtime = Arc::new(MockRuntime::default());
        let pool = Arc::new(pool_with(1, runtime));

        let c = pool.acquire().await.unwrap();

        let waiter = {
            let pool = pool.clone();
            tokio::spawn(async move { pool.acquire_timeout(Duration::from_secs(5)).await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        pool.release(c, true);

        let c2 = waiter.await.unwrap().unwrap();
        pool.release(c2, true);
    }

    #[tokio::test]
    async fn test_acquire_times_out_when_saturated() {
        let runtime = Arc::new(MockRuntime::default());
        let pool = pool_with(1, runtime);

        let _held = pool.acquire().await.unwrap();
        let err = pool
            .acquire_timeout(Duration::from_millis(20))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::PoolExhausted { .. }));
    }

    #[tokio::test]
    async fn test_unhealthy_release_destroys_and_never_returns() {
        let runtime = Arc::new(MockRuntime::default());
        let pool = pool_with(2, runtime.clone());

        let c = pool.acquire().await.unwrap();
        let retired = c.handle.clone();
        pool.release(c, false);

        // Retirement happens on a spawned task.
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(runtime.destroyed_handles(), vec![retired.clone()]);
        assert_eq!(pool.stats().live, 0);

        // Replacement is provisioned lazily, with a fresh identity.
        let c = pool.acquire().await.unwrap();
        assert_ne!(c.handle, retired);
        pool.release(c, true);
    }

    #[tokio::test]
    async fn test_provisioning_retries_then_fails() {
        let runtime = Arc::new(MockRuntime::default());
        let pool = pool_with(2, runtime.clone());

        // Two injected failures, two retries allowed: succeeds on the third try.
        runtime.fail_next_creates(2);
        let c = pool.acquire().await.unwrap();
        pool.release(c, true);

        // More failures than retries: surfaces ProvisioningError and frees
        // the reserved slot.
        let runtime = Arc::new(MockRuntime::default());
        let pool = pool_with(2, runtime.clone());
        runtime.fail_next_creates(5);
        let err = pool.acquire().await.unwrap_err();
        assert!(matches!(err, Error::Provisioning(_)));
        assert_eq!(pool.stats().live, 0);

        // The pool recovers once the runtime does.
        let c = pool.acquire().await.unwrap();
        pool.release(c, true);
    }

    #[tokio::test]
    async fn test_prewarm_failures_are_not_fatal() {
        let runtime = Arc::new(MockRuntime::default());
        let pool = pool_with(3, runtime.clone());

        // First create of the prewarm pass fails even after retries.
        runtime.fail_next_creates(3);
        pool.prewarm(3).await;

        let stats = pool.stats();
        assert_eq!(stats.idle, 2);
        assert_eq!(stats.live, 2);
    }

    #[tokio::test]
    async fn test_prewarm_capped_at_max_size() {
        let runtime = Arc::new(MockRuntime::default());
        let pool = pool_with(2, runtime.clone());

        pool.prewarm(10).await;
        assert_eq!(runtime.created_count(), 2);
        assert_eq!(pool.stats().idle, 2);
    }

    #[tokio::test]
    async fn test_close_is_idempotent() {
        let runtime = Arc::new(MockRuntime::default());
        let pool = pool_with(3, runtime.clone());
        pool.prewarm(2).await;

        pool.close().await;
        let destroyed_once = runtime.destroyed_handles().len();
        pool.close().await;
        assert_eq!(runtime.destroyed_handles().len(), destroyed_once);
        assert_eq!(destroyed_once, 2);

        assert!(matches!(pool.acquire().await, Err(Error::PoolClosed)));
    }

    #[tokio::test]
    async fn test_release_after_close_destroys() {
        let runtime = Arc::new(MockRuntime::default());
        let pool = pool_with(2, runtime.clone());

        let c = pool.acquire().await.unwrap();
        pool.close().await;
        pool.release(c, true);

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(runtime.live_count(), 0);
        assert_eq!(pool.stats().live, 0);
    }

    #[tokio::test]
    async fn test_max_size_never_exceeded_under_contention() {
        let runtime = Arc::new(MockRuntime::default());
        let pool = Arc::new(pool_with(3, runtime.clone()));

        let mut tasks = Vec::new();
        for _ in 0..16 {
            let pool = pool.clone();
            tasks.push(tokio::spawn(async move {
                for _ in 0..10 {
                    let c = pool.acquire_timeout(Duration::from_secs(5)).await.unwrap();
                    tokio::task::yield_now().await;
                    pool.release(c, true);
                }
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }

        assert!(runtime.peak_live_count() <= 3);
        assert_eq!(pool.stats().leased, 0);
    }
}
