//! Per-turn execution context.

use std::sync::Arc;

use pycell_sandbox::PoolManager;

/// Read-only context binding one agent turn to the shared container pool.
///
/// The pool is constructed once at process start and injected here for
/// every turn; nothing else holds it globally. The context is owned by the
/// turn and dropped with it; it never outlives the turn.
#[derive(Clone)]
pub struct AgentContext {
    pool: Arc<PoolManager>,
    /// Opaque conversation-store key scoping this turn's event stream.
    session_id: String,
}

impl AgentContext {
    pub fn new(pool: Arc<PoolManager>, session_id: impl Into<String>) -> Self {
        Self {
            pool,
            session_id: session_id.into(),
        }
    }

    pub fn pool(&self) -> &Arc<PoolManager> {
        &self.pool
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }
}
