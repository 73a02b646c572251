//! Scoped sandbox sessions.
//!
//! A `SandboxSession` is the unit of mutual exclusion over a container: it
//! holds exactly one lease and is the only path for issuing commands to the
//! leased container. The lease is released in `Drop`, so every exit path
//! returns the container to the pool, including cancellation of the owning
//! future.

use std::sync::Arc;
use std::time::Duration;

use base64::Engine;

use pycell_core::{Error, ExecutionResult, Result};

use crate::pool::{Container, PoolManager};

/// Commands staging code or probing the environment get a short fixed
/// bound, independent of the configured execution timeout.
const STAGING_TIMEOUT: Duration = Duration::from_secs(10);

/// A scoped lease over one pooled container.
pub struct SandboxSession {
    pool: Arc<PoolManager>,
    container: Option<Container>,
    /// Cleared when an execution times out; an unhealthy container is
    /// destroyed at release instead of rejoining the pool.
    healthy: bool,
    execution_timeout: Duration,
    workdir: String,
}

impl SandboxSession {
    /// Acquire a container from the pool and bind a session to it.
    pub async fn acquire(pool: Arc<PoolManager>, execution_timeout: Duration) -> Result<Self> {
        let workdir = pool.config().runtime.workdir.clone();
        let container = pool.acquire().await?;
        Ok(Self {
            pool,
            container: Some(container),
            healthy: true,
            execution_timeout,
            workdir,
        })
    }

    /// Identity of the leased container.
    pub fn container_id(&self) -> Option<String> {
        self.container.as_ref().map(|c| c.handle.to_string())
    }

    /// Execute a Python code fragment and capture its output.
    ///
    /// The fragment is staged into the container's workdir and run under
    /// the container's interpreter. A timeout force-terminates the run:
    /// the result carries a timeout-kind `error` and the container is
    /// retired when the session ends.
    pub async fn run(&mut self, code: &str) -> Result<ExecutionResult> {
        self.stage_code(code).await?;
        let command = format!("python3 {}/main.py", self.workdir);
        self.capture(&command, self.execution_timeout).await
    }

    /// Execute a shell command with the same capture semantics as `run`.
    ///
    /// Used for environment mutation; anything installed persists in the
    /// bound container for the rest of its lifetime and is never rolled
    /// back, nor propagated to other pool members.
    pub async fn execute_command(&mut self, command: &str) -> Result<ExecutionResult> {
        self.capture(command, self.execution_timeout).await
    }

    /// Install libraries into the bound container, in the given order.
    pub async fn install_libraries(&mut self, libraries: &[String]) -> Result<ExecutionResult> {
        let command = format!("pip install {}", libraries.join(" "));
        self.execute_command(&command).await
    }

    async fn capture(&mut self, command: &str, timeout: Duration) -> Result<ExecutionResult> {
        let container = self
            .container
            .as_ref()
            .ok_or_else(|| Error::internal("session has no container"))?;

        let output = self
            .pool
            .runtime()
            .exec(&container.handle, command, timeout)
            .await?;

        if output.timed_out {
            tracing::warn!(
                container = %container.handle,
                timeout_secs = timeout.as_secs(),
                "Execution timed out; marking container unhealthy"
            );
            self.healthy = false;
            return Ok(ExecutionResult::timed_out(
                output.stdout,
                output.stderr,
                timeout,
            ));
        }

        Ok(ExecutionResult::completed(
            output.stdout,
            output.stderr,
            output.exit_code,
        ))
    }

    /// Transfer the code fragment into the container via base64 piping,
    /// avoiding any quoting pitfalls in the fragment itself.
    async fn stage_code(&mut self, code: &str) -> Result<()> {
        let container = self
            .container
            .as_ref()
            .ok_or_else(|| Error::internal("session has no container"))?;

        let encoded = base64::engine::general_purpose::STANDARD.encode(code.as_bytes());
        let command = format!("echo '{}' | base64 -d > {}/main.py", encoded, self.workdir);

        let output = self
            .pool
            .runtime()
            .exec(&container.handle, &command, STAGING_TIMEOUT)
            .await?;

        if !output.success() {
            return Err(Error::runtime(format!(
                "failed to stage code into container: {}",
                output.stderr
            )));
        }
        Ok(())
    }
}

impl Drop for SandboxSession {
    fn drop(&mut self) {
        if let Some(container) = self.container.take() {
            self.pool.release(container, self.healthy);
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
