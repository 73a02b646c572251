#![deny(unused)]
//! Sandboxed code execution plane for Pycell.
//!
//! This crate owns the pooled container lifecycle and the agent-facing
//! execution tools. Code fragments run inside isolated Docker containers
//! with resource limits and no host access; containers are reused across
//! calls through a bounded pool to keep per-call latency low.
//!
//! # Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────┐
//! │  Agent runtime                             │
//! │    ↓ calls tool (JSON args)                │
//! ├────────────────────────────────────────────┤
//! │  Tools (ExecutePythonCode, InstallLibs)    │
//! │    ↓ dispatches via bounded Dispatcher     │
//! ├────────────────────────────────────────────┤
//! │  SandboxSession (scoped lease, RAII)       │
//! │    ↓ acquires from PoolManager             │
//! ├────────────────────────────────────────────┤
//! │  PoolManager (bounded container pool)      │
//! │    ↓ Docker API via bollard                │
//! ├────────────────────────────────────────────┤
//! │  Docker container (isolated)               │
//! │    /workspace  (tmpfs, writable)           │
//! │    memory/cpu limits, no extra caps        │
//! └────────────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use pycell_sandbox::{DockerRuntime, PoolManager, PoolConfig, Dispatcher};
//! use pycell_sandbox::tools::{ExecutePythonCodeTool, InstallPythonLibrariesTool};
//!
//! let runtime = Arc::new(DockerRuntime::new()?);
//! let pool = Arc::new(PoolManager::new(runtime, PoolConfig::default()));
//! pool.prewarm(2).await;
//!
//! let dispatcher = Arc::new(Dispatcher::new(4));
//! let tool = ExecutePythonCodeTool::new(pool.clone(), dispatcher.clone());
//! ```

pub mod dispatch;
pub mod pool;
pub mod runtime;
pub mod session;
pub mod tools;

pub use dispatch::Dispatcher;
pub use pool::{Container, PoolConfig, PoolManager, PoolStats};
pub use runtime::{ContainerHandle, ContainerRuntime, DockerRuntime, ExecOutput, MockRuntime, RuntimeConfig};
pub use session::SandboxSession;
pub use tools::{
    ExecutePythonCodeTool, InstallPythonLibrariesTool, EXECUTE_PYTHON_CODE,
    INSTALL_PYTHON_LIBRARIES,
};
