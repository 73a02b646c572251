//! Container runtime boundary.
//!
//! This module defines the `ContainerRuntime` trait consumed by the pool and
//! sessions, and a Docker-based implementation using the `bollard` crate.
//! Containers are created with strict resource limits, a writable tmpfs
//! workspace, and all capabilities dropped.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use pycell_core::{Error, Result};

// =============================================================================
// Runtime Types
// =============================================================================

/// Opaque handle to a running container.
#[derive(Debug, Clone, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub struct ContainerHandle(pub String);

impl std::fmt::Display for ContainerHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Configuration for creating containers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeConfig {
    /// Image every container is created from.
    pub image: String,
    /// Maximum memory in bytes.
    pub memory_limit: i64,
    /// CPU quota per 100ms period (100_000 = one core).
    pub cpu_quota: i64,
    /// Working directory inside the container.
    pub workdir: String,
    /// Docker network mode ("bridge" is needed for pip installs).
    pub network_mode: String,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            image: "docker.io/python:3.12-bullseye".to_string(),
            memory_limit: 512 * 1024 * 1024, // 512MB
            cpu_quota: 100_000,              // 1 CPU core
            workdir: "/workspace".to_string(),
            network_mode: "bridge".to_string(),
        }
    }
}

/// Raw capture of one in-container command.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecOutput {
    /// Exit code of the command.
    pub exit_code: i64,
    /// Standard output.
    pub stdout: String,
    /// Standard error.
    pub stderr: String,
    /// Whether the command ran past its time bound.
    pub timed_out: bool,
}

impl ExecOutput {
    /// Whether the command completed with exit code 0 and no timeout.
    pub fn success(&self) -> bool {
        self.exit_code == 0 && !self.timed_out
    }
}

// =============================================================================
// Container Runtime Trait
// =============================================================================

/// Boundary to the external container runtime.
///
/// `PoolManager` and `SandboxSession` consume exactly these primitives;
/// nothing else in the crate talks to Docker.
#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    /// Create and start a container, returning its handle.
    async fn create(&self, config: &RuntimeConfig) -> Result<ContainerHandle>;

    /// Execute a shell command inside the container, capturing output.
    ///
    /// On timeout the returned `ExecOutput` has `timed_out == true` with any
    /// partial output; the in-container process is left to die with the
    /// container, which the caller must treat as unhealthy.
    async fn exec(
        &self,
        handle: &ContainerHandle,
        command: &str,
        timeout: Duration,
    ) -> Result<ExecOutput>;

    /// Stop and remove the container.
    async fn destroy(&self, handle: &ContainerHandle) -> Result<()>;

    /// Check whether the backing runtime is reachable.
    async fn is_available(&self) -> bool;
}

// =============================================================================
// Docker Runtime Implementation
// =============================================================================

/// Docker-based container runtime using the `bollard` crate.
///
/// Containers run `sleep infinity` as PID 1 and stay warm between execs.
/// Isolation posture:
/// - Memory and CPU limits
/// - Writable tmpfs at the workdir only
/// - All capabilities dropped, no privilege escalation
/// - pids/nofile ulimits against fork bombs
pub struct DockerRuntime {
    docker: bollard::Docker,
}

impl DockerRuntime {
    /// Connect to the local Docker daemon.
    pub fn new() -> Result<Self> {
        let docker = bollard::Docker::connect_with_local_defaults().map_err(|e| {
            Error::runtime(format!(
                "Failed to connect to Docker daemon: {}. Is Docker running?",
                e
            ))
        })?;
        Ok(Self { docker })
    }

    /// Create from an existing bollard Docker client (for testing).
    pub fn from_client(docker: bollard::Docker) -> Self {
        Self { docker }
    }
}

#[async_trait]
impl ContainerRuntime for DockerRuntime {
    async fn create(&self, config: &RuntimeConfig) -> Result<ContainerHandle> {
        use bollard::container::{Config, CreateContainerOptions};
        use bollard::models::{HostConfig, Mount, MountTypeEnum};

        let name = format!("pycell-{}", uuid::Uuid::new_v4());

        let host_config = HostConfig {
            memory: Some(config.memory_limit),
            cpu_quota: Some(config.cpu_quota),
            cpu_period: Some(100_000), // standard 100ms period
            network_mode: Some(config.network_mode.clone()),
            // Mount a tmpfs at the workdir for writable scratch space
            mounts: Some(vec![Mount {
                target: Some(config.workdir.clone()),
                typ: Some(MountTypeEnum::TMPFS),
                tmpfs_options: Some(bollard::models::MountTmpfsOptions {
                    size_bytes: Some(config.memory_limit / 2),
                    ..Default::default()
                }),
                ..Default::default()
            }]),
            // Drop all capabilities by default
            cap_drop: Some(vec!["ALL".to_string()]),
            security_opt: Some(vec!["no-new-privileges:true".to_string()]),
            pids_limit: Some(100),
            ulimits: Some(vec![bollard::models::ResourcesUlimits {
                name: Some("nofile".to_string()),
                soft: Some(1024),
                hard: Some(2048),
            }]),
            ..Default::default()
        };

        let container_config = Config {
            image: Some(config.image.clone()),
            working_dir: Some(config.workdir.clone()),
            cmd: Some(vec!["sleep".to_string(), "infinity".to_string()]),
            host_config: Some(host_config),
            labels: Some(std::collections::HashMap::from([(
                "managed-by".to_string(),
                "pycell".to_string(),
            )])),
            ..Default::default()
        };

        let options = CreateContainerOptions {
            name: &name,
            platform: None,
        };

        self.docker
            .create_container(Some(options), container_config)
            .await
            .map_err(|e| Error::runtime(format!("Failed to create container: {}", e)))?;

        self.docker
            .start_container::<String>(&name, None)
            .await
            .map_err(|e| Error::runtime(format!("Failed to start container: {}", e)))?;

        tracing::debug!(container = %name, image = %config.image, "Container created and started");

        Ok(ContainerHandle(name))
    }

    async fn exec(
        &self,
        handle: &ContainerHandle,
        command: &str,
        timeout: Duration,
    ) -> Result<ExecOutput> {
        use bollard::exec::{CreateExecOptions, StartExecResults};

        let exec_options = CreateExecOptions {
            cmd: Some(vec!["sh", "-c", command]),
            attach_stdout: Some(true),
            attach_stderr: Some(true),
            ..Default::default()
        };

        let exec = self
            .docker
            .create_exec(&handle.0, exec_options)
            .await
            .map_err(|e| Error::runtime(format!("Failed to create exec: {}", e)))?;

        let start_result = self
            .docker
            .start_exec(&exec.id, None)
            .await
            .map_err(|e| Error::runtime(format!("Failed to start exec: {}", e)))?;

        let mut stdout = String::new();
        let mut stderr = String::new();

        if let StartExecResults::Attached { mut output, .. } = start_result {
            use futures::StreamExt;

            let collect_future = async {
                while let Some(msg) = output.next().await {
                    match msg {
                        Ok(bollard::container::LogOutput::StdOut { message }) => {
                            stdout.push_str(&String::from_utf8_lossy(&message));
                        }
                        Ok(bollard::container::LogOutput::StdErr { message }) => {
                            stderr.push_str(&String::from_utf8_lossy(&message));
                        }
                        Ok(_) => {} // ignore stdin echoes
                        Err(e) => {
                            stderr.push_str(&format!("\n[runtime error: {}]", e));
                            break;
                        }
                    }
                }
            };

            if tokio::time::timeout(timeout, collect_future).await.is_err() {
                tracing::warn!(container = %handle, "Exec timed out; container must be retired");
                return Ok(ExecOutput {
                    exit_code: -1,
                    stdout,
                    stderr,
                    timed_out: true,
                });
            }
        }

        let inspect = self
            .docker
            .inspect_exec(&exec.id)
            .await
            .map_err(|e| Error::runtime(format!("Failed to inspect exec: {}", e)))?;

        Ok(ExecOutput {
            exit_code: inspect.exit_code.unwrap_or(-1),
            stdout,
            stderr,
            timed_out: false,
        })
    }

    async fn destroy(&self, handle: &ContainerHandle) -> Result<()> {
        use bollard::container::{RemoveContainerOptions, StopContainerOptions};

        // Stop with a short grace period; sleep(1) won't exit on its own.
        let _ = self
            .docker
            .stop_container(&handle.0, Some(StopContainerOptions { t: 5 }))
            .await;

        self.docker
            .remove_container(
                &handle.0,
                Some(RemoveContainerOptions {
                    force: true,
                    ..Default::default()
                }),
            )
            .await
            .map_err(|e| Error::runtime(format!("Failed to remove container: {}", e)))?;

        tracing::debug!(container = %handle, "Container destroyed");
        Ok(())
    }

    async fn is_available(&self) -> bool {
        self.docker.ping().await.is_ok()
    }
}

// =============================================================================
// Mock Runtime (for testing without Docker)
// =============================================================================

/// In-memory mock runtime for unit and integration tests.
///
/// Scripted exec responses are consumed in order; when the script is empty
/// every exec succeeds with a canned message. Creation failures and exec
/// latency can be injected to exercise retry, timeout, and cancellation
/// paths.
#[derive(Default)]
pub struct MockRuntime {
    exec_responses: std::sync::Mutex<Vec<ExecOutput>>,
    /// Fail this many upcoming create calls before succeeding again.
    fail_creates: AtomicUsize,
    /// Artificial latency applied to every exec.
    exec_delay: std::sync::Mutex<Option<Duration>>,
    created: AtomicUsize,
    destroyed: std::sync::Mutex<Vec<ContainerHandle>>,
    live: AtomicUsize,
    peak_live: AtomicUsize,
}

impl MockRuntime {
    /// Create a mock runtime with predefined exec responses.
    pub fn new(responses: Vec<ExecOutput>) -> Self {
        Self {
            exec_responses: std::sync::Mutex::new(responses),
            ..Default::default()
        }
    }

    /// Fail the next `n` create calls with a transient error.
    pub fn fail_next_creates(&self, n: usize) {
        self.fail_creates.store(n, Ordering::SeqCst);
    }

    /// Delay every exec by `delay` (for cancellation tests).
    pub fn set_exec_delay(&self, delay: Duration) {
        *self.exec_delay.lock().unwrap() = Some(delay);
    }

    /// Total containers ever created.
    pub fn created_count(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }

    /// Handles destroyed so far.
    pub fn destroyed_handles(&self) -> Vec<ContainerHandle> {
        self.destroyed.lock().unwrap().clone()
    }

    /// Containers currently alive.
    pub fn live_count(&self) -> usize {
        self.live.load(Ordering::SeqCst)
    }

    /// High-water mark of simultaneously alive containers.
    pub fn peak_live_count(&self) -> usize {
        self.peak_live.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ContainerRuntime for MockRuntime {
    async fn create(&self, _config: &RuntimeConfig) -> Result<ContainerHandle> {
        let remaining = self.fail_creates.load(Ordering::SeqCst);
        if remaining > 0 {
            self.fail_creates.store(remaining - 1, Ordering::SeqCst);
            return Err(Error::runtime("injected create failure"));
        }

        let n = self.created.fetch_add(1, Ordering::SeqCst);
        let live = self.live.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_live.fetch_max(live, Ordering::SeqCst);
        Ok(ContainerHandle(format!("mock-{}", n)))
    }

    async fn exec(
        &self,
        _handle: &ContainerHandle,
        _command: &str,
        _timeout: Duration,
    ) -> Result<ExecOutput> {
        let delay = *self.exec_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let mut responses = self.exec_responses.lock().unwrap();
        if responses.is_empty() {
            Ok(ExecOutput {
                exit_code: 0,
                stdout: "[mock] command executed".to_string(),
                stderr: String::new(),
                timed_out: false,
            })
        } else {
            Ok(responses.remove(0))
        }
    }

    async fn destroy(&self, handle: &ContainerHandle) -> Result<()> {
        self.live.fetch_sub(1, Ordering::SeqCst);
        self.destroyed.lock().unwrap().push(handle.clone());
        Ok(())
    }

    async fn is_available(&self) -> bool {
        true
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_runtime_config_defaults() {
        let config = RuntimeConfig::default();
        assert_eq!(config.image, "docker.io/python:3.12-bullseye");
        assert_eq!(config.memory_limit, 512 * 1024 * 1024);
        assert_eq!(config.workdir, "/workspace");
        assert_eq!(config.network_mode, "bridge");
    }

    #[test]
    fn test_exec_output_success() {
        let ok = ExecOutput {
            exit_code: 0,
            stdout: "hello".into(),
            stderr: String::new(),
            timed_out: false,
        };
        assert!(ok.success());

        let timed_out = ExecOutput {
            exit_code: 0,
            stdout: String::new(),
            stderr: String::new(),
            timed_out: true,
        };
        assert!(!timed_out.success());
    }

    #[tokio::test]
    async fn test_mock_runtime_lifecycle() {
        let mock = MockRuntime::new(vec![ExecOutput {
            exit_code: 0,
            stdout: "1\n".into(),
            stderr: String::new(),
            timed_out: false,
        }]);

        let config = RuntimeConfig::default();
        let handle = mock.create(&config).await.unwrap();
        assert_eq!(mock.live_count(), 1);

        let out = mock
            .exec(&handle, "python3 -c 'print(1)'", Duration::from_secs(5))
            .await
            .unwrap();
        assert!(out.success());
        assert_eq!(out.stdout, "1\n");

        mock.destroy(&handle).await.unwrap();
        assert_eq!(mock.live_count(), 0);
        assert_eq!(mock.destroyed_handles(), vec![handle]);
    }

    #[tokio::test]
    async fn test_mock_runtime_injected_create_failures() {
        let mock = MockRuntime::default();
        mock.fail_next_creates(2);

        let config = RuntimeConfig::default();
        assert!(mock.create(&config).await.is_err());
        assert!(mock.create(&config).await.is_err());
        assert!(mock.create(&config).await.is_ok());
    }
}
