#![deny(unused)]
//! Pycell - pooled sandbox code execution for AI agents.
//!
//! Wires the process together: configuration, tracing, the single shared
//! container pool, baseline environment provisioning, and the agent-facing
//! tools. The pool is constructed exactly once here and handed to every
//! consumer by `Arc`; no global state, no re-entrant init checks.

use std::sync::Arc;
use std::time::Duration;

use pycell_core::config::AppConfig;
use pycell_core::Tool;
use pycell_sandbox::{
    ContainerRuntime, Dispatcher, DockerRuntime, ExecutePythonCodeTool,
    InstallPythonLibrariesTool, MockRuntime, PoolConfig, PoolManager, RuntimeConfig,
    SandboxSession,
};

mod telemetry;

/// Baseline installs may pull wheels over the network; give them room.
const BASELINE_INSTALL_TIMEOUT: Duration = Duration::from_secs(300);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = AppConfig::load()?;
    telemetry::configure_tracing(&config.telemetry.service_name, config.telemetry.json_logs)?;

    tracing::info!("Starting Pycell v{}", env!("CARGO_PKG_VERSION"));

    // =========================================================================
    // Container runtime
    // =========================================================================
    let runtime: Arc<dyn ContainerRuntime> = match DockerRuntime::new() {
        Ok(docker) => {
            let docker = Arc::new(docker);
            if !docker.is_available().await {
                tracing::warn!(
                    "Docker daemon not reachable; executions will fail until it returns"
                );
            }
            docker
        }
        Err(e) => {
            tracing::warn!(error = %e, "Docker unavailable; falling back to mock runtime");
            Arc::new(MockRuntime::default())
        }
    };

    // =========================================================================
    // Container pool (single instance for the whole process)
    // =========================================================================
    let pool_config = PoolConfig {
        min_size: config.pool.min_size,
        max_size: config.pool.max_size,
        acquire_timeout: Duration::from_millis(config.pool.acquire_timeout_ms),
        provision_retries: config.pool.provision_retries,
        provision_backoff: Duration::from_millis(config.pool.provision_backoff_ms),
        runtime: RuntimeConfig {
            image: config.pool.base_image.clone(),
            memory_limit: config.sandbox.memory_limit_bytes,
            cpu_quota: config.sandbox.cpu_quota,
            workdir: config.sandbox.workdir.clone(),
            network_mode: config.sandbox.network_mode.clone(),
        },
    };
    let pool = Arc::new(PoolManager::new(runtime, pool_config));

    if config.pool.prewarm {
        pool.prewarm(config.pool.min_size).await;
    }

    // =========================================================================
    // Baseline environment provisioning (startup-time, pool-wide)
    // =========================================================================
    // On-demand installs only ever mutate one leased container. The baseline
    // set is different: it is installed here, once per prewarmed container,
    // before any agent traffic arrives.
    if !config.pool.baseline_libraries.is_empty() && !config.pool.skip_environment_setup {
        install_baseline(&pool, &config.pool.baseline_libraries).await;
    }

    // =========================================================================
    // Agent-facing tools
    // =========================================================================
    let dispatcher = Arc::new(Dispatcher::new(config.dispatch.max_concurrent));
    let execution_timeout = Duration::from_secs(config.sandbox.execution_timeout_secs);

    let tools: Vec<Arc<dyn Tool>> = vec![
        Arc::new(ExecutePythonCodeTool::new(
            pool.clone(),
            dispatcher.clone(),
            execution_timeout,
        )),
        Arc::new(InstallPythonLibrariesTool::new(
            pool.clone(),
            dispatcher,
            BASELINE_INSTALL_TIMEOUT,
        )),
    ];
    for tool in &tools {
        tracing::info!(tool = tool.name(), "Tool registered");
    }

    let stats = pool.stats();
    tracing::info!(
        idle = stats.idle,
        max_size = stats.max_size,
        "Pycell ready; press ctrl-c to shut down"
    );

    // =========================================================================
    // Shutdown hook
    // =========================================================================
    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutdown requested; draining container pool");
    pool.close().await;
    tracing::info!("Pool drained; bye");

    Ok(())
}

/// Install the configured baseline into every prewarmed container.
///
/// Failures are logged per container and never abort startup; a container
/// that missed its baseline still executes code, just without the extra
/// libraries.
async fn install_baseline(pool: &Arc<PoolManager>, libraries: &[String]) {
    let warm = pool.stats().idle;
    tracing::info!(
        containers = warm,
        libraries = libraries.len(),
        "Installing baseline libraries"
    );

    // Hold every session until the pass is done so no container is visited
    // twice.
    let mut sessions = Vec::new();
    for _ in 0..warm {
        match SandboxSession::acquire(pool.clone(), BASELINE_INSTALL_TIMEOUT).await {
            Ok(session) => sessions.push(session),
            Err(e) => {
                tracing::warn!(error = %e, "Baseline pass could not lease container");
                break;
            }
        }
    }

    for session in sessions.iter_mut() {
        match session.install_libraries(libraries).await {
            Ok(result) if result.success => {
                tracing::info!(
                    container = %session.container_id().unwrap_or_default(),
                    "Baseline installed"
                );
            }
            Ok(result) => {
                tracing::warn!(
                    container = %session.container_id().unwrap_or_default(),
                    stderr = %result.stderr.unwrap_or_default(),
                    "Baseline install failed"
                );
            }
            Err(e) => {
                tracing::warn!(error = %e, "Baseline install fault");
            }
        }
    }
}
