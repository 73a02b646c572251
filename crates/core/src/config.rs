use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub pool: PoolSettings,
    pub sandbox: SandboxSettings,
    pub dispatch: DispatchSettings,
    pub telemetry: TelemetrySettings,
}

#[derive(Debug, Deserialize, Clone)]
pub struct PoolSettings {
    /// Containers provisioned eagerly at startup.
    pub min_size: usize,
    /// Hard ceiling on live containers (idle + leased + provisioning).
    pub max_size: usize,
    /// Whether to provision `min_size` containers before serving requests.
    pub prewarm: bool,
    /// Image every pool member is created from.
    pub base_image: String,
    /// Libraries installed into each prewarmed container at startup,
    /// in order. On-demand installs never propagate to other members.
    pub baseline_libraries: Vec<String>,
    /// Skip the baseline install pass even if libraries are configured.
    pub skip_environment_setup: bool,
    /// Deadline for a caller waiting on a free container.
    pub acquire_timeout_ms: u64,
    /// Transient provisioning failures retried up to this count.
    pub provision_retries: u32,
    /// Base backoff between provisioning retries.
    pub provision_backoff_ms: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct SandboxSettings {
    /// Maximum memory per container in bytes.
    pub memory_limit_bytes: i64,
    /// CPU quota per 100ms period (100_000 = one core).
    pub cpu_quota: i64,
    /// Wall-clock bound on a single code execution.
    pub execution_timeout_secs: u64,
    /// Working directory inside the container.
    pub workdir: String,
    /// Docker network mode ("bridge" is required for pip installs).
    pub network_mode: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DispatchSettings {
    /// Concurrent sandbox calls allowed in flight across all turns.
    pub max_concurrent: usize,
}

#[derive(Debug, Deserialize, Clone)]
pub struct TelemetrySettings {
    pub service_name: String,
    pub json_logs: bool,
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        let env = std::env::var("PYCELL_ENV").unwrap_or_else(|_| "development".into());

        let s = Config::builder()
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{}", env)).required(false))
            .add_source(File::with_name("config/local").required(false))
            // Map APP__POOL__MAX_SIZE=4 to app.pool.max_size
            .add_source(Environment::with_prefix("APP").separator("__"))
            .build()?;

        match s.try_deserialize() {
            Ok(cfg) => Ok(cfg),
            // No config files and no env overrides: fall back to defaults.
            Err(ConfigError::Message(_)) | Err(ConfigError::NotFound(_)) => Ok(Self::default()),
            Err(e) => Err(e),
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            pool: PoolSettings {
                min_size: 1,
                max_size: 4,
                prewarm: true,
                base_image: "docker.io/python:3.12-bullseye".into(),
                baseline_libraries: vec![],
                skip_environment_setup: false,
                acquire_timeout_ms: 30_000,
                provision_retries: 3,
                provision_backoff_ms: 500,
            },
            sandbox: SandboxSettings {
                memory_limit_bytes: 512 * 1024 * 1024, // 512MB
                cpu_quota: 100_000,                    // 1 CPU core
                execution_timeout_secs: 30,
                workdir: "/workspace".into(),
                network_mode: "bridge".into(),
            },
            dispatch: DispatchSettings { max_concurrent: 4 },
            telemetry: TelemetrySettings {
                service_name: "pycell".into(),
                json_logs: false,
            },
        }
    }
}
