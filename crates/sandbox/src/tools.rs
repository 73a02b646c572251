//! Agent-facing execution tools.
//!
//! These tools are the only surface the agent runtime sees. Each call
//! acquires a scoped session, dispatches the sandbox work through the
//! bounded `Dispatcher`, and converts every internal fault (pool
//! exhaustion, provisioning failure, timeout, runtime error) into the
//! tool's documented JSON result shape. Nothing raises past this boundary.

use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::{Duration, Instant};

use pycell_core::{
    EventEmitter, EventEnvelope, EventSeverity, EventType, ExecutionResult, InstallResult, Result,
    Tool, ToolExecPayload, ToolOutput,
};

use crate::dispatch::Dispatcher;
use crate::pool::PoolManager;
use crate::session::SandboxSession;

/// Name of the code-execution tool, as advertised to the model.
pub const EXECUTE_PYTHON_CODE: &str = "execute_python_code";

/// Name of the library-installation tool.
pub const INSTALL_PYTHON_LIBRARIES: &str = "install_python_libraries";

/// Drop duplicate library names, keeping first occurrences in order.
fn dedup_preserving_order(libraries: Vec<String>) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    libraries
        .into_iter()
        .filter(|lib| seen.insert(lib.clone()))
        .collect()
}

async fn emit(emitter: &Option<Arc<dyn EventEmitter>>, event: EventEnvelope) {
    if let Some(emitter) = emitter {
        emitter.emit(event).await;
    }
}

// =============================================================================
// Execute Python Code Tool
// =============================================================================

/// Tool for executing Python code fragments in a pooled sandbox container.
pub struct ExecutePythonCodeTool {
    pool: Arc<PoolManager>,
    dispatcher: Arc<Dispatcher>,
    execution_timeout: Duration,
    emitter: Option<Arc<dyn EventEmitter>>,
}

impl ExecutePythonCodeTool {
    pub fn new(
        pool: Arc<PoolManager>,
        dispatcher: Arc<Dispatcher>,
        execution_timeout: Duration,
    ) -> Self {
        Self {
            pool,
            dispatcher,
            execution_timeout,
            emitter: None,
        }
    }

    /// Set an event emitter for instrumenting tool calls.
    pub fn with_event_emitter(mut self, emitter: Arc<dyn EventEmitter>) -> Self {
        self.emitter = Some(emitter);
        self
    }

    /// Execute a Python code fragment and return the structured result.
    ///
    /// This is the typed entry point the `Tool` impl delegates to; it is
    /// total: every fault comes back inside the `ExecutionResult`.
    pub async fn execute_python_code(&self, code: String) -> ExecutionResult {
        let pool = self.pool.clone();
        let timeout = self.execution_timeout;

        let dispatched = self
            .dispatcher
            .dispatch(async move {
                match SandboxSession::acquire(pool, timeout).await {
                    Ok(mut session) => match session.run(&code).await {
                        Ok(result) => result,
                        Err(e) => ExecutionResult::fault(e.to_string()),
                    },
                    Err(e) => ExecutionResult::fault(e.to_string()),
                }
            })
            .await;

        match dispatched {
            Ok(result) => result,
            Err(e) => ExecutionResult::fault(e.to_string()),
        }
    }
}

#[async_trait]
impl Tool for ExecutePythonCodeTool {
    fn name(&self) -> &str {
        EXECUTE_PYTHON_CODE
    }

    fn description(&self) -> &str {
        "Give a python code to execute in a sandboxed environment and get the \
         result. Returns success, stdout, stderr, exit_code, and error. Always \
         print() the value you want back."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "code": {
                    "type": "string",
                    "description": "The python code to execute"
                }
            },
            "required": ["code"]
        })
    }

    async fn execute(&self, args: Value) -> Result<ToolOutput> {
        let result = match args.get("code").and_then(|v| v.as_str()) {
            Some(code) => {
                emit(
                    &self.emitter,
                    EventEnvelope::new(EventType::ToolExecStarted, json!({ "tool_name": self.name() }))
                        .with_actor(self.name()),
                )
                .await;
                let started = Instant::now();
                let result = self.execute_python_code(code.to_string()).await;

                emit(
                    &self.emitter,
                    EventEnvelope::new(
                        EventType::ToolExecFinished,
                        serde_json::to_value(ToolExecPayload {
                            tool_name: self.name().to_string(),
                            input: None,
                            output: result.stdout.clone(),
                            duration_ms: Some(started.elapsed().as_millis() as u64),
                            error: result.error.clone(),
                        })
                        .unwrap_or_default(),
                    )
                    .with_actor(self.name())
                    .with_severity(if result.success {
                        EventSeverity::Info
                    } else {
                        EventSeverity::Warning
                    }),
                )
                .await;
                result
            }
            None => ExecutionResult::fault("missing required argument: code"),
        };

        let mut content = String::new();
        if let Some(stdout) = result.stdout.as_deref() {
            content.push_str(stdout);
        }
        if let Some(stderr) = result.stderr.as_deref() {
            if !stderr.is_empty() {
                if !content.is_empty() {
                    content.push_str("\n--- stderr ---\n");
                }
                content.push_str(stderr);
            }
        }
        if let Some(error) = result.error.as_deref() {
            content = error.to_string();
        }
        if content.is_empty() {
            content = format!("Execution completed with exit code {}", result.exit_code);
        }

        Ok(ToolOutput {
            success: result.success,
            content,
            data: Some(serde_json::to_value(&result).unwrap_or_default()),
        })
    }
}

// =============================================================================
// Install Python Libraries Tool
// =============================================================================

/// Tool for installing Python libraries into a sandbox container.
///
/// Installs mutate the leased container for the rest of its lifetime; they
/// do not propagate to other pool members. Pool-wide baselines are a
/// startup-time concern, not a tool concern.
pub struct InstallPythonLibrariesTool {
    pool: Arc<PoolManager>,
    dispatcher: Arc<Dispatcher>,
    install_timeout: Duration,
    emitter: Option<Arc<dyn EventEmitter>>,
}

impl InstallPythonLibrariesTool {
    pub fn new(
        pool: Arc<PoolManager>,
        dispatcher: Arc<Dispatcher>,
        install_timeout: Duration,
    ) -> Self {
        Self {
            pool,
            dispatcher,
            install_timeout,
            emitter: None,
        }
    }

    /// Set an event emitter for instrumenting tool calls.
    pub fn with_event_emitter(mut self, emitter: Arc<dyn EventEmitter>) -> Self {
        self.emitter = Some(emitter);
        self
    }

    /// Install the given libraries, first occurrence order preserved.
    pub async fn install_python_libraries(&self, libraries: Vec<String>) -> InstallResult {
        let libraries = dedup_preserving_order(libraries);
        if libraries.is_empty() {
            return InstallResult {
                success: true,
                error: None,
                stderr: None,
            };
        }

        let pool = self.pool.clone();
        let timeout = self.install_timeout;

        let dispatched = self
            .dispatcher
            .dispatch(async move {
                match SandboxSession::acquire(pool, timeout).await {
                    Ok(mut session) => match session.install_libraries(&libraries).await {
                        Ok(result) => InstallResult::from_execution(&result),
                        Err(e) => InstallResult::fault(e.to_string()),
                    },
                    Err(e) => InstallResult::fault(e.to_string()),
                }
            })
            .await;

        match dispatched {
            Ok(result) => result,
            Err(e) => InstallResult::fault(e.to_string()),
        }
    }
}

#[async_trait]
impl Tool for InstallPythonLibrariesTool {
    fn name(&self) -> &str {
        INSTALL_PYTHON_LIBRARIES
    }

    fn description(&self) -> &str {
        "Install python libraries in the sandboxed environment. Returns \
         success, error, and stderr (stderr only when the install failed)."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "libraries": {
                    "type": "array",
                    "items": { "type": "string" },
                    "description": "The python libraries to install, in order"
                }
            },
            "required": ["libraries"]
        })
    }

    async fn execute(&self, args: Value) -> Result<ToolOutput> {
        let libraries: Option<Vec<String>> = args.get("libraries").and_then(|v| {
            v.as_array().map(|items| {
                items
                    .iter()
                    .filter_map(|item| item.as_str().map(str::to_string))
                    .collect()
            })
        });

        let result = match libraries {
            Some(libraries) => {
                emit(
                    &self.emitter,
                    EventEnvelope::new(EventType::ToolExecStarted, json!({ "tool_name": self.name() }))
                        .with_actor(self.name()),
                )
                .await;
                let started = Instant::now();
                let result = self.install_python_libraries(libraries).await;

                emit(
                    &self.emitter,
                    EventEnvelope::new(
                        EventType::ToolExecFinished,
                        serde_json::to_value(ToolExecPayload {
                            tool_name: self.name().to_string(),
                            input: None,
                            output: None,
                            duration_ms: Some(started.elapsed().as_millis() as u64),
                            error: result.error.clone(),
                        })
                        .unwrap_or_default(),
                    )
                    .with_actor(self.name()),
                )
                .await;
                result
            }
            None => InstallResult::fault("missing required argument: libraries"),
        };

        let content = if result.success {
            "Libraries installed".to_string()
        } else {
            result
                .error
                .clone()
                .or_else(|| result.stderr.clone())
                .unwrap_or_else(|| "Library installation failed".to_string())
        };

        Ok(ToolOutput {
            success: result.success,
            content,
            data: Some(serde_json::to_value(&result).unwrap_or_default()),
        })
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dedup_preserves_first_occurrence_order() {
        let libs = vec![
            "pandas".to_string(),
            "numpy".to_string(),
            "pandas".to_string(),
            "scipy".to_string(),
        ];
        assert_eq!(
            dedup_preserving_order(libs),
            vec!["pandas".to_string(), "numpy".to_string(), "scipy".to_string()]
        );
    }
}
