//! Sandbox integration tests.
//!
//! Tests the full pipeline: Tool → Dispatcher → SandboxSession → PoolManager
//! → ContainerRuntime (MockRuntime). These tests do NOT require Docker —
//! they use MockRuntime for deterministic behavior.

use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

use pycell_core::traits::{EventEmitter, Tool};
use pycell_core::{EventEnvelope, EventType};
use pycell_sandbox::{
    Dispatcher, ExecOutput, ExecutePythonCodeTool, InstallPythonLibrariesTool, MockRuntime,
    PoolConfig, PoolManager,
};

// =============================================================================
// Helpers
// =============================================================================

fn ok_exec(stdout: &str) -> ExecOutput {
    ExecOutput {
        exit_code: 0,
        stdout: stdout.into(),
        stderr: String::new(),
        timed_out: false,
    }
}

fn make_pool(runtime: Arc<MockRuntime>, max_size: usize) -> Arc<PoolManager> {
    Arc::new(PoolManager::new(
        runtime,
        PoolConfig {
            max_size,
            acquire_timeout: Duration::from_millis(500),
            provision_backoff: Duration::from_millis(1),
            ..PoolConfig::default()
        },
    ))
}

fn execute_tool(pool: Arc<PoolManager>) -> ExecutePythonCodeTool {
    ExecutePythonCodeTool::new(pool, Arc::new(Dispatcher::new(4)), Duration::from_secs(30))
}

fn install_tool(pool: Arc<PoolManager>) -> InstallPythonLibrariesTool {
    InstallPythonLibrariesTool::new(pool, Arc::new(Dispatcher::new(4)), Duration::from_secs(120))
}

// =============================================================================
// 1. Successful code execution
// =============================================================================

#[tokio::test]
async fn test_execute_code_success() {
    // First response answers code staging, second the interpreter run.
    let runtime = Arc::new(MockRuntime::new(vec![ok_exec(""), ok_exec("1\n")]));
    let pool = make_pool(runtime, 2);
    let tool = execute_tool(pool);

    let result = tool.execute_python_code("print(1)".into()).await;

    assert!(result.success);
    assert_eq!(result.exit_code, 0);
    assert!(result.stdout.unwrap().contains('1'));
    assert!(result.error.is_none());
}

// =============================================================================
// 2. Faults never raise past the tool boundary
// =============================================================================

#[tokio::test]
async fn test_sandbox_fault_is_captured_not_raised() {
    // Exhaust provisioning: every create fails, retries included.
    let runtime = Arc::new(MockRuntime::default());
    runtime.fail_next_creates(64);
    let pool = make_pool(runtime, 2);
    let tool = execute_tool(pool);

    let output = tool.execute(json!({"code": "print(1)"})).await.unwrap();

    assert!(!output.success);
    let data = output.data.unwrap();
    assert_eq!(data["success"], false);
    assert!(data["error"].as_str().unwrap().contains("provisioning"));
    assert_eq!(data["exit_code"], -1);
}

#[tokio::test]
async fn test_missing_code_argument_is_structured_failure() {
    let pool = make_pool(Arc::new(MockRuntime::default()), 2);
    let tool = execute_tool(pool);

    let output = tool.execute(json!({})).await.unwrap();

    assert!(!output.success);
    assert!(output.content.contains("missing required argument"));
}

#[tokio::test]
async fn test_nonzero_exit_surfaces_via_exit_code() {
    let runtime = Arc::new(MockRuntime::new(vec![
        ok_exec(""),
        ExecOutput {
            exit_code: 2,
            stdout: String::new(),
            stderr: "SyntaxError: invalid syntax".into(),
            timed_out: false,
        },
    ]));
    let pool = make_pool(runtime, 2);
    let tool = execute_tool(pool);

    let result = tool.execute_python_code("def:".into()).await;

    assert!(!result.success);
    assert_eq!(result.exit_code, 2);
    assert!(result.stderr.unwrap().contains("SyntaxError"));
    assert!(result.error.is_none());
}

// =============================================================================
// 3. Timeout retires the container
// =============================================================================

#[tokio::test]
async fn test_timeout_destroys_container_and_pool_recovers() {
    let runtime = Arc::new(MockRuntime::new(vec![
        ok_exec(""),
        ExecOutput {
            exit_code: -1,
            stdout: String::new(),
            stderr: String::new(),
            timed_out: true,
        },
        // Responses for the follow-up call on a fresh container.
        ok_exec(""),
        ok_exec("2\n"),
    ]));
    let pool = make_pool(runtime.clone(), 2);
    let tool = execute_tool(pool.clone());

    let result = tool.execute_python_code("while True: pass".into()).await;
    assert!(!result.success);
    assert!(result.error.unwrap().contains("timed out"));

    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(runtime.destroyed_handles().len(), 1);

    // The next call provisions a replacement and succeeds.
    let result = tool.execute_python_code("print(2)".into()).await;
    assert!(result.success);
    assert_eq!(runtime.created_count(), 2);
}

// =============================================================================
// 4. Pool ceiling holds across prewarm + on-demand + tool traffic
// =============================================================================

#[tokio::test]
async fn test_pool_ceiling_holds_under_concurrent_tool_calls() {
    let runtime = Arc::new(MockRuntime::default());
    let pool = make_pool(runtime.clone(), 3);
    pool.prewarm(2).await;

    let dispatcher = Arc::new(Dispatcher::new(8));
    let tool = Arc::new(ExecutePythonCodeTool::new(
        pool.clone(),
        dispatcher,
        Duration::from_secs(30),
    ));

    let mut tasks = Vec::new();
    for i in 0..12 {
        let tool = tool.clone();
        tasks.push(tokio::spawn(async move {
            tool.execute_python_code(format!("print({})", i)).await
        }));
    }
    for task in tasks {
        let result = task.await.unwrap();
        assert!(result.success);
    }

    assert!(runtime.peak_live_count() <= 3);
    assert_eq!(pool.stats().leased, 0);
}

// =============================================================================
// 5. Install tool shape
// =============================================================================

#[tokio::test]
async fn test_install_success_has_no_stderr() {
    let runtime = Arc::new(MockRuntime::new(vec![ok_exec("Successfully installed pandas")]));
    let pool = make_pool(runtime, 2);
    let tool = install_tool(pool);

    let result = tool
        .install_python_libraries(vec!["pandas".into()])
        .await;

    assert!(result.success);
    assert!(result.error.is_none());
    assert!(result.stderr.is_none());
}

#[tokio::test]
async fn test_install_failure_carries_stderr() {
    let runtime = Arc::new(MockRuntime::new(vec![ExecOutput {
        exit_code: 1,
        stdout: String::new(),
        stderr: "ERROR: No matching distribution found for nosuchlib".into(),
        timed_out: false,
    }]));
    let pool = make_pool(runtime, 2);
    let tool = install_tool(pool);

    let output = tool
        .execute(json!({"libraries": ["nosuchlib"]}))
        .await
        .unwrap();

    assert!(!output.success);
    let data = output.data.unwrap();
    assert_eq!(data["success"], false);
    assert!(data["stderr"]
        .as_str()
        .unwrap()
        .contains("No matching distribution"));
}

#[tokio::test]
async fn test_install_empty_list_is_a_noop() {
    let runtime = Arc::new(MockRuntime::default());
    let pool = make_pool(runtime.clone(), 2);
    let tool = install_tool(pool);

    let result = tool.install_python_libraries(vec![]).await;

    assert!(result.success);
    assert_eq!(runtime.created_count(), 0);
}

// =============================================================================
// 6. Instrumentation envelopes reach the sink
// =============================================================================

#[derive(Default)]
struct RecordingEmitter {
    events: std::sync::Mutex<Vec<EventEnvelope>>,
}

#[async_trait::async_trait]
impl EventEmitter for RecordingEmitter {
    async fn emit(&self, event: EventEnvelope) {
        self.events.lock().unwrap().push(event);
    }
}

#[tokio::test]
async fn test_tool_calls_and_container_churn_are_instrumented() {
    let emitter = Arc::new(RecordingEmitter::default());
    let runtime = Arc::new(MockRuntime::new(vec![ok_exec(""), ok_exec("1\n")]));
    let pool = Arc::new(
        PoolManager::new(
            runtime,
            PoolConfig {
                max_size: 2,
                ..PoolConfig::default()
            },
        )
        .with_event_emitter(emitter.clone()),
    );
    let tool = ExecutePythonCodeTool::new(
        pool,
        Arc::new(Dispatcher::new(4)),
        Duration::from_secs(30),
    )
    .with_event_emitter(emitter.clone());

    let result = tool.execute(json!({"code": "print(1)"})).await.unwrap();
    assert!(result.success);

    // Pool-side envelopes are emitted on spawned tasks.
    tokio::time::sleep(Duration::from_millis(20)).await;

    let kinds: Vec<EventType> = emitter
        .events
        .lock()
        .unwrap()
        .iter()
        .map(|e| e.event_type.clone())
        .collect();
    assert!(kinds.contains(&EventType::ToolExecStarted));
    assert!(kinds.contains(&EventType::ToolExecFinished));
    assert!(kinds.contains(&EventType::ContainerCreated));
}

// =============================================================================
// 7. Cancellation releases the lease
// =============================================================================

#[tokio::test]
async fn test_cancelled_tool_call_releases_container() {
    let runtime = Arc::new(MockRuntime::default());
    runtime.set_exec_delay(Duration::from_secs(60));
    let pool = make_pool(runtime, 2);
    let tool = Arc::new(execute_tool(pool.clone()));

    let call = {
        let tool = tool.clone();
        tokio::spawn(async move { tool.execute_python_code("print(1)".into()).await })
    };

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(pool.stats().leased, 1);
    call.abort();
    let _ = call.await;
    tokio::time::sleep(Duration::from_millis(20)).await;

    // Immediately after cancellation the full pool is acquirable.
    let a = pool.acquire_timeout(Duration::from_millis(100)).await.unwrap();
    let b = pool.acquire_timeout(Duration::from_millis(100)).await.unwrap();
    pool.release(a, true);
    pool.release(b, true);
}
