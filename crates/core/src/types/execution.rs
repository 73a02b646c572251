use serde::{Deserialize, Serialize};

// =============================================================================
// Execution Result Types
// =============================================================================

/// Result of executing a code fragment or command in the sandbox.
///
/// Invariant: `success` holds exactly when `exit_code == 0` and `error` is
/// `None`. The constructors below are the only way the rest of the codebase
/// builds one, so the invariant cannot drift.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionResult {
    /// Whether the execution completed with exit code 0 and no fault.
    pub success: bool,
    /// Captured standard output (None when the fragment never ran).
    pub stdout: Option<String>,
    /// Captured standard error (None when the fragment never ran).
    pub stderr: Option<String>,
    /// Exit code of the in-container process (-1 for faults and timeouts).
    pub exit_code: i64,
    /// Fault description when the fragment could not be executed at all,
    /// or ran past its time bound.
    pub error: Option<String>,
}

impl ExecutionResult {
    /// A fragment that ran to completion, successfully or not.
    pub fn completed(stdout: String, stderr: String, exit_code: i64) -> Self {
        Self {
            success: exit_code == 0,
            stdout: Some(stdout),
            stderr: Some(stderr),
            exit_code,
            error: None,
        }
    }

    /// A fragment that was force-terminated at the execution timeout.
    /// Partial output captured before the kill is preserved.
    pub fn timed_out(stdout: String, stderr: String, timeout: std::time::Duration) -> Self {
        Self {
            success: false,
            stdout: Some(stdout),
            stderr: Some(stderr),
            exit_code: -1,
            error: Some(format!(
                "execution timed out after {}s",
                timeout.as_secs()
            )),
        }
    }

    /// A fragment that never executed because of an internal fault
    /// (pool exhaustion, provisioning failure, runtime error).
    pub fn fault(message: impl Into<String>) -> Self {
        Self {
            success: false,
            stdout: None,
            stderr: None,
            exit_code: -1,
            error: Some(message.into()),
        }
    }
}

/// Result of a library installation, as surfaced to the agent.
///
/// `stderr` is populated only when the install command failed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstallResult {
    pub success: bool,
    pub error: Option<String>,
    pub stderr: Option<String>,
}

impl InstallResult {
    /// Derive the install shape from the underlying command result.
    pub fn from_execution(result: &ExecutionResult) -> Self {
        Self {
            success: result.success,
            error: result.error.clone(),
            stderr: if result.success {
                None
            } else {
                result.stderr.clone()
            },
        }
    }

    pub fn fault(message: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(message.into()),
            stderr: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn invariant_holds(r: &ExecutionResult) -> bool {
        r.success == (r.exit_code == 0 && r.error.is_none())
    }

    #[test]
    fn test_completed_success() {
        let r = ExecutionResult::completed("1\n".into(), String::new(), 0);
        assert!(r.success);
        assert!(invariant_holds(&r));
    }

    #[test]
    fn test_completed_nonzero_exit() {
        let r = ExecutionResult::completed(String::new(), "Traceback".into(), 1);
        assert!(!r.success);
        assert!(r.error.is_none());
        assert!(invariant_holds(&r));
    }

    #[test]
    fn test_timed_out() {
        let r = ExecutionResult::timed_out(
            "partial".into(),
            String::new(),
            std::time::Duration::from_secs(30),
        );
        assert!(!r.success);
        assert_eq!(r.error.as_deref(), Some("execution timed out after 30s"));
        assert!(invariant_holds(&r));
    }

    #[test]
    fn test_fault_has_no_captured_output() {
        let r = ExecutionResult::fault("pool exhausted");
        assert!(!r.success);
        assert!(r.stdout.is_none());
        assert!(r.stderr.is_none());
        assert!(invariant_holds(&r));
    }

    #[test]
    fn test_install_result_stderr_only_on_failure() {
        let ok = ExecutionResult::completed("installed".into(), "warnings".into(), 0);
        let failed = ExecutionResult::completed(String::new(), "ERROR: no dist".into(), 1);

        assert!(InstallResult::from_execution(&ok).stderr.is_none());
        assert_eq!(
            InstallResult::from_execution(&failed).stderr.as_deref(),
            Some("ERROR: no dist")
        );
    }
}
