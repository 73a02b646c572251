//! Error types for Pycell.

use thiserror::Error;

/// Result type alias using Pycell's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for Pycell.
#[derive(Error, Debug)]
pub enum Error {
    // =========================================================================
    // Pool Errors
    // =========================================================================
    #[error("Container provisioning failed: {0}")]
    Provisioning(String),

    #[error("No container became available within {waited_ms}ms")]
    PoolExhausted { waited_ms: u64 },

    #[error("Pool is closed")]
    PoolClosed,

    // =========================================================================
    // Sandbox Errors
    // =========================================================================
    #[error("Container runtime error: {0}")]
    Runtime(String),

    // =========================================================================
    // Tool Errors
    // =========================================================================
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    // =========================================================================
    // Agent Stream Errors
    // =========================================================================
    #[error("Agent stream error: {0}")]
    Stream(String),

    // =========================================================================
    // Generic Errors
    // =========================================================================
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl Error {
    /// Create a provisioning error.
    pub fn provisioning(msg: impl Into<String>) -> Self {
        Self::Provisioning(msg.into())
    }

    /// Create a pool-exhausted error for the given wait.
    pub fn pool_exhausted(waited: std::time::Duration) -> Self {
        Self::PoolExhausted {
            waited_ms: waited.as_millis() as u64,
        }
    }

    /// Create a container runtime error.
    pub fn runtime(msg: impl Into<String>) -> Self {
        Self::Runtime(msg.into())
    }

    /// Create an invalid request error.
    pub fn invalid_request(msg: impl Into<String>) -> Self {
        Self::InvalidRequest(msg.into())
    }

    /// Create an agent stream error.
    pub fn stream(msg: impl Into<String>) -> Self {
        Self::Stream(msg.into())
    }

    /// Create an internal error.
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pool_exhausted_reports_wait() {
        let err = Error::pool_exhausted(std::time::Duration::from_secs(30));
        assert_eq!(err.to_string(), "No container became available within 30000ms");
    }

    #[test]
    fn test_helper_constructors() {
        assert!(matches!(Error::provisioning("x"), Error::Provisioning(_)));
        assert!(matches!(Error::runtime("x"), Error::Runtime(_)));
        assert!(matches!(Error::stream("x"), Error::Stream(_)));
    }
}
