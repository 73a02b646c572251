//! Core traits for Pycell.
//!
//! These traits define the contracts at the two external boundaries the
//! execution plane exposes: the agent-facing tool surface and the
//! instrumentation sink.

use async_trait::async_trait;
use serde_json::Value;

use crate::error::Result;
use crate::events::EventEnvelope;
use crate::types::{ToolDefinition, ToolOutput};

// =============================================================================
// Tool Traits
// =============================================================================

/// Tool interface consumed by the agent runtime.
///
/// Implementations must convert every internal fault into a structured
/// `ToolOutput`; an `Err` from `execute` is reserved for contract violations
/// the runtime itself must handle, never for sandbox failures.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Get the unique name of the tool.
    fn name(&self) -> &str;

    /// Get the human-readable description.
    fn description(&self) -> &str;

    /// Get the JSON Schema for parameters.
    fn parameters(&self) -> Value;

    /// Execute the tool with the given arguments.
    async fn execute(&self, args: Value) -> Result<ToolOutput>;
}

impl dyn Tool {
    /// The wire-level definition advertised to the model.
    pub fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.name().to_string(),
            description: self.description().to_string(),
            parameters: self.parameters(),
        }
    }
}

// =============================================================================
// Instrumentation Traits
// =============================================================================

/// Sink for structured span/trace events.
///
/// Emission is fire-and-forget: implementations must not fail the caller,
/// and callers must not depend on delivery for correctness.
#[async_trait]
pub trait EventEmitter: Send + Sync {
    async fn emit(&self, event: EventEnvelope);
}
