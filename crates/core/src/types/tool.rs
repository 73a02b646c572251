use serde::{Deserialize, Serialize};

// =============================================================================
// Tool Types
// =============================================================================

/// Output from a tool execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolOutput {
    /// Whether the tool execution was successful.
    pub success: bool,

    /// Human-readable output content.
    pub content: String,

    /// Structured result data in the tool's documented JSON shape.
    pub data: Option<serde_json::Value>,
}

impl ToolOutput {
    /// Create a successful text output.
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            success: true,
            content: content.into(),
            data: None,
        }
    }

    /// Attach structured data.
    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.data = Some(data);
        self
    }

    /// Create a failed output.
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            success: false,
            content: message.into(),
            data: None,
        }
    }
}

/// Tool definition advertised to the agent runtime.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    /// Unique tool name.
    pub name: String,

    /// Human-readable description.
    pub description: String,

    /// JSON Schema for tool arguments.
    pub parameters: serde_json::Value,
}
