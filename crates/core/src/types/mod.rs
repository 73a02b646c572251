//! Shared domain types.

mod execution;
mod tool;
mod transcript;

pub use execution::{ExecutionResult, InstallResult};
pub use tool::{ToolDefinition, ToolOutput};
pub use transcript::{EntryKind, StreamEvent, Transcript, TranscriptEntry};
