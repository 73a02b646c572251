//! Streamed run-event classification.
//!
//! One classifier instance handles one agent turn. It walks the turn's
//! causally-ordered event stream, concatenates multi-part payloads, invokes
//! the matching callback for each surfaced event, and appends to the
//! transcript in arrival order. Stream-level faults are not swallowed here:
//! an `Err` item ends the turn and propagates to the caller, who owns
//! user-visible reporting.

use futures::{Stream, StreamExt};

use pycell_core::{EntryKind, Result, StreamEvent, Transcript, TranscriptEntry};
use pycell_sandbox::{EXECUTE_PYTHON_CODE, INSTALL_PYTHON_LIBRARIES};

/// Callback receiving one surfaced text block.
pub type TextCallback = Box<dyn FnMut(&str) + Send>;

/// Lifecycle of one classified turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClassifierState {
    Idle,
    Streaming,
    Complete,
}

/// Classifies one turn's stream events into an ordered transcript.
pub struct EventStreamClassifier {
    state: ClassifierState,
    transcript: Transcript,
    on_reasoning: Option<TextCallback>,
    on_code: Option<TextCallback>,
    on_output: Option<TextCallback>,
}

impl EventStreamClassifier {
    pub fn new() -> Self {
        Self {
            state: ClassifierState::Idle,
            transcript: Transcript::new(),
            on_reasoning: None,
            on_code: None,
            on_output: None,
        }
    }

    /// Invoke `callback` for every non-empty reasoning block.
    pub fn on_reasoning(mut self, callback: impl FnMut(&str) + Send + 'static) -> Self {
        self.on_reasoning = Some(Box::new(callback));
        self
    }

    /// Invoke `callback` for every surfaced code fragment.
    pub fn on_code(mut self, callback: impl FnMut(&str) + Send + 'static) -> Self {
        self.on_code = Some(Box::new(callback));
        self
    }

    /// Invoke `callback` for every non-empty output block.
    pub fn on_output(mut self, callback: impl FnMut(&str) + Send + 'static) -> Self {
        self.on_output = Some(Box::new(callback));
        self
    }

    pub fn state(&self) -> ClassifierState {
        self.state
    }

    /// Consume the turn's event stream and return the finished transcript.
    ///
    /// The returned transcript preserves event arrival order across all
    /// entry kinds. Errors from the stream itself propagate immediately.
    pub async fn classify<S>(mut self, stream: S) -> Result<Transcript>
    where
        S: Stream<Item = Result<StreamEvent>>,
    {
        self.state = ClassifierState::Streaming;

        futures::pin_mut!(stream);
        while let Some(event) = stream.next().await {
            self.handle(event?);
        }

        self.state = ClassifierState::Complete;
        Ok(self.transcript)
    }

    fn handle(&mut self, event: StreamEvent) {
        match event {
            StreamEvent::Reasoning { parts } => {
                if let Some(text) = join_parts(&parts) {
                    if let Some(callback) = self.on_reasoning.as_mut() {
                        callback(&text);
                    }
                    self.transcript
                        .push(TranscriptEntry::new(EntryKind::Reasoning, text));
                }
            }
            StreamEvent::ToolCall { name, arguments } => self.handle_tool_call(&name, arguments),
            StreamEvent::Message { parts } => {
                if let Some(text) = join_parts(&parts) {
                    if let Some(callback) = self.on_output.as_mut() {
                        callback(&text);
                    }
                    self.transcript
                        .push(TranscriptEntry::new(EntryKind::Output, text));
                }
            }
            StreamEvent::Other { kind } => {
                tracing::warn!(kind = %kind, "Unknown stream event kind; skipping");
            }
        }
    }

    fn handle_tool_call(&mut self, name: &str, arguments: serde_json::Value) {
        match name {
            EXECUTE_PYTHON_CODE => match extract_code(arguments) {
                Some(code) => {
                    if let Some(callback) = self.on_code.as_mut() {
                        callback(&code);
                    }
                    self.transcript
                        .push(TranscriptEntry::new(EntryKind::Code, code));
                }
                None => {
                    tracing::warn!(
                        tool = EXECUTE_PYTHON_CODE,
                        "Tool call arguments carry no code field; skipping"
                    );
                }
            },
            // Installs mutate the environment but are not part of the
            // rendered conversation.
            INSTALL_PYTHON_LIBRARIES => {
                tracing::debug!(tool = name, "Install tool call not surfaced to transcript");
            }
            other => {
                tracing::warn!(tool = %other, "Tool call for unknown tool; skipping");
            }
        }
    }
}

impl Default for EventStreamClassifier {
    fn default() -> Self {
        Self::new()
    }
}

/// Concatenate non-empty parts in arrival order, blank-line separated.
/// Returns None when nothing survives, so empty events produce neither a
/// callback nor a transcript entry.
fn join_parts(parts: &[String]) -> Option<String> {
    let joined = parts
        .iter()
        .filter(|part| !part.is_empty())
        .cloned()
        .collect::<Vec<_>>()
        .join("\n\n");
    if joined.is_empty() {
        None
    } else {
        Some(joined)
    }
}

/// Pull the `code` field out of tool-call arguments. Models sometimes send
/// the arguments object JSON-encoded as a string; both forms are accepted.
fn extract_code(arguments: serde_json::Value) -> Option<String> {
    let arguments = match arguments {
        serde_json::Value::String(raw) => serde_json::from_str(&raw).ok()?,
        other => other,
    };
    arguments
        .get("code")
        .and_then(|v| v.as_str())
        .map(str::to_string)
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_join_parts_drops_empties() {
        assert_eq!(join_parts(&["a".into()]), Some("a".into()));
        assert_eq!(
            join_parts(&["a".into(), String::new(), "b".into()]),
            Some("a\n\nb".into())
        );
        assert_eq!(join_parts(&[String::new(), String::new()]), None);
        assert_eq!(join_parts(&[]), None);
    }

    #[test]
    fn test_extract_code_from_object_and_string() {
        let from_object = extract_code(serde_json::json!({"code": "print(1)"}));
        assert_eq!(from_object.as_deref(), Some("print(1)"));

        let from_string =
            extract_code(serde_json::Value::String(r#"{"code": "print(2)"}"#.into()));
        assert_eq!(from_string.as_deref(), Some("print(2)"));

        assert!(extract_code(serde_json::json!({"other": 1})).is_none());
        assert!(extract_code(serde_json::Value::String("not json".into())).is_none());
    }

    #[test]
    fn test_initial_state_is_idle() {
        let classifier = EventStreamClassifier::new();
        assert_eq!(classifier.state(), ClassifierState::Idle);
    }
}
