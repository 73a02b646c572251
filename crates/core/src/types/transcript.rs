use serde::{Deserialize, Serialize};

// =============================================================================
// Stream Event Types
// =============================================================================

/// One event from the agent runtime's streamed run.
///
/// The runtime delivers a single causally-ordered sequence of these per
/// turn. The set is closed on purpose: payloads the runtime may add later
/// arrive as `Other` and are logged rather than silently dropped.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEvent {
    /// Model reasoning summary, possibly split across parts.
    Reasoning { parts: Vec<String> },
    /// A tool invocation with its structured arguments.
    ToolCall {
        name: String,
        arguments: serde_json::Value,
    },
    /// Final assistant text, possibly split across content parts.
    Message { parts: Vec<String> },
    /// An event kind this version does not understand.
    Other { kind: String },
}

impl StreamEvent {
    /// Single-part reasoning event.
    pub fn reasoning(text: impl Into<String>) -> Self {
        Self::Reasoning {
            parts: vec![text.into()],
        }
    }

    /// Single-part message event.
    pub fn message(text: impl Into<String>) -> Self {
        Self::Message {
            parts: vec![text.into()],
        }
    }

    pub fn tool_call(name: impl Into<String>, arguments: serde_json::Value) -> Self {
        Self::ToolCall {
            name: name.into(),
            arguments,
        }
    }
}

// =============================================================================
// Transcript Types
// =============================================================================

/// Category of a transcript entry, as rendered to the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryKind {
    Reasoning,
    Code,
    Output,
}

/// One categorized block of an agent turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscriptEntry {
    pub kind: EntryKind,
    pub content: String,
}

impl TranscriptEntry {
    pub fn new(kind: EntryKind, content: impl Into<String>) -> Self {
        Self {
            kind,
            content: content.into(),
        }
    }
}

/// Ordered record of one turn's streamed outputs.
///
/// Append-only while the turn is streaming; the classifier hands it out by
/// value once the turn completes, after which it is never mutated.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Transcript {
    entries: Vec<TranscriptEntry>,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, entry: TranscriptEntry) {
        self.entries.push(entry);
    }

    pub fn entries(&self) -> &[TranscriptEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn into_entries(self) -> Vec<TranscriptEntry> {
        self.entries
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stream_event_serde_tagging() {
        let event = StreamEvent::tool_call(
            "execute_python_code",
            serde_json::json!({"code": "print(1)"}),
        );
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "tool_call");
        assert_eq!(json["name"], "execute_python_code");

        let back: StreamEvent = serde_json::from_value(json).unwrap();
        assert!(matches!(back, StreamEvent::ToolCall { .. }));
    }

    #[test]
    fn test_transcript_preserves_push_order() {
        let mut transcript = Transcript::new();
        transcript.push(TranscriptEntry::new(EntryKind::Reasoning, "a"));
        transcript.push(TranscriptEntry::new(EntryKind::Code, "print(1)"));
        transcript.push(TranscriptEntry::new(EntryKind::Output, "b"));

        let kinds: Vec<EntryKind> = transcript.entries().iter().map(|e| e.kind).collect();
        assert_eq!(
            kinds,
            vec![EntryKind::Reasoning, EntryKind::Code, EntryKind::Output]
        );
    }
}
