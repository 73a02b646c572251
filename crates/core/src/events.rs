use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Structured event envelope delivered to the instrumentation sink.
///
/// The sink is an external collaborator: envelopes are emitted best-effort
/// and nothing in the execution path depends on delivery.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventEnvelope {
    /// Unique event ID
    pub id: String,
    /// Trace ID correlating events within one agent turn
    pub trace_id: String,
    /// Conversation session ID (if applicable)
    pub session_id: Option<String>,
    /// Actor who triggered the event (tool name, pool, or 'system')
    pub actor: String,
    /// Timestamp of the event
    pub timestamp: DateTime<Utc>,
    /// Event type category
    pub event_type: EventType,
    /// Event severity level
    pub severity: EventSeverity,
    /// Structured payload (event-specific data)
    pub payload: serde_json::Value,
}

impl EventEnvelope {
    pub fn new(event_type: EventType, payload: serde_json::Value) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            trace_id: Uuid::new_v4().to_string(), // Default, overwritten by context
            session_id: None,
            actor: "system".to_string(),
            timestamp: Utc::now(),
            event_type,
            severity: EventSeverity::Info,
            payload,
        }
    }

    pub fn with_trace(mut self, trace_id: &str) -> Self {
        self.trace_id = trace_id.to_string();
        self
    }

    pub fn with_session(mut self, session_id: &str) -> Self {
        self.session_id = Some(session_id.to_string());
        self
    }

    pub fn with_actor(mut self, actor: &str) -> Self {
        self.actor = actor.to_string();
        self
    }

    pub fn with_severity(mut self, severity: EventSeverity) -> Self {
        self.severity = severity;
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventType {
    /// Tool execution started
    ToolExecStarted,
    /// Tool execution finished
    ToolExecFinished,
    /// Container provisioned and started
    ContainerCreated,
    /// Container stopped and removed
    ContainerDestroyed,
    /// An acquire waited out its deadline
    PoolExhausted,
    /// Pool drained at shutdown
    PoolClosed,
    /// System error or exception
    SystemError,
    /// Generic/Other event
    Other(String),
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventSeverity {
    Debug,
    Info,
    Warning,
    Error,
    Critical,
}

// Helper structs for common payloads

#[derive(Serialize, Deserialize)]
pub struct ToolExecPayload {
    pub tool_name: String,
    pub input: Option<serde_json::Value>,
    pub output: Option<String>,
    pub duration_ms: Option<u64>,
    pub error: Option<String>,
}

#[derive(Serialize, Deserialize)]
pub struct ContainerPayload {
    pub container_id: String,
    pub image: String,
    pub reason: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_envelope_builders() {
        let event = EventEnvelope::new(EventType::ContainerCreated, serde_json::json!({}))
            .with_trace("trace-1")
            .with_session("session-1")
            .with_actor("pool")
            .with_severity(EventSeverity::Debug);

        assert_eq!(event.trace_id, "trace-1");
        assert_eq!(event.session_id.as_deref(), Some("session-1"));
        assert_eq!(event.actor, "pool");
        assert_eq!(event.severity, EventSeverity::Debug);
    }
}
