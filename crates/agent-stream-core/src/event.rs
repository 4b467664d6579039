//! Typed event records decoded from the task stream.

use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::question::Question;

/// Event kind discriminant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Text,
    Thinking,
    ToolUse,
    ToolResult,
    Error,
    Complete,
    AskUserQuestion,
}

/// Kind-specific payload of a stream event.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventPayload {
    /// Assistant text output.
    Text { content: String },
    /// Assistant reasoning output.
    Thinking { content: String },
    /// Tool invocation started.
    ToolUse {
        tool_name: String,
        #[serde(default)]
        tool_input: Value,
    },
    /// Tool invocation finished.
    ToolResult {
        #[serde(default)]
        tool_name: Option<String>,
        #[serde(default)]
        content: Option<String>,
        #[serde(default)]
        metadata: Option<Value>,
    },
    /// Task-semantic error reported by the server.
    Error {
        #[serde(default)]
        content: String,
    },
    /// Task reached terminal completion.
    Complete {
        #[serde(default)]
        metadata: Option<Value>,
    },
    /// The agent suspended and is waiting for a structured answer.
    AskUserQuestion { question: Question },
}

impl EventPayload {
    /// Kind discriminant for this payload.
    #[must_use]
    pub const fn kind(&self) -> EventKind {
        match self {
            Self::Text { .. } => EventKind::Text,
            Self::Thinking { .. } => EventKind::Thinking,
            Self::ToolUse { .. } => EventKind::ToolUse,
            Self::ToolResult { .. } => EventKind::ToolResult,
            Self::Error { .. } => EventKind::Error,
            Self::Complete { .. } => EventKind::Complete,
            Self::AskUserQuestion { .. } => EventKind::AskUserQuestion,
        }
    }
}

/// A decoded stream event. Immutable once decoded.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamEvent {
    #[serde(flatten)]
    pub payload: EventPayload,
    /// Server-reported session identifier, when present.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    /// Epoch milliseconds; zero until stamped by the decoder.
    #[serde(default)]
    pub timestamp: i64,
}

impl StreamEvent {
    /// Create an event stamped with the current time.
    #[must_use]
    pub fn new(payload: EventPayload) -> Self {
        Self {
            payload,
            session_id: None,
            timestamp: now_ms(),
        }
    }

    /// Kind discriminant for this event.
    #[must_use]
    pub const fn kind(&self) -> EventKind {
        self.payload.kind()
    }

    /// Fill in the timestamp with the current time if the wire omitted it.
    pub fn stamp(&mut self) {
        if self.timestamp == 0 {
            self.timestamp = now_ms();
        }
    }
}

fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_text_event_decodes_from_wire_json() {
        let event: StreamEvent =
            serde_json::from_str(r#"{"type":"text","content":"hi","session_id":"s-1"}"#).unwrap();
        assert_eq!(event.kind(), EventKind::Text);
        assert_eq!(event.session_id.as_deref(), Some("s-1"));
        if let EventPayload::Text { content } = &event.payload {
            assert_eq!(content, "hi");
        } else {
            panic!("wrong payload");
        }
    }

    #[test]
    fn test_tool_use_defaults_missing_input() {
        let event: StreamEvent =
            serde_json::from_str(r#"{"type":"tool_use","tool_name":"ls"}"#).unwrap();
        if let EventPayload::ToolUse { tool_name, tool_input } = &event.payload {
            assert_eq!(tool_name, "ls");
            assert!(tool_input.is_null());
        } else {
            panic!("wrong payload");
        }
    }

    #[test]
    fn test_stamp_preserves_wire_timestamp() {
        let mut event: StreamEvent =
            serde_json::from_str(r#"{"type":"complete","timestamp":42}"#).unwrap();
        event.stamp();
        assert_eq!(event.timestamp, 42);

        let mut unstamped: StreamEvent = serde_json::from_str(r#"{"type":"complete"}"#).unwrap();
        unstamped.stamp();
        assert!(unstamped.timestamp > 0);
    }
}
