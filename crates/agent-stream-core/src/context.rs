//! Resumable task context and the requests derived from it.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::question::AnswerValue;

/// Permission mode requested for the task.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PermissionMode {
    #[default]
    Default,
    AcceptEdits,
    Plan,
    BypassPermissions,
}

/// The resumable description of one logical task.
///
/// Created on submission and read-only thereafter, except that the server
/// session identifier is recorded as events report it. Resumption relies on
/// the server recognizing that identifier; the context only has to remember
/// it together with the original submission parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskContext {
    /// Prompt text submitted by the user.
    pub prompt: String,
    /// Working-directory hint for the agent.
    #[serde(default)]
    pub working_dir: Option<PathBuf>,
    /// Tool allow-list; empty means server defaults.
    #[serde(default)]
    pub allowed_tools: Vec<String>,
    /// Continue the previous conversation instead of starting fresh.
    #[serde(default)]
    pub continue_conversation: bool,
    /// Resume identifier supplied at submission time.
    #[serde(default)]
    pub resume_session_id: Option<String>,
    /// Permission mode for tool execution.
    #[serde(default)]
    pub permission_mode: PermissionMode,
    /// Latest session identifier reported by the server.
    #[serde(default)]
    server_session_id: Option<String>,
}

impl TaskContext {
    /// Create a context for a fresh task submission.
    #[must_use]
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            working_dir: None,
            allowed_tools: Vec::new(),
            continue_conversation: false,
            resume_session_id: None,
            permission_mode: PermissionMode::Default,
            server_session_id: None,
        }
    }

    /// Set the working directory hint.
    #[must_use]
    pub fn with_working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    /// Set the tool allow-list.
    #[must_use]
    pub fn with_allowed_tools<I>(mut self, tools: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<String>,
    {
        self.allowed_tools = tools.into_iter().map(Into::into).collect();
        self
    }

    /// Continue a previous conversation, optionally naming its session.
    #[must_use]
    pub fn continuing(mut self, session_id: Option<String>) -> Self {
        self.continue_conversation = true;
        self.resume_session_id = session_id;
        self
    }

    /// Set the permission mode.
    #[must_use]
    pub const fn with_permission_mode(mut self, mode: PermissionMode) -> Self {
        self.permission_mode = mode;
        self
    }

    /// Record a session identifier reported by the server.
    ///
    /// Empty values are ignored; a non-empty value always replaces the
    /// previous one, so the context converges on the most recent identifier
    /// regardless of how many reconnects happened in between.
    pub fn record_session_id(&mut self, session_id: &str) {
        if !session_id.is_empty() {
            self.server_session_id = Some(session_id.to_string());
        }
    }

    /// Latest known session identifier: what the server reported, falling
    /// back to the resume identifier supplied at submission.
    #[must_use]
    pub fn session_id(&self) -> Option<&str> {
        self.server_session_id
            .as_deref()
            .or(self.resume_session_id.as_deref())
    }

    /// Build the submission request for this context.
    ///
    /// A reconnect request is identical to the original except that it
    /// carries the latest known session identifier.
    #[must_use]
    pub fn to_request(&self, reconnect: bool) -> TaskRequest {
        let resume_session_id = if reconnect {
            self.session_id().map(ToString::to_string)
        } else {
            self.resume_session_id.clone()
        };

        TaskRequest {
            prompt: self.prompt.clone(),
            working_dir: self.working_dir.clone(),
            allowed_tools: self.allowed_tools.clone(),
            continue_conversation: self.continue_conversation,
            resume_session_id,
            permission_mode: self.permission_mode,
        }
    }
}

/// Task submission payload (client to server).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskRequest {
    pub prompt: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub working_dir: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub allowed_tools: Vec<String>,
    #[serde(default)]
    pub continue_conversation: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resume_session_id: Option<String>,
    #[serde(default)]
    pub permission_mode: PermissionMode,
}

/// Answer submission payload (client to server, out-of-band from the stream).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnswerRequest {
    pub session_id: String,
    pub question_id: String,
    pub answer: AnswerValue,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_id_prefers_latest_server_value() {
        let mut ctx = TaskContext::new("list files").continuing(Some("orig".into()));
        assert_eq!(ctx.session_id(), Some("orig"));

        ctx.record_session_id("s-1");
        ctx.record_session_id("");
        ctx.record_session_id("s-2");
        assert_eq!(ctx.session_id(), Some("s-2"));
    }

    #[test]
    fn test_reconnect_request_carries_latest_session_id() {
        let mut ctx = TaskContext::new("list files").continuing(Some("orig".into()));
        ctx.record_session_id("s-9");

        let initial = ctx.to_request(false);
        assert_eq!(initial.resume_session_id.as_deref(), Some("orig"));

        let reconnect = ctx.to_request(true);
        assert_eq!(reconnect.resume_session_id.as_deref(), Some("s-9"));
        assert_eq!(reconnect.prompt, initial.prompt);
        assert_eq!(reconnect.continue_conversation, initial.continue_conversation);
    }

    #[test]
    fn test_request_serialization_omits_empty_fields() {
        let json = serde_json::to_string(&TaskContext::new("hi").to_request(false)).unwrap();
        assert!(!json.contains("working_dir"));
        assert!(!json.contains("allowed_tools"));
        assert!(!json.contains("resume_session_id"));
        assert!(json.contains(r#""permission_mode":"default""#));
    }
}
