//! Conversation messages.
//!
//! A turn's full message list is the authoritative history; no hidden
//! state drives the agent other than the resolver context and the
//! system prompt.

use serde::{Deserialize, Serialize};

/// Message author role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// System prompt.
    System,
    /// End-user question.
    User,
    /// Agent output (plans, notes, answers).
    Assistant,
    /// Tool result summary.
    Tool,
}

/// One message in a session's history. Append-only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Author role.
    pub role: Role,
    /// Message text.
    pub content: String,
    /// Unix timestamp (seconds).
    pub timestamp: i64,
    /// Names of tools this message invoked, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<String>>,
    /// Name of the tool this message carries results for, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_result_of: Option<String>,
}

impl Message {
    /// Creates a message stamped with the current time.
    #[must_use]
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            timestamp: chrono::Utc::now().timestamp(),
            tool_calls: None,
            tool_result_of: None,
        }
    }

    /// Creates a system message.
    #[must_use]
    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    /// Creates a user message.
    #[must_use]
    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    /// Creates an assistant message.
    #[must_use]
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }

    /// Creates a tool-result message.
    #[must_use]
    pub fn tool_result(tool_name: impl Into<String>, content: impl Into<String>) -> Self {
        let mut message = Self::new(Role::Tool, content);
        message.tool_result_of = Some(tool_name.into());
        message
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constructors() {
        let msg = Message::user("hello");
        assert_eq!(msg.role, Role::User);
        assert_eq!(msg.content, "hello");
        assert!(msg.tool_calls.is_none());

        let msg = Message::tool_result("search_recalls", "3 records");
        assert_eq!(msg.role, Role::Tool);
        assert_eq!(msg.tool_result_of.as_deref(), Some("search_recalls"));
    }

    #[test]
    fn test_role_serde_lowercase() {
        assert_eq!(serde_json::to_string(&Role::Assistant).unwrap(), "\"assistant\"");
        let role: Role = serde_json::from_str("\"tool\"").unwrap();
        assert_eq!(role, Role::Tool);
    }

    #[test]
    fn test_message_roundtrip() {
        let msg = Message::system("you are an FDA device agent");
        let json = serde_json::to_string(&msg).unwrap();
        let back: Message = serde_json::from_str(&json).unwrap();
        assert_eq!(back, msg);
    }
}
