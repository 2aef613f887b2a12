// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Message types for the conversation history
//!
//! History is an append-only list owned by the request session. Compaction
//! hooks may swap a tool return for a placeholder copy, but never edit a
//! message in place.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Rough chars-per-token ratio used for context estimates
pub const CHARS_PER_TOKEN: usize = 4;

/// Estimate the token count of a string.
pub fn estimate_tokens(text: &str) -> usize {
    text.len().div_ceil(CHARS_PER_TOKEN)
}

/// A single entry in the conversation history
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    /// Unique identifier for the message
    pub id: Uuid,

    /// When the message was created
    pub timestamp: DateTime<Utc>,

    /// What the message carries
    pub kind: MessageKind,
}

/// The four kinds of history entries
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MessageKind {
    /// Instruction or guidance sent to the model
    UserRequest { content: String },

    /// Model reasoning that is not part of the answer
    AssistantThought { content: String },

    /// Model output: text and tool calls, in emitted order
    AssistantResponse { parts: Vec<ResponsePart> },

    /// Result of one tool call
    ToolReturn {
        tool_call_id: String,
        tool_name: String,
        content: String,
        #[serde(default)]
        is_error: bool,
    },
}

/// A part of a model response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ResponsePart {
    /// Text content
    Text { text: String },

    /// Structured tool call
    ToolCall {
        id: String,
        name: String,
        #[serde(default)]
        args: serde_json::Value,
    },
}

impl ResponsePart {
    pub fn text(text: impl Into<String>) -> Self {
        ResponsePart::Text { text: text.into() }
    }

    pub fn tool_call(id: impl Into<String>, name: impl Into<String>, args: serde_json::Value) -> Self {
        ResponsePart::ToolCall {
            id: id.into(),
            name: name.into(),
            args,
        }
    }

    pub fn is_tool_call(&self) -> bool {
        matches!(self, ResponsePart::ToolCall { .. })
    }
}

impl Message {
    fn new(kind: MessageKind) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            kind,
        }
    }

    /// Create a user request (instruction or injected guidance)
    pub fn user_request(content: impl Into<String>) -> Self {
        Self::new(MessageKind::UserRequest {
            content: content.into(),
        })
    }

    /// Create an assistant thought
    pub fn thought(content: impl Into<String>) -> Self {
        Self::new(MessageKind::AssistantThought {
            content: content.into(),
        })
    }

    /// Create an assistant response
    pub fn response(parts: Vec<ResponsePart>) -> Self {
        Self::new(MessageKind::AssistantResponse { parts })
    }

    /// Create a successful tool return
    pub fn tool_return(
        tool_call_id: impl Into<String>,
        tool_name: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self::new(MessageKind::ToolReturn {
            tool_call_id: tool_call_id.into(),
            tool_name: tool_name.into(),
            content: content.into(),
            is_error: false,
        })
    }

    /// Create a tool return that reports an error or rejection to the model
    pub fn tool_error(
        tool_call_id: impl Into<String>,
        tool_name: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self::new(MessageKind::ToolReturn {
            tool_call_id: tool_call_id.into(),
            tool_name: tool_name.into(),
            content: content.into(),
            is_error: true,
        })
    }

    pub fn is_user_request(&self) -> bool {
        matches!(self.kind, MessageKind::UserRequest { .. })
    }

    pub fn is_tool_return(&self) -> bool {
        matches!(self.kind, MessageKind::ToolReturn { .. })
    }

    /// Text content of the message, if it has any.
    pub fn text(&self) -> Option<String> {
        match &self.kind {
            MessageKind::UserRequest { content }
            | MessageKind::AssistantThought { content }
            | MessageKind::ToolReturn { content, .. } => Some(content.clone()),
            MessageKind::AssistantResponse { parts } => {
                let segments: Vec<&str> = parts
                    .iter()
                    .filter_map(|part| match part {
                        ResponsePart::Text { text } if !text.trim().is_empty() => {
                            Some(text.as_str())
                        }
                        _ => None,
                    })
                    .collect();
                if segments.is_empty() {
                    None
                } else {
                    Some(segments.join("\n"))
                }
            }
        }
    }

    /// IDs of the tool calls carried by an assistant response.
    pub fn tool_call_ids(&self) -> Vec<&str> {
        match &self.kind {
            MessageKind::AssistantResponse { parts } => parts
                .iter()
                .filter_map(|part| match part {
                    ResponsePart::ToolCall { id, .. } => Some(id.as_str()),
                    ResponsePart::Text { .. } => None,
                })
                .collect(),
            _ => Vec::new(),
        }
    }

    /// Estimated token count of the message body.
    pub fn estimated_tokens(&self) -> usize {
        match &self.kind {
            MessageKind::AssistantResponse { parts } => parts
                .iter()
                .map(|part| match part {
                    ResponsePart::Text { text } => estimate_tokens(text),
                    ResponsePart::ToolCall { name, args, .. } => {
                        estimate_tokens(name) + estimate_tokens(&args.to_string())
                    }
                })
                .sum(),
            _ => self.text().map(|t| estimate_tokens(&t)).unwrap_or(0),
        }
    }

    /// Copy of a tool return with its content replaced, keeping id and timestamp.
    pub fn with_replaced_tool_content(&self, content: impl Into<String>) -> Option<Self> {
        match &self.kind {
            MessageKind::ToolReturn {
                tool_call_id,
                tool_name,
                is_error,
                ..
            } => Some(Self {
                id: self.id,
                timestamp: self.timestamp,
                kind: MessageKind::ToolReturn {
                    tool_call_id: tool_call_id.clone(),
                    tool_name: tool_name.clone(),
                    content: content.into(),
                    is_error: *is_error,
                },
            }),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_user_request() {
        let msg = Message::user_request("fix the build");
        assert!(msg.is_user_request());
        assert_eq!(msg.text().as_deref(), Some("fix the build"));
    }

    #[test]
    fn test_response_text_skips_tool_calls_and_blank_parts() {
        let msg = Message::response(vec![
            ResponsePart::text("Reading the file."),
            ResponsePart::tool_call("c1", "read_file", json!({"file_path": "a.rs"})),
            ResponsePart::text("   "),
        ]);
        assert_eq!(msg.text().as_deref(), Some("Reading the file."));
        assert_eq!(msg.tool_call_ids(), vec!["c1"]);
    }

    #[test]
    fn test_response_without_text() {
        let msg = Message::response(vec![ResponsePart::tool_call("c1", "grep", json!({}))]);
        assert!(msg.text().is_none());
    }

    #[test]
    fn test_tool_error_flag() {
        let msg = Message::tool_error("c1", "bash", "denied");
        match msg.kind {
            MessageKind::ToolReturn { is_error, .. } => assert!(is_error),
            _ => panic!("Expected tool return"),
        }
    }

    #[test]
    fn test_estimate_tokens() {
        assert_eq!(estimate_tokens(""), 0);
        assert_eq!(estimate_tokens("abcd"), 1);
        assert_eq!(estimate_tokens("abcde"), 2);
    }

    #[test]
    fn test_replaced_tool_content_keeps_identity() {
        let msg = Message::tool_return("c1", "read_file", "x".repeat(100));
        let replaced = msg.with_replaced_tool_content("[cleared]").unwrap();
        assert_eq!(replaced.id, msg.id);
        assert_eq!(replaced.text().as_deref(), Some("[cleared]"));
        assert!(Message::user_request("hi")
            .with_replaced_tool_content("x")
            .is_none());
    }

    #[test]
    fn test_message_serde_tags() {
        let msg = Message::response(vec![ResponsePart::text("hi")]);
        let value = serde_json::to_value(&msg).unwrap();
        assert_eq!(value["kind"]["kind"], "assistant_response");
        assert_eq!(value["kind"]["parts"][0]["type"], "text");
    }
}
