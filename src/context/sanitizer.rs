// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Removes tool calls left without a result
//!
//! A session interrupted mid-batch leaves calls the provider will reject on
//! resume. Calls with no matching return are dropped, along with responses
//! that end up empty and returns whose call no longer exists.

use std::collections::HashSet;

use crate::llm::message::{Message, MessageKind, ResponsePart};

#[derive(Debug, Clone, Copy, Default)]
pub struct DanglingCallSanitizer;

impl DanglingCallSanitizer {
    pub fn sanitize(&self, history: Vec<Message>) -> Vec<Message> {
        let returned: HashSet<String> = history
            .iter()
            .filter_map(|message| match &message.kind {
                MessageKind::ToolReturn { tool_call_id, .. } => Some(tool_call_id.clone()),
                _ => None,
            })
            .collect();

        let mut kept_calls: HashSet<String> = HashSet::new();
        let mut dropped_calls = 0usize;
        let mut cleaned: Vec<Message> = Vec::with_capacity(history.len());

        for message in history {
            match message.kind {
                MessageKind::AssistantResponse { parts } => {
                    let before = parts.len();
                    let parts: Vec<ResponsePart> = parts
                        .into_iter()
                        .filter(|part| match part {
                            ResponsePart::ToolCall { id, .. } => returned.contains(id),
                            ResponsePart::Text { .. } => true,
                        })
                        .collect();
                    dropped_calls += before - parts.len();

                    for part in &parts {
                        if let ResponsePart::ToolCall { id, .. } = part {
                            kept_calls.insert(id.clone());
                        }
                    }
                    if parts.is_empty() {
                        continue;
                    }
                    cleaned.push(Message {
                        kind: MessageKind::AssistantResponse { parts },
                        ..message
                    });
                }
                kind => cleaned.push(Message { kind, ..message }),
            }
        }

        // Orphan returns
        let before = cleaned.len();
        cleaned.retain(|message| match &message.kind {
            MessageKind::ToolReturn { tool_call_id, .. } => kept_calls.contains(tool_call_id),
            _ => true,
        });
        let orphan_returns = before - cleaned.len();

        if dropped_calls > 0 || orphan_returns > 0 {
            tracing::info!(
                target: "tack.context",
                dropped_calls,
                orphan_returns,
                "Removed dangling tool calls from history"
            );
        }
        cleaned
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_removes_call_without_return() {
        let history = vec![
            Message::user_request("go"),
            Message::response(vec![
                ResponsePart::text("Reading both."),
                ResponsePart::tool_call("c1", "read_file", json!({})),
                ResponsePart::tool_call("c2", "read_file", json!({})),
            ]),
            Message::tool_return("c1", "read_file", "ok"),
        ];

        let cleaned = DanglingCallSanitizer.sanitize(history);
        assert_eq!(cleaned.len(), 3);
        assert_eq!(cleaned[1].tool_call_ids(), vec!["c1"]);
    }

    #[test]
    fn test_drops_response_left_empty() {
        let history = vec![
            Message::user_request("go"),
            Message::response(vec![ResponsePart::tool_call("c1", "bash", json!({}))]),
        ];
        let cleaned = DanglingCallSanitizer.sanitize(history);
        assert_eq!(cleaned.len(), 1);
        assert!(cleaned[0].is_user_request());
    }

    #[test]
    fn test_drops_orphan_return() {
        let history = vec![
            Message::user_request("go"),
            Message::tool_return("gone", "grep", "stale"),
        ];
        let cleaned = DanglingCallSanitizer.sanitize(history);
        assert_eq!(cleaned.len(), 1);
    }

    #[test]
    fn test_complete_history_is_unchanged() {
        let history = vec![
            Message::user_request("go"),
            Message::response(vec![ResponsePart::tool_call("c1", "grep", json!({}))]),
            Message::tool_return("c1", "grep", "match"),
            Message::response(vec![ResponsePart::text("Done.")]),
        ];
        let ids: Vec<_> = history.iter().map(|m| m.id).collect();
        let cleaned = DanglingCallSanitizer.sanitize(history);
        assert_eq!(cleaned.iter().map(|m| m.id).collect::<Vec<_>>(), ids);
    }
}
