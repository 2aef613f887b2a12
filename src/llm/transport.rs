// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Model transport contract
//!
//! The transport turns the current history into a stream of model-generated
//! nodes. Provider clients live outside this crate; the orchestrator only
//! depends on [`ModelTransport`].

use async_trait::async_trait;
use futures::Stream;
use serde::{Deserialize, Serialize};
use std::pin::Pin;

use crate::error::Result;
use crate::llm::message::{Message, ResponsePart};

/// Stream of nodes produced by one model run
pub type NodeStream = Pin<Box<dyn Stream<Item = Result<Node>> + Send>>;

/// Source of model-generated turns
#[async_trait]
pub trait ModelTransport: Send + Sync {
    /// Transport name, for logs
    fn name(&self) -> &str;

    /// Open a node stream continuing from `history`.
    ///
    /// The orchestrator reopens the stream whenever it appends something the
    /// model has not seen yet (tool returns, guidance), so a stream only has
    /// to be valid for the history it was opened with.
    async fn stream_nodes(&self, history: &[Message]) -> Result<NodeStream>;
}

/// One model-generated turn
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Node {
    /// Request text the transport sent on this turn, if it reports it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request: Option<String>,

    /// Reasoning emitted before the response
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thought: Option<String>,

    /// The model response
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response: Option<ModelResponse>,
}

impl Node {
    /// Node carrying a plain text response
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            response: Some(ModelResponse::new(vec![ResponsePart::text(text)])),
            ..Default::default()
        }
    }

    /// Node carrying response parts
    pub fn parts(parts: Vec<ResponsePart>) -> Self {
        Self {
            response: Some(ModelResponse::new(parts)),
            ..Default::default()
        }
    }

    pub fn with_thought(mut self, thought: impl Into<String>) -> Self {
        self.thought = Some(thought.into());
        self
    }

    pub fn with_usage(mut self, usage: Usage) -> Self {
        if let Some(response) = self.response.as_mut() {
            response.usage = Some(usage);
        }
        self
    }
}

/// Response half of a node
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ModelResponse {
    /// Text and tool-call parts, in emitted order
    #[serde(default)]
    pub parts: Vec<ResponsePart>,

    /// Token usage reported for this call
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,
}

impl ModelResponse {
    pub fn new(parts: Vec<ResponsePart>) -> Self {
        Self { parts, usage: None }
    }

    pub fn has_tool_calls(&self) -> bool {
        self.parts.iter().any(ResponsePart::is_tool_call)
    }

    /// Non-blank text parts joined with a space and trimmed.
    pub fn combined_text(&self) -> String {
        self.parts
            .iter()
            .filter_map(|part| match part {
                ResponsePart::Text { text } if !text.trim().is_empty() => Some(text.as_str()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join(" ")
            .trim()
            .to_string()
    }
}

/// Token usage statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    /// Prompt tokens
    #[serde(default)]
    pub prompt_tokens: u32,
    /// Completion tokens
    #[serde(default)]
    pub completion_tokens: u32,
}
