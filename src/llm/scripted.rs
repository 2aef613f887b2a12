// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Scripted model transport
//!
//! Replays a fixed sequence of nodes. Used by `tack replay` to re-run
//! recorded model misbehaviour and by tests that need a deterministic model.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use crate::error::{Result, TackError};
use crate::llm::message::Message;
use crate::llm::transport::{ModelTransport, Node, NodeStream};

/// One step of a model script
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "step", rename_all = "snake_case")]
pub enum ScriptStep {
    /// Yield a node
    Node(Node),

    /// Yield a node after a delay
    Delayed { delay_ms: u64, node: Node },

    /// Fail the stream with a model error
    Error { message: String },

    /// Never yield anything again
    Stall,
}

/// Transport that pops nodes from a shared script
#[derive(Clone, Default)]
pub struct ScriptedTransport {
    steps: Arc<Mutex<VecDeque<ScriptStep>>>,
    /// History length seen by each `stream_nodes` call
    opened_with: Arc<Mutex<Vec<usize>>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => {
            tracing::warn!("Scripted transport lock was poisoned, recovering");
            poisoned.into_inner()
        }
    }
}

fn pop_step(steps: &Mutex<VecDeque<ScriptStep>>) -> Option<ScriptStep> {
    lock(steps).pop_front()
}

impl ScriptedTransport {
    pub fn new(steps: Vec<ScriptStep>) -> Self {
        Self {
            steps: Arc::new(Mutex::new(steps.into())),
            opened_with: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Script made only of nodes
    pub fn from_nodes(nodes: Vec<Node>) -> Self {
        Self::new(nodes.into_iter().map(ScriptStep::Node).collect())
    }

    /// Load a JSON array of steps.
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let steps: Vec<ScriptStep> = serde_json::from_str(&content)?;
        if steps.is_empty() {
            return Err(TackError::Validation(format!(
                "Script {} contains no steps",
                path.display()
            )));
        }
        Ok(Self::new(steps))
    }

    /// Steps not consumed yet
    pub fn remaining(&self) -> usize {
        lock(&self.steps).len()
    }

    /// Number of times a stream was opened
    pub fn open_count(&self) -> usize {
        lock(&self.opened_with).len()
    }

    /// History length passed to each open, in order
    pub fn history_lengths(&self) -> Vec<usize> {
        lock(&self.opened_with).clone()
    }
}

#[async_trait]
impl ModelTransport for ScriptedTransport {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn stream_nodes(&self, history: &[Message]) -> Result<NodeStream> {
        lock(&self.opened_with).push(history.len());
        let steps = Arc::clone(&self.steps);

        let stream = async_stream::stream! {
            while let Some(step) = pop_step(&steps) {
                match step {
                    ScriptStep::Node(node) => yield Ok(node),
                    ScriptStep::Delayed { delay_ms, node } => {
                        tokio::time::sleep(Duration::from_millis(delay_ms)).await;
                        yield Ok(node);
                    }
                    ScriptStep::Error { message } => {
                        yield Err(TackError::Model(message));
                    }
                    ScriptStep::Stall => {
                        futures::future::pending::<()>().await;
                    }
                }
            }
        };

        Ok(Box::pin(stream))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;

    #[tokio::test]
    async fn test_stream_pops_in_order() {
        let transport =
            ScriptedTransport::from_nodes(vec![Node::text("one"), Node::text("two")]);
        let mut stream = transport.stream_nodes(&[]).await.unwrap();

        let first = stream.next().await.unwrap().unwrap();
        assert_eq!(first.response.unwrap().combined_text(), "one");
        assert_eq!(transport.remaining(), 1);

        let second = stream.next().await.unwrap().unwrap();
        assert_eq!(second.response.unwrap().combined_text(), "two");
        assert!(stream.next().await.is_none());
    }

    #[tokio::test]
    async fn test_reopen_continues_where_previous_stream_stopped() {
        let transport =
            ScriptedTransport::from_nodes(vec![Node::text("one"), Node::text("two")]);
        {
            let mut stream = transport.stream_nodes(&[]).await.unwrap();
            stream.next().await.unwrap().unwrap();
        }
        let history = vec![Message::user_request("hi")];
        let mut stream = transport.stream_nodes(&history).await.unwrap();
        let node = stream.next().await.unwrap().unwrap();
        assert_eq!(node.response.unwrap().combined_text(), "two");
        assert_eq!(transport.history_lengths(), vec![0, 1]);
    }

    #[tokio::test]
    async fn test_error_step() {
        let transport = ScriptedTransport::new(vec![ScriptStep::Error {
            message: "overloaded".to_string(),
        }]);
        let mut stream = transport.stream_nodes(&[]).await.unwrap();
        let err = stream.next().await.unwrap().unwrap_err();
        assert!(err.to_string().contains("overloaded"));
    }

    #[test]
    fn test_from_json_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("script.json");
        std::fs::write(
            &path,
            r#"[
                {"step": "node", "response": {"parts": [{"type": "text", "text": "hi"}]}},
                {"step": "stall"}
            ]"#,
        )
        .unwrap();
        let transport = ScriptedTransport::from_json_file(&path).unwrap();
        assert_eq!(transport.remaining(), 2);
    }

    #[test]
    fn test_from_json_file_rejects_empty_script() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("empty.json");
        std::fs::write(&path, "[]").unwrap();
        assert!(matches!(
            ScriptedTransport::from_json_file(&path),
            Err(TackError::Validation(_))
        ));
    }
}
