// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Orchestrator events
//!
//! Everything the outside world may want to observe about a request goes
//! through one typed channel. Consumers that do not care pass
//! [`EventSink::disabled`].

use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};

use crate::agent::guidance::GuidanceKind;
use crate::agent::state::AgentState;

/// Event emitted while a request is processed
#[derive(Debug, Clone, PartialEq)]
pub enum OrchestratorEvent {
    /// A tool call is about to be invoked
    ToolStart {
        call_id: String,
        tool_name: String,
        description: String,
    },
    /// A tool call finished (successfully or not)
    ToolResult {
        call_id: String,
        tool_name: String,
        output: String,
        is_error: bool,
        duration_ms: u64,
    },
    /// A failed invocation is about to be retried after `delay_ms`
    ToolRetry {
        call_id: String,
        tool_name: String,
        attempt: u32,
        delay_ms: u64,
        error: String,
    },
    /// Text streamed from the model
    StreamToken { token: String },
    /// Timing for a read-only batch of more than one call
    ParallelBatch {
        size: usize,
        wall_ms: u64,
        summed_ms: u64,
        speedup: f64,
    },
    /// The state machine moved
    StateChanged { from: AgentState, to: AgentState },
    /// Corrective guidance was appended to history
    GuidanceInjected { kind: GuidanceKind, iteration: u32 },
    /// Tool calls were recovered from plain text
    FallbackParsed { strategy: String, calls: usize },
    /// A completion marker was ignored because tools were pending
    CompletionRejected { pending_tools: usize },
    /// The iteration budget was extended
    IterationExtended { new_max: u32 },
}

impl OrchestratorEvent {
    /// Get a short status string for display
    pub fn status_text(&self) -> String {
        match self {
            OrchestratorEvent::ToolStart { description, .. } => format!("→ {}", description),
            OrchestratorEvent::ToolResult {
                tool_name,
                is_error,
                duration_ms,
                ..
            } => {
                let status = if *is_error { "✗" } else { "✓" };
                format!("{} {} ({}ms)", status, tool_name, duration_ms)
            }
            OrchestratorEvent::ToolRetry {
                tool_name,
                attempt,
                delay_ms,
                ..
            } => format!(
                "↻ {} failed (attempt {}), retrying in {:.1}s",
                tool_name,
                attempt,
                *delay_ms as f64 / 1000.0
            ),
            OrchestratorEvent::StreamToken { token } => token.clone(),
            OrchestratorEvent::ParallelBatch {
                size,
                wall_ms,
                speedup,
                ..
            } => format!(
                "{} read-only tools in {}ms ({:.1}x faster than sequential)",
                size, wall_ms, speedup
            ),
            OrchestratorEvent::StateChanged { from, to } => format!("{} -> {}", from, to),
            OrchestratorEvent::GuidanceInjected { kind, iteration } => {
                format!("Guidance ({}) at iteration {}", kind, iteration)
            }
            OrchestratorEvent::FallbackParsed { strategy, calls } => {
                format!("Recovered {} tool call(s) from text via {}", calls, strategy)
            }
            OrchestratorEvent::CompletionRejected { pending_tools } => format!(
                "Completion ignored: {} tool call(s) still pending",
                pending_tools
            ),
            OrchestratorEvent::IterationExtended { new_max } => {
                format!("Iteration limit extended to {}", new_max)
            }
        }
    }
}

/// Sender half of the event channel
///
/// Cloned into every layer that reports progress. A closed or absent
/// receiver is ignored.
#[derive(Debug, Clone, Default)]
pub struct EventSink {
    sender: Option<UnboundedSender<OrchestratorEvent>>,
}

impl EventSink {
    /// Create a sink and the receiver that observes it.
    pub fn channel() -> (Self, UnboundedReceiver<OrchestratorEvent>) {
        let (tx, rx) = unbounded_channel();
        (Self { sender: Some(tx) }, rx)
    }

    pub fn new(sender: UnboundedSender<OrchestratorEvent>) -> Self {
        Self {
            sender: Some(sender),
        }
    }

    /// Sink that drops every event
    pub fn disabled() -> Self {
        Self { sender: None }
    }

    pub fn is_enabled(&self) -> bool {
        self.sender.as_ref().is_some_and(|tx| !tx.is_closed())
    }

    pub fn emit(&self, event: OrchestratorEvent) {
        if let Some(tx) = &self.sender {
            // Receiver gone: nobody is listening, which is fine
            let _ = tx.send(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_channel_delivers_events() {
        let (sink, mut rx) = EventSink::channel();
        sink.emit(OrchestratorEvent::StreamToken {
            token: "hi".to_string(),
        });
        let event = rx.recv().await.unwrap();
        assert_eq!(event.status_text(), "hi");
    }

    #[test]
    fn test_disabled_sink_is_silent() {
        let sink = EventSink::disabled();
        assert!(!sink.is_enabled());
        sink.emit(OrchestratorEvent::IterationExtended { new_max: 20 });
    }

    #[test]
    fn test_closed_receiver_is_ignored() {
        let (sink, rx) = EventSink::channel();
        drop(rx);
        assert!(!sink.is_enabled());
        sink.emit(OrchestratorEvent::IterationExtended { new_max: 20 });
    }

    #[test]
    fn test_status_text() {
        let event = OrchestratorEvent::ToolResult {
            call_id: "c1".into(),
            tool_name: "grep".into(),
            output: "3 matches".into(),
            is_error: false,
            duration_ms: 12,
        };
        assert_eq!(event.status_text(), "✓ grep (12ms)");

        let event = OrchestratorEvent::ParallelBatch {
            size: 3,
            wall_ms: 100,
            summed_ms: 300,
            speedup: 3.0,
        };
        assert!(event.status_text().contains("3.0x"));
    }
}
