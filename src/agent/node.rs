// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Per-turn node processing
//!
//! Turns one model node into history entries and dispatched tool calls, then
//! reports a [`TurnSignal`] to the orchestrator. Tool dispatch runs in three
//! phases that never overlap: delegated calls, the read-only batch, then
//! write/execute calls in the order the model emitted them.

use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::agent::events::{EventSink, OrchestratorEvent};
use crate::agent::patterns::{
    appears_truncated, declares_intention, find_intention_phrases, strip_completion_marker,
};
use crate::agent::session::RequestSession;
use crate::agent::state::AgentState;
use crate::error::Result;
use crate::llm::message::{Message, ResponsePart};
use crate::llm::transport::{ModelResponse, Node};
use crate::tools::catalog::{is_suspicious_tool_name, normalize_tool_name, ToolCatalog};
use crate::tools::executor::{BatchError, BatchResult, ToolExecutor};
use crate::tools::parsing::{has_potential_tool_call, parse_tool_calls};
use crate::tools::{CallResult, ToolCall, ToolCategory, ToolOutcome};

/// What a turn means for the request loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnSignal {
    /// Keep going
    Continue,
    /// No text and no tool calls
    Empty,
    /// Text looks cut off
    Truncated,
    /// Completion marker accepted
    Done,
    /// Announced an action without calling a tool
    IntentionWithoutAction,
}

/// Result of processing one node
#[derive(Debug, Clone)]
pub struct NodeOutcome {
    pub signal: TurnSignal,
    /// Tool calls dispatched this turn
    pub tools_used: usize,
    /// Response text with any completion marker removed
    pub text: String,
    /// A completion marker was ignored because tools were pending
    pub completion_rejected: bool,
}

impl NodeOutcome {
    pub fn was_productive(&self) -> bool {
        self.tools_used > 0
    }
}

#[derive(Debug, Clone, Copy)]
enum DispatchMode {
    Parallel,
    Sequential,
}

/// Processes model nodes for one orchestrator
pub struct NodeProcessor {
    catalog: ToolCatalog,
    executor: ToolExecutor,
    events: EventSink,
}

impl NodeProcessor {
    pub fn new(catalog: ToolCatalog, executor: ToolExecutor, events: EventSink) -> Self {
        Self {
            catalog,
            executor,
            events,
        }
    }

    pub fn catalog(&self) -> &ToolCatalog {
        &self.catalog
    }

    pub fn executor(&self) -> &ToolExecutor {
        &self.executor
    }

    /// Process one node.
    ///
    /// Errors are fatal for the request: tool failures that survived retry,
    /// authorization errors, cancellation and invalid state transitions.
    pub async fn process(
        &self,
        node: Node,
        session: &mut RequestSession,
        iteration: u32,
        cancel: &CancellationToken,
    ) -> Result<NodeOutcome> {
        self.transition(session, AgentState::Assistant)?;

        if let Some(request) = node.request.filter(|text| !text.trim().is_empty()) {
            session.push(Message::user_request(request));
        }
        if let Some(thought) = node.thought.filter(|text| !text.trim().is_empty()) {
            session.push(Message::thought(thought));
        }

        let mut response = node.response.unwrap_or_default();
        if let Some(usage) = response.usage {
            session.record_usage(usage);
        }

        let text = response.combined_text();
        self.emit_text(&response);
        let (marker_found, cleaned) = strip_completion_marker(&text);

        let mut calls = self.extract_structured(&mut response);
        if calls.is_empty() && has_potential_tool_call(&text) {
            calls = self.extract_fallback(&text, &mut response);
        }

        let completion_rejected = marker_found && !calls.is_empty();
        if completion_rejected {
            tracing::warn!(
                target: "tack.node",
                iteration,
                pending_tools = calls.len(),
                "Completion marker ignored, tool calls are pending"
            );
            self.events.emit(OrchestratorEvent::CompletionRejected {
                pending_tools: calls.len(),
            });
            strip_marker_from_parts(&mut response.parts);
        }

        if !response.parts.is_empty() {
            session.push(Message::response(response.parts));
        }

        let tool_names: Vec<String> = calls.iter().map(|call| call.name.clone()).collect();
        session.record_turn(iteration, &tool_names, &cleaned);

        if calls.is_empty() {
            let signal = classify_text_turn(&cleaned, marker_found);
            if signal == TurnSignal::Done {
                let phrases = find_intention_phrases(&cleaned);
                if !phrases.is_empty() {
                    tracing::warn!(
                        target: "tack.node",
                        iteration,
                        ?phrases,
                        "Completion accepted with pending intentions"
                    );
                }
                session.state_mut().set_completion_detected();
            }
            self.transition(session, AgentState::Response)?;

            tracing::debug!(target: "tack.node", iteration, ?signal, "Turn without tool calls");
            return Ok(NodeOutcome {
                signal,
                tools_used: 0,
                text: cleaned,
                completion_rejected,
            });
        }

        for call in &calls {
            session.registry_mut().register(call);
        }

        let dispatched = calls.len();
        self.transition(session, AgentState::ToolExecution)?;
        self.dispatch(calls, session, iteration, cancel).await?;
        self.transition(session, AgentState::Response)?;

        Ok(NodeOutcome {
            signal: TurnSignal::Continue,
            tools_used: dispatched,
            text: cleaned,
            completion_rejected,
        })
    }

    /// Run the three dispatch phases in order.
    async fn dispatch(
        &self,
        calls: Vec<ToolCall>,
        session: &mut RequestSession,
        iteration: u32,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let mut delegated = Vec::new();
        let mut read_only = Vec::new();
        let mut mutating = Vec::new();
        for call in calls {
            match call.category {
                ToolCategory::Delegated => delegated.push(call),
                ToolCategory::ReadOnly => read_only.push(call),
                ToolCategory::Write | ToolCategory::Execute => mutating.push(call),
            }
        }

        tracing::info!(
            target: "tack.node",
            iteration,
            delegated = delegated.len(),
            read_only = read_only.len(),
            mutating = mutating.len(),
            "Dispatching tool calls"
        );

        self.run_phase(DispatchMode::Sequential, delegated, session, cancel)
            .await?;
        self.run_phase(DispatchMode::Parallel, read_only, session, cancel)
            .await?;
        self.run_phase(DispatchMode::Sequential, mutating, session, cancel)
            .await
    }

    async fn run_phase(
        &self,
        mode: DispatchMode,
        calls: Vec<ToolCall>,
        session: &mut RequestSession,
        cancel: &CancellationToken,
    ) -> Result<()> {
        if calls.is_empty() {
            return Ok(());
        }

        let ids: Vec<String> = calls.iter().map(|call| call.id.clone()).collect();
        for id in &ids {
            session.registry_mut().start(id);
        }

        let batch: BatchResult = match mode {
            DispatchMode::Parallel => self.executor.run_parallel(calls, cancel).await,
            DispatchMode::Sequential => self.executor.run_sequential(calls, cancel).await,
        };

        match batch {
            Ok(results) => {
                fold_results(session, results);
                Ok(())
            }
            Err(BatchError { completed, error }) => {
                fold_results(session, completed);
                let message = error.to_string();
                let registry = session.registry_mut();
                for id in &ids {
                    if registry.args(id).is_some() {
                        registry.fail(id, message.as_str());
                    }
                }
                tracing::warn!(
                    target: "tack.node",
                    ?mode,
                    error = %error,
                    "Tool phase failed"
                );
                Err(error)
            }
        }
    }

    /// Structured tool-call parts, with names normalized in place.
    fn extract_structured(&self, response: &mut ModelResponse) -> Vec<ToolCall> {
        let mut calls = Vec::new();
        for part in response.parts.iter_mut() {
            if let ResponsePart::ToolCall { id, name, args } = part {
                let normalized = self.normalize_name(name);
                *name = normalized;
                if id.trim().is_empty() {
                    *id = Uuid::new_v4().to_string();
                }
                calls.push(ToolCall::new(
                    id.clone(),
                    name.clone(),
                    args.clone(),
                    self.catalog.classify(name),
                ));
            }
        }
        calls
    }

    /// Tool calls recovered from text. Recovered calls are appended to the
    /// response so their returns have a matching call in history.
    fn extract_fallback(&self, text: &str, response: &mut ModelResponse) -> Vec<ToolCall> {
        let (parsed, diagnostics) = parse_tool_calls(text);
        let Some(parsed) = parsed else {
            tracing::debug!(
                target: "tack.tools.parsing",
                ?diagnostics,
                "Text looked like a tool call but no strategy matched"
            );
            return Vec::new();
        };

        tracing::info!(
            target: "tack.tools.parsing",
            strategy = parsed.strategy,
            calls = parsed.calls.len(),
            "Recovered tool calls from text"
        );
        self.events.emit(OrchestratorEvent::FallbackParsed {
            strategy: parsed.strategy.to_string(),
            calls: parsed.calls.len(),
        });

        parsed
            .calls
            .into_iter()
            .map(|call| {
                let name = self.normalize_name(&call.name);
                response
                    .parts
                    .push(ResponsePart::tool_call(call.id.clone(), name.clone(), call.args.clone()));
                let category = self.catalog.classify(&name);
                ToolCall::new(call.id, name, call.args, category)
            })
            .collect()
    }

    fn normalize_name(&self, raw: &str) -> String {
        let name = normalize_tool_name(Some(raw));
        if is_suspicious_tool_name(&name) {
            tracing::warn!(
                target: "tack.node",
                tool = %name,
                "Suspicious tool name"
            );
        }
        name
    }

    fn emit_text(&self, response: &ModelResponse) {
        for part in &response.parts {
            if let ResponsePart::Text { text } = part {
                if !text.is_empty() {
                    self.events.emit(OrchestratorEvent::StreamToken {
                        token: text.clone(),
                    });
                }
            }
        }
    }

    fn transition(&self, session: &mut RequestSession, target: AgentState) -> Result<()> {
        let from = session.state().current();
        session.state_mut().transition_to(target)?;
        self.events
            .emit(OrchestratorEvent::StateChanged { from, to: target });
        Ok(())
    }
}

/// Signal for a turn that carried no tool calls.
///
/// An accepted completion marker wins; pending intentions alongside it are
/// only logged. Otherwise: empty, truncated, intention, continue.
fn classify_text_turn(text: &str, marker_found: bool) -> TurnSignal {
    if marker_found {
        return TurnSignal::Done;
    }
    if text.trim().is_empty() {
        TurnSignal::Empty
    } else if appears_truncated(text) {
        TurnSignal::Truncated
    } else if declares_intention(text) {
        TurnSignal::IntentionWithoutAction
    } else {
        TurnSignal::Continue
    }
}

fn strip_marker_from_parts(parts: &mut Vec<ResponsePart>) {
    parts.retain_mut(|part| match part {
        ResponsePart::Text { text } => {
            let (found, cleaned) = strip_completion_marker(text);
            if found {
                *text = cleaned;
            }
            !text.is_empty()
        }
        ResponsePart::ToolCall { .. } => true,
    });
}

/// Append tool returns in result order and settle the registry.
fn fold_results(session: &mut RequestSession, results: Vec<CallResult>) {
    for result in results {
        let CallResult { call, outcome, .. } = result;
        let registry = session.registry_mut();
        match &outcome {
            ToolOutcome::Success(output) => registry.complete(&call.id, output.as_str()),
            ToolOutcome::SelfCorrect(error) => registry.fail(&call.id, error.as_str()),
            ToolOutcome::Rejected(_) => registry.cancel(&call.id),
        };

        let message = if outcome.is_error() {
            Message::tool_error(call.id, call.name, outcome.text())
        } else {
            Message::tool_return(call.id, call.name, outcome.text())
        };
        session.push(message);
    }
}
