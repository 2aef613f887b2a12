// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Request orchestrator
//!
//! Owns one request end to end: pulls nodes from the model transport, hands
//! each to the [`NodeProcessor`], and decides after every turn whether to
//! continue, stop, or append corrective guidance. The whole loop runs under a
//! global timeout and a user abort token.

use futures::StreamExt;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::agent::cache::AgentProfile;
use crate::agent::events::{EventSink, OrchestratorEvent};
use crate::agent::guidance::{self, GuidanceKind, RECENT_TOOL_LIMIT};
use crate::agent::node::{NodeOutcome, NodeProcessor, TurnSignal};
use crate::agent::session::RequestSession;
use crate::config::settings::OrchestratorConfig;
use crate::context::{ContextHooks, DefaultContextHooks};
use crate::error::{FailurePhase, RequestFailure, TackError};
use crate::llm::message::Message;
use crate::llm::transport::{ModelTransport, NodeStream};
use crate::tools::authorization::AuthorizationGate;
use crate::tools::executor::ToolExecutor;
use crate::tools::ToolInvoker;

pub type RequestResult = std::result::Result<RequestOutcome, RequestFailure>;

/// How a request ended without failing
#[derive(Debug, Clone, PartialEq)]
pub enum RequestOutcome {
    /// The model finished, by marker or by ending its stream
    Completed {
        iterations: u32,
        /// Text of the last non-empty response
        final_text: Option<String>,
    },
    /// The iteration budget ran out twice; the user should steer
    AwaitingGuidance { iterations: u32 },
}

impl RequestOutcome {
    pub fn iterations(&self) -> u32 {
        match self {
            RequestOutcome::Completed { iterations, .. }
            | RequestOutcome::AwaitingGuidance { iterations } => *iterations,
        }
    }

    pub fn is_completed(&self) -> bool {
        matches!(self, RequestOutcome::Completed { .. })
    }
}

/// Turn counting and stall tracking for one request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IterationBudget {
    pub count: u32,
    pub max: u32,
    /// Consecutive turns without tool use
    pub unproductive_streak: u32,
    pub extensions_used: u32,
}

impl IterationBudget {
    pub fn new(max: u32) -> Self {
        Self {
            count: 0,
            max,
            unproductive_streak: 0,
            extensions_used: 0,
        }
    }

    pub fn is_exhausted(&self) -> bool {
        self.count >= self.max
    }

    /// Extend once by `amount`. Returns false if the extension was used.
    pub fn try_extend(&mut self, amount: u32) -> bool {
        if self.extensions_used > 0 {
            return false;
        }
        self.extensions_used += 1;
        self.max += amount;
        true
    }

    /// Update the streak for a finished turn.
    pub fn record_turn(&mut self, productive: bool) {
        if productive {
            self.unproductive_streak = 0;
        } else {
            self.unproductive_streak += 1;
        }
    }
}

/// Builder for [`RequestOrchestrator`]
pub struct OrchestratorBuilder {
    transport: Arc<dyn ModelTransport>,
    invoker: Arc<dyn ToolInvoker>,
    profile: Arc<AgentProfile>,
    gate: Option<Arc<dyn AuthorizationGate>>,
    hooks: Option<Arc<dyn ContextHooks>>,
    events: EventSink,
}

impl OrchestratorBuilder {
    /// Gate consulted before every call. Defaults to approving everything.
    pub fn gate(mut self, gate: Arc<dyn AuthorizationGate>) -> Self {
        self.gate = Some(gate);
        self
    }

    /// Compaction hooks. Defaults to [`DefaultContextHooks`].
    pub fn hooks(mut self, hooks: Arc<dyn ContextHooks>) -> Self {
        self.hooks = Some(hooks);
        self
    }

    pub fn events(mut self, events: EventSink) -> Self {
        self.events = events;
        self
    }

    pub fn build(self) -> RequestOrchestrator {
        let profile = self.profile;
        let mut executor = ToolExecutor::from_config(self.invoker, &profile.tools)
            .with_policy(profile.policy.clone())
            .with_events(self.events.clone());
        if let Some(gate) = self.gate {
            executor = executor.with_gate(gate);
        }

        let hooks = self
            .hooks
            .unwrap_or_else(|| Arc::new(DefaultContextHooks::new(&profile.compaction)));

        RequestOrchestrator {
            transport: self.transport,
            processor: NodeProcessor::new(profile.catalog.clone(), executor, self.events.clone()),
            hooks,
            limits: profile.limits.clone(),
            events: self.events,
            profile,
        }
    }
}

/// Drives requests against one transport and tool set
pub struct RequestOrchestrator {
    transport: Arc<dyn ModelTransport>,
    processor: NodeProcessor,
    hooks: Arc<dyn ContextHooks>,
    limits: OrchestratorConfig,
    events: EventSink,
    profile: Arc<AgentProfile>,
}

/// What the loop does after a turn
enum Step {
    Finish(RequestOutcome),
    Next { history_changed: bool },
}

/// Mutable loop state that outlives a timed-out loop future
struct LoopState {
    budget: IterationBudget,
    empty_attempts: u32,
    last_text: Option<String>,
    phase: FailurePhase,
}

impl RequestOrchestrator {
    pub fn builder(
        transport: Arc<dyn ModelTransport>,
        invoker: Arc<dyn ToolInvoker>,
        profile: Arc<AgentProfile>,
    ) -> OrchestratorBuilder {
        OrchestratorBuilder {
            transport,
            invoker,
            profile,
            gate: None,
            hooks: None,
            events: EventSink::disabled(),
        }
    }

    pub fn profile(&self) -> &AgentProfile {
        &self.profile
    }

    /// Start a session for this orchestrator's model.
    pub fn new_session(&self) -> RequestSession {
        RequestSession::new(self.profile.model.clone(), self.profile.pricing)
    }

    /// Run one request to completion, guidance pause or failure.
    ///
    /// `abort` is the user's abort signal. Cancelling it stops in-flight tool
    /// calls and returns a [`TackError::UserAbort`] failure without any
    /// guidance being injected.
    pub async fn run(
        &self,
        session: &mut RequestSession,
        instruction: &str,
        abort: &CancellationToken,
    ) -> RequestResult {
        self.prepare_history(session, instruction);

        let work = abort.child_token();
        let mut state = LoopState {
            budget: IterationBudget::new(self.limits.max_iterations),
            empty_attempts: 0,
            last_text: None,
            phase: FailurePhase::Orchestration,
        };

        tracing::info!(
            target: "tack.orchestrator",
            session = %session.id,
            transport = self.transport.name(),
            max_iterations = state.budget.max,
            "Request start"
        );

        let result = match self.limits.request_timeout() {
            Some(limit) => {
                let run = self.run_loop(session, &mut state, &work, abort);
                let timed = tokio::time::timeout(limit, run).await;
                match timed {
                    Ok(result) => result,
                    Err(_) => {
                        work.cancel();
                        tracing::warn!(
                            target: "tack.orchestrator",
                            iteration = state.budget.count,
                            timeout_secs = limit.as_secs_f64(),
                            "Request exceeded global timeout"
                        );
                        Err((
                            FailurePhase::Orchestration,
                            TackError::GlobalRequestTimeout {
                                secs: limit.as_secs(),
                            },
                        ))
                    }
                }
            }
            None => self.run_loop(session, &mut state, &work, abort).await,
        };

        match result {
            Ok(outcome) => {
                tracing::info!(
                    target: "tack.orchestrator",
                    iterations = outcome.iterations(),
                    completed = outcome.is_completed(),
                    tokens = session.usage().total_tokens(),
                    "Request finished"
                );
                Ok(outcome)
            }
            Err((phase, error)) => {
                let cancelled = session.registry_mut().cancel_pending();
                let failure = RequestFailure::new(phase, state.budget.count, error)
                    .with_recent_turns(session.recent_turns(self.limits.recent_turns_in_errors));
                if failure.is_user_abort() {
                    tracing::info!(
                        target: "tack.orchestrator",
                        iteration = failure.iteration,
                        cancelled_calls = cancelled,
                        "Request aborted by user"
                    );
                } else {
                    tracing::warn!(
                        target: "tack.orchestrator",
                        phase = %failure.phase,
                        iteration = failure.iteration,
                        error = %failure.error,
                        "Request failed"
                    );
                }
                Err(failure)
            }
        }
    }

    /// Sanitize a resumed history, append the instruction, prune old output.
    fn prepare_history(&self, session: &mut RequestSession, instruction: &str) {
        if session.take_resumed() {
            let hooks = Arc::clone(&self.hooks);
            session.replace_history(|history| hooks.remove_dangling_tool_calls(history));
        }
        session.begin_request(instruction);

        let reclaimed = self.hooks.prune_old_outputs(session.history_mut());
        if reclaimed > 0 {
            tracing::info!(
                target: "tack.orchestrator",
                reclaimed,
                context_tokens = session.estimated_context_tokens(),
                "Pruned old tool output"
            );
        }
    }

    async fn run_loop(
        &self,
        session: &mut RequestSession,
        state: &mut LoopState,
        work: &CancellationToken,
        abort: &CancellationToken,
    ) -> std::result::Result<RequestOutcome, (FailurePhase, TackError)> {
        let mut stream: Option<NodeStream> = None;

        loop {
            if abort.is_cancelled() {
                return Err((state.phase, TackError::UserAbort));
            }

            if state.budget.is_exhausted() {
                if state.budget.try_extend(self.limits.iteration_extension) {
                    tracing::info!(
                        target: "tack.orchestrator",
                        new_max = state.budget.max,
                        "Iteration limit reached, extending"
                    );
                    self.events.emit(OrchestratorEvent::IterationExtended {
                        new_max: state.budget.max,
                    });
                } else {
                    tracing::info!(
                        target: "tack.orchestrator",
                        iterations = state.budget.count,
                        "Iteration limit reached again, awaiting user guidance"
                    );
                    return Ok(RequestOutcome::AwaitingGuidance {
                        iterations: state.budget.count,
                    });
                }
            }

            state.phase = FailurePhase::ModelCall;
            let mut nodes = match stream.take() {
                Some(nodes) => nodes,
                None => self
                    .transport
                    .stream_nodes(session.history())
                    .await
                    .map_err(|error| (FailurePhase::ModelCall, error))?,
            };

            let next = tokio::select! {
                biased;
                _ = abort.cancelled() => return Err((FailurePhase::ModelCall, TackError::UserAbort)),
                next = nodes.next() => next,
            };

            let node = match next {
                None => {
                    tracing::debug!(
                        target: "tack.orchestrator",
                        iterations = state.budget.count,
                        "Model stream ended"
                    );
                    return Ok(RequestOutcome::Completed {
                        iterations: state.budget.count,
                        final_text: state.last_text.take(),
                    });
                }
                Some(Err(error)) => return Err((FailurePhase::ModelCall, error)),
                Some(Ok(node)) => node,
            };

            state.budget.count += 1;
            let iteration = state.budget.count;
            state.phase = FailurePhase::ToolExecution;

            let outcome = match self.processor.process(node, session, iteration, work).await {
                Ok(outcome) => outcome,
                Err(error) => {
                    let error = match error {
                        TackError::Cancelled if abort.is_cancelled() => TackError::UserAbort,
                        other => other,
                    };
                    return Err((phase_for(&error), error));
                }
            };

            if !outcome.text.is_empty() {
                state.last_text = Some(outcome.text.clone());
            }
            state.phase = FailurePhase::Orchestration;

            match self.handle_signal(&outcome, session, state, iteration)? {
                Step::Finish(done) => return Ok(done),
                // Tool returns or guidance the model has not seen: reopen
                Step::Next { history_changed } => {
                    if !history_changed && !outcome.was_productive() {
                        stream = Some(nodes);
                    }
                }
            }
        }
    }

    /// Apply the turn signal. Returns an outcome when the request is done.
    fn handle_signal(
        &self,
        outcome: &NodeOutcome,
        session: &mut RequestSession,
        state: &mut LoopState,
        iteration: u32,
    ) -> std::result::Result<Step, (FailurePhase, TackError)> {
        match outcome.signal {
            TurnSignal::Done => {
                state.budget.record_turn(outcome.was_productive());
                tracing::info!(
                    target: "tack.orchestrator",
                    iteration,
                    "Completion marker accepted"
                );
                Ok(Step::Finish(RequestOutcome::Completed {
                    iterations: state.budget.count,
                    final_text: state.last_text.take(),
                }))
            }
            TurnSignal::Continue => {
                state.empty_attempts = 0;
                state.budget.record_turn(outcome.was_productive());
                if state.budget.unproductive_streak < self.limits.unproductive_limit {
                    return Ok(Step::Next {
                        history_changed: false,
                    });
                }
                let text = guidance::force_action(
                    state.budget.unproductive_streak,
                    iteration,
                    session.registry().recent_calls(RECENT_TOOL_LIMIT),
                );
                self.inject(session, GuidanceKind::ForceAction, text, iteration);
                state.budget.unproductive_streak = 0;
                Ok(Step::Next {
                    history_changed: true,
                })
            }
            TurnSignal::Empty | TurnSignal::IntentionWithoutAction => {
                state.empty_attempts += 1;
                if state.empty_attempts > self.limits.max_empty_retries {
                    return Err((
                        FailurePhase::Orchestration,
                        TackError::EmptyResponse {
                            attempts: state.empty_attempts,
                        },
                    ));
                }
                let kind = if outcome.signal == TurnSignal::Empty {
                    GuidanceKind::EmptyResponse
                } else {
                    GuidanceKind::IntentionWithoutAction
                };
                let text = guidance::empty_response(
                    session.current_task(),
                    kind,
                    session.registry().recent_calls(RECENT_TOOL_LIMIT),
                    state.empty_attempts,
                );
                self.inject(session, kind, text, iteration);
                Ok(Step::Next {
                    history_changed: true,
                })
            }
            TurnSignal::Truncated => {
                self.inject(session, GuidanceKind::Truncated, guidance::truncated(), iteration);
                Ok(Step::Next {
                    history_changed: true,
                })
            }
        }
    }

    fn inject(&self, session: &mut RequestSession, kind: GuidanceKind, text: String, iteration: u32) {
        tracing::info!(
            target: "tack.orchestrator",
            %kind,
            iteration,
            "Injecting guidance"
        );
        session.push(Message::user_request(text));
        self.events
            .emit(OrchestratorEvent::GuidanceInjected { kind, iteration });
    }
}

/// Phase reported for an error raised while processing a node.
fn phase_for(error: &TackError) -> FailurePhase {
    match error {
        TackError::Authorization(_) => FailurePhase::Authorization,
        TackError::InvalidStateTransition(_) => FailurePhase::Orchestration,
        _ => FailurePhase::ToolExecution,
    }
}
