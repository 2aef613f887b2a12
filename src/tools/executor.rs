// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Tool execution engine
//!
//! Runs a batch of calls either bounded-parallel (read-only batches) or
//! strictly one at a time (everything that mutates). Every invocation is
//! retried per [`RetryPolicy`], checked against the authorization gate first,
//! and raced against the request's cancellation token.
//!
//! A failed parallel batch stops calls that have not started yet, awaits the
//! ones already in flight and then discards every result.

use futures::stream::{FuturesUnordered, StreamExt};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;

use crate::agent::events::{EventSink, OrchestratorEvent};
use crate::config::settings::ToolsConfig;
use crate::error::{Result, TackError};

use super::authorization::{authorize, AllowAllGate, AuthDecision, AuthorizationGate};
use super::catalog::readable_description;
use super::retry::RetryPolicy;
use super::{CallResult, ToolCall, ToolInvoker, ToolOutcome};

/// A batch that stopped on an error
#[derive(Debug, Error)]
#[error("{error}")]
pub struct BatchError {
    /// Results produced before the failure. Always empty for parallel batches.
    pub completed: Vec<CallResult>,
    #[source]
    pub error: TackError,
}

impl BatchError {
    fn new(completed: Vec<CallResult>, error: TackError) -> Self {
        Self { completed, error }
    }
}

pub type BatchResult = std::result::Result<Vec<CallResult>, BatchError>;

/// Executes tool calls with retry, authorization and cancellation
pub struct ToolExecutor {
    invoker: Arc<dyn ToolInvoker>,
    gate: Arc<dyn AuthorizationGate>,
    policy: RetryPolicy,
    max_parallel: usize,
    tool_timeout: Option<Duration>,
    events: EventSink,
}

impl ToolExecutor {
    /// Executor with default limits and no confirmation
    pub fn new(invoker: Arc<dyn ToolInvoker>) -> Self {
        Self::from_config(invoker, &ToolsConfig::default())
    }

    pub fn from_config(invoker: Arc<dyn ToolInvoker>, config: &ToolsConfig) -> Self {
        Self {
            invoker,
            gate: Arc::new(AllowAllGate),
            policy: RetryPolicy::from(config),
            max_parallel: config.effective_max_parallel(),
            tool_timeout: config.tool_timeout(),
            events: EventSink::disabled(),
        }
    }

    pub fn with_gate(mut self, gate: Arc<dyn AuthorizationGate>) -> Self {
        self.gate = gate;
        self
    }

    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_max_parallel(mut self, max_parallel: usize) -> Self {
        self.max_parallel = max_parallel.max(1);
        self
    }

    pub fn with_tool_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.tool_timeout = timeout;
        self
    }

    pub fn with_events(mut self, events: EventSink) -> Self {
        self.events = events;
        self
    }

    pub fn max_parallel(&self) -> usize {
        self.max_parallel
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Run `calls` concurrently, at most `max_parallel` at a time.
    ///
    /// Calls are authorized one by one before any of them starts, so a gate
    /// that prompts never sees two prompts at once. Results come back in
    /// input order.
    pub async fn run_parallel(&self, calls: Vec<ToolCall>, cancel: &CancellationToken) -> BatchResult {
        if calls.is_empty() {
            return Ok(Vec::new());
        }

        let size = calls.len();
        let mut slots: Vec<Option<CallResult>> = Vec::with_capacity(size);
        slots.resize_with(size, || None);

        let mut approved = Vec::with_capacity(size);
        for (index, call) in calls.into_iter().enumerate() {
            match self.authorize_call(&call, cancel).await {
                Ok(AuthDecision::Approved) => approved.push((index, call)),
                Ok(AuthDecision::Denied { message }) => {
                    self.emit_rejection(&call, &message);
                    slots[index] = Some(CallResult::rejected(call, message));
                }
                Err(error) => return Err(BatchError::new(Vec::new(), error)),
            }
        }

        let started = Instant::now();
        let semaphore = Semaphore::new(self.max_parallel.max(1));
        let batch_failed = AtomicBool::new(false);
        let mut tasks = FuturesUnordered::new();

        for (index, call) in approved {
            let semaphore = &semaphore;
            let batch_failed = &batch_failed;
            tasks.push(async move {
                let Ok(_permit) = semaphore.acquire().await else {
                    return (index, None);
                };
                if batch_failed.load(Ordering::SeqCst) || cancel.is_cancelled() {
                    tracing::debug!(
                        target: "tack.tools.executor",
                        tool = %call.name,
                        "Skipping call, batch already failed"
                    );
                    return (index, None);
                }
                let result = self.invoke_with_retry(call, cancel).await;
                if result.is_err() {
                    batch_failed.store(true, Ordering::SeqCst);
                }
                (index, Some(result))
            });
        }

        let mut first_error: Option<TackError> = None;
        while let Some((index, result)) = tasks.next().await {
            match result {
                Some(Ok(call_result)) => slots[index] = Some(call_result),
                Some(Err(error)) => {
                    if first_error.is_none() {
                        first_error = Some(error);
                    }
                }
                None => {}
            }
        }

        if first_error.is_none() && cancel.is_cancelled() {
            first_error = Some(TackError::Cancelled);
        }

        if let Some(error) = first_error {
            tracing::warn!(
                target: "tack.tools.executor",
                batch_size = size,
                error = %error,
                "Parallel batch failed, discarding results"
            );
            return Err(BatchError::new(Vec::new(), error));
        }

        let results: Vec<CallResult> = slots.into_iter().flatten().collect();
        self.report_batch_timing(&results, started.elapsed());
        Ok(results)
    }

    /// Run `calls` one at a time in the given order.
    ///
    /// A denied call yields a rejection result and the batch continues. A
    /// failed call stops the batch; later calls are not executed.
    pub async fn run_sequential(
        &self,
        calls: Vec<ToolCall>,
        cancel: &CancellationToken,
    ) -> BatchResult {
        let mut results = Vec::with_capacity(calls.len());

        for call in calls {
            if cancel.is_cancelled() {
                return Err(BatchError::new(results, TackError::Cancelled));
            }

            match self.authorize_call(&call, cancel).await {
                Ok(AuthDecision::Approved) => {}
                Ok(AuthDecision::Denied { message }) => {
                    self.emit_rejection(&call, &message);
                    results.push(CallResult::rejected(call, message));
                    continue;
                }
                Err(error) => return Err(BatchError::new(results, error)),
            }

            match self.invoke_with_retry(call, cancel).await {
                Ok(result) => results.push(result),
                Err(error) => return Err(BatchError::new(results, error)),
            }
        }

        Ok(results)
    }

    /// Ask the gate about `call`, giving up as soon as `cancel` fires.
    ///
    /// A pending confirmation prompt must not hold back a user abort.
    async fn authorize_call(&self, call: &ToolCall, cancel: &CancellationToken) -> Result<AuthDecision> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                tracing::debug!(
                    target: "tack.tools.executor",
                    tool = %call.name,
                    "Cancelled while waiting for authorization"
                );
                Err(TackError::Cancelled)
            }
            decision = authorize(self.gate.as_ref(), call) => decision,
        }
    }

    /// Invoke one call, retrying retryable failures with backoff.
    ///
    /// A self-correction error ends the call successfully with the error text
    /// as its outcome.
    async fn invoke_with_retry(&self, call: ToolCall, cancel: &CancellationToken) -> Result<CallResult> {
        let started = Instant::now();
        self.events.emit(OrchestratorEvent::ToolStart {
            call_id: call.id.clone(),
            tool_name: call.name.clone(),
            description: readable_description(&call.name, &call.args),
        });

        let mut attempt: u32 = 0;
        loop {
            attempt += 1;
            let error = match self.invoke_once(&call, cancel).await {
                Ok(output) => {
                    return Ok(self.finish(call, ToolOutcome::Success(output), attempt, started));
                }
                Err(TackError::ModelRetry(message)) => {
                    tracing::debug!(
                        target: "tack.tools.executor",
                        tool = %call.name,
                        "Tool asked the model to self-correct"
                    );
                    return Ok(self.finish(call, ToolOutcome::SelfCorrect(message), attempt, started));
                }
                Err(error) => error,
            };

            if !self.policy.should_retry(attempt, &error) {
                if attempt > 1 {
                    tracing::warn!(
                        target: "tack.tools.executor",
                        tool = %call.name,
                        attempts = attempt,
                        error = %error,
                        "Tool failed after retries"
                    );
                } else {
                    tracing::debug!(
                        target: "tack.tools.executor",
                        tool = %call.name,
                        error = %error,
                        "Tool failed with non-retryable error"
                    );
                }
                self.events.emit(OrchestratorEvent::ToolResult {
                    call_id: call.id.clone(),
                    tool_name: call.name.clone(),
                    output: error.to_string(),
                    is_error: true,
                    duration_ms: started.elapsed().as_millis() as u64,
                });
                return Err(error);
            }

            let delay = self.policy.backoff(attempt);
            tracing::info!(
                target: "tack.tools.retry",
                tool = %call.name,
                attempt,
                max_attempts = self.policy.max_attempts,
                delay_ms = delay.as_millis() as u64,
                error = %error,
                "Retrying tool call"
            );
            self.events.emit(OrchestratorEvent::ToolRetry {
                call_id: call.id.clone(),
                tool_name: call.name.clone(),
                attempt,
                delay_ms: delay.as_millis() as u64,
                error: error.to_string(),
            });

            tokio::select! {
                _ = cancel.cancelled() => return Err(TackError::Cancelled),
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }

    async fn invoke_once(&self, call: &ToolCall, cancel: &CancellationToken) -> Result<String> {
        let invocation = async {
            match self.tool_timeout {
                Some(limit) => {
                    match tokio::time::timeout(limit, self.invoker.invoke(&call.name, &call.args)).await {
                        Ok(result) => result,
                        Err(_) => Err(TackError::ToolTimeout {
                            tool: call.name.clone(),
                            secs: limit.as_secs(),
                        }),
                    }
                }
                None => self.invoker.invoke(&call.name, &call.args).await,
            }
        };

        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(TackError::Cancelled),
            result = invocation => result,
        }
    }

    fn finish(&self, call: ToolCall, outcome: ToolOutcome, attempts: u32, started: Instant) -> CallResult {
        let duration = started.elapsed();
        self.events.emit(OrchestratorEvent::ToolResult {
            call_id: call.id.clone(),
            tool_name: call.name.clone(),
            output: outcome.text().to_string(),
            is_error: outcome.is_error(),
            duration_ms: duration.as_millis() as u64,
        });
        CallResult {
            call,
            outcome,
            attempts,
            duration,
        }
    }

    fn emit_rejection(&self, call: &ToolCall, message: &str) {
        self.events.emit(OrchestratorEvent::ToolResult {
            call_id: call.id.clone(),
            tool_name: call.name.clone(),
            output: message.to_string(),
            is_error: true,
            duration_ms: 0,
        });
    }

    /// Timing diagnostics, only for batches that actually ran in parallel.
    fn report_batch_timing(&self, results: &[CallResult], wall: Duration) {
        let executed: Vec<&CallResult> = results.iter().filter(|r| r.attempts > 0).collect();
        if executed.len() <= 1 {
            return;
        }

        let wall_ms = wall.as_millis() as u64;
        let summed_ms: u64 = executed.iter().map(|r| r.duration.as_millis() as u64).sum();
        let speedup = summed_ms as f64 / wall_ms.max(1) as f64;

        tracing::debug!(
            target: "tack.tools.executor",
            batch_size = executed.len(),
            wall_ms,
            summed_ms,
            speedup,
            "Parallel batch complete"
        );
        self.events.emit(OrchestratorEvent::ParallelBatch {
            size: executed.len(),
            wall_ms,
            summed_ms,
            speedup,
        });
    }
}
