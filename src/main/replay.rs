// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! `tack replay`: run a recorded model script through the orchestrator.
//!
//! Tools are echoed rather than executed, so a script of model misbehaviour
//! can be replayed safely to watch how the loop recovers.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use tack::agent::{EventSink, ProfileCache, RequestOrchestrator};
use tack::cli::ReplayArgs;
use tack::config::Settings;
use tack::error::Result;
use tack::llm::ScriptedTransport;
use tack::tools::{AuthorizationGate, PolicyGate, ToolInvoker};

use super::display;

/// Exit code for a user abort (128 + SIGINT)
const EXIT_ABORTED: i32 = 130;

/// Tool invoker that reports what it would have run
struct EchoInvoker;

#[async_trait]
impl ToolInvoker for EchoInvoker {
    async fn invoke(&self, name: &str, args: &Value) -> Result<String> {
        Ok(format!("[echo] {} {}", name, args))
    }
}

/// Replay `args.script`. Returns the process exit code.
pub(super) async fn run_replay(args: ReplayArgs, mut settings: Settings) -> Result<i32> {
    if let Some(timeout) = args.timeout {
        settings.orchestrator.global_request_timeout_secs = timeout;
    }
    if args.yolo {
        settings.authorization.yolo = true;
    }

    let mut profiles = ProfileCache::new();
    let profile = profiles.profile_for(&args.model, &settings)?;
    let transport = Arc::new(ScriptedTransport::from_json_file(&args.script)?);
    let gate: Arc<dyn AuthorizationGate> = Arc::new(PolicyGate::new(&profile.authorization));

    let (events, mut rx) = EventSink::channel();
    let printer = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            if let Err(error) = display::print_event(&event) {
                tracing::debug!(error = %error, "Failed to print event");
            }
        }
    });

    let orchestrator = RequestOrchestrator::builder(transport.clone(), Arc::new(EchoInvoker), profile)
        .gate(gate)
        .events(events)
        .build();

    let abort = CancellationToken::new();
    let ctrl_c = abort.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            ctrl_c.cancel();
        }
    });

    let mut session = orchestrator.new_session();
    let result = orchestrator.run(&mut session, &args.instruction, &abort).await;

    // Closing the sink lets the printer drain and exit
    drop(orchestrator);
    if let Err(error) = printer.await {
        tracing::debug!(error = %error, "Event printer task failed");
    }

    let usage = session.usage();
    tracing::info!(
        prompt_tokens = usage.prompt_tokens,
        completion_tokens = usage.completion_tokens,
        cost = usage.cost,
        context_tokens = session.estimated_context_tokens(),
        unused_steps = transport.remaining(),
        "Replay finished"
    );

    match result {
        Ok(outcome) => {
            display::print_outcome(&outcome)?;
            Ok(0)
        }
        Err(failure) => {
            display::print_failure(&failure)?;
            Ok(if failure.is_user_abort() { EXIT_ABORTED } else { 1 })
        }
    }
}
