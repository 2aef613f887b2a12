// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Agent request orchestration
//!
//! - `orchestrator`: the per-request iteration loop
//! - `node`: per-turn processing and tool dispatch
//! - `state`: legal lifecycle transitions
//! - `session`: history, usage and call registry for one session
//! - `guidance` / `patterns`: recovery messages and the heuristics behind them
//! - `events`: the outward event channel
//! - `cache`: compiled profiles keyed by config version

pub mod cache;
pub mod events;
pub mod guidance;
pub mod node;
pub mod orchestrator;
pub mod patterns;
pub mod session;
pub mod state;

pub use cache::{AgentProfile, ProfileCache, VersionedCache};
pub use events::{EventSink, OrchestratorEvent};
pub use guidance::GuidanceKind;
pub use node::{NodeOutcome, NodeProcessor, TurnSignal};
pub use orchestrator::{
    IterationBudget, OrchestratorBuilder, RequestOrchestrator, RequestOutcome, RequestResult,
};
pub use session::{RequestSession, UsageTotals};
pub use state::{AgentState, InvalidTransitionError, StateMachine};
